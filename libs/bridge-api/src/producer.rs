use std::fmt;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;

use crate::RecordError;

// ════════════════════════════════════════════════════════════════
//  Outbound message
// ════════════════════════════════════════════════════════════════

/// Сообщение для брокера, построенное из ровно одного входящего tuple.
/// Живёт только на время одной отправки.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage<K, V> {
    pub destination: String,
    pub key: Option<K>,
    pub value: V,
}

impl<K, V> OutboundMessage<K, V> {
    pub fn new(destination: impl Into<String>, key: Option<K>, value: V) -> Self {
        Self { destination: destination.into(), key, value }
    }
}

/// Подтверждение брокера об успешной записи.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub destination: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub ts_ms: i64,
}

pub type SendResult = Result<DeliveryReport, RecordError>;

/// Completion callback. Вызывается ровно один раз, на потоке, который
/// выберет producer.
pub type Completion = Box<dyn FnOnce(&SendResult) + Send + 'static>;

// ════════════════════════════════════════════════════════════════
//  Send handle / completer
// ════════════════════════════════════════════════════════════════

/// Pending-completion token одной отправки (caller side).
///
/// Можно дождаться синхронно (`wait`) или просто бросить — отправка
/// от этого не отменяется, callback всё равно будет вызван.
pub struct SendHandle {
    rx: oneshot::Receiver<SendResult>,
}

/// Producer side пары: единственный способ завершить отправку.
///
/// `complete` потребляет completer, поэтому callback не может быть вызван
/// дважды. Если producer уронил completer не завершив — Drop завершает
/// отправку ошибкой `Closed`, callback всё равно вызывается ровно один раз.
pub struct SendCompleter {
    tx: Option<oneshot::Sender<SendResult>>,
    callback: Option<Completion>,
}

impl SendCompleter {
    /// Создать пару completer/handle для одной отправки.
    pub fn new(callback: Option<Completion>) -> (SendCompleter, SendHandle) {
        let (tx, rx) = oneshot::channel();
        (SendCompleter { tx: Some(tx), callback }, SendHandle { rx })
    }

    /// Завершить отправку: сначала callback, затем handle.
    pub fn complete(mut self, result: SendResult) {
        self.finish(result);
    }

    fn finish(&mut self, result: SendResult) {
        if let Some(callback) = self.callback.take() {
            callback(&result);
        }
        if let Some(tx) = self.tx.take() {
            // receiver мог быть уже брошен (async / fire-and-forget)
            let _ = tx.send(result);
        }
    }
}

impl Drop for SendCompleter {
    fn drop(&mut self) {
        if self.tx.is_some() || self.callback.is_some() {
            self.finish(Err(RecordError::closed("send abandoned before completion")));
        }
    }
}

impl fmt::Debug for SendCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendCompleter")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl SendHandle {
    /// Заблокировать текущий поток до завершения отправки.
    ///
    /// Таймаутов своих нет — только те, что enforced самим producer'ом.
    /// Внутри multi-thread runtime блокирует через `block_in_place`;
    /// внутри current-thread runtime блокировать нельзя — сразу ошибка
    /// `Config` (проверяйте `blocking_allowed()` до submit).
    pub fn wait(self) -> SendResult {
        let rx = self.rx;
        let received = match Handle::try_current() {
            Err(_) => rx.blocking_recv(),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| rx.blocking_recv())
            }
            Ok(_) => {
                return Err(RecordError::config(
                    "cannot wait for a send inside a current-thread tokio runtime",
                ));
            }
        };
        received.unwrap_or_else(|_| Err(RecordError::closed("send handle dropped by producer")))
    }
}

/// Можно ли блокировать текущий поток в `SendHandle::wait`:
/// вне tokio runtime или на multi-thread runtime.
pub fn blocking_allowed() -> bool {
    match Handle::try_current() {
        Err(_) => true,
        Ok(handle) => handle.runtime_flavor() == RuntimeFlavor::MultiThread,
    }
}

impl fmt::Debug for SendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendHandle")
    }
}

// ════════════════════════════════════════════════════════════════
//  Producer contract
// ════════════════════════════════════════════════════════════════

/// Асинхронный клиент брокера.
///
/// Connection management, сериализация, retries и партиционирование —
/// ответственность реализации. Контракт:
/// - `submit` не блокирует (кроме собственного backpressure реализации);
/// - `on_complete` вызывается ровно один раз — успех или ошибка, даже если
///   отправка провалилась синхронно внутри `submit`;
/// - возвращённый `SendHandle` можно дождаться синхронно.
pub trait MessageProducer<K, V>: Send + Sync {
    fn submit(&self, message: OutboundMessage<K, V>, on_complete: Option<Completion>) -> SendHandle;

    /// Закрыть producer. Flush или discard in-flight отправок — по политике
    /// реализации; брошенные отправки завершаются ошибкой `Closed`.
    fn close(&self) -> Result<(), RecordError>;
}

// ════════════════════════════════════════════════════════════════
//  Wire encoding
// ════════════════════════════════════════════════════════════════

/// Превращение key/value в байты для producer'ов, которым нужен wire format.
pub trait WireEncode {
    fn encode(&self) -> Result<Vec<u8>, RecordError>;
}

impl WireEncode for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, RecordError> {
        Ok(self.clone())
    }
}

impl WireEncode for String {
    fn encode(&self) -> Result<Vec<u8>, RecordError> {
        Ok(self.as_bytes().to_vec())
    }
}

/// Строки уходят как есть (без JSON-кавычек), остальное — компактный JSON.
impl WireEncode for serde_json::Value {
    fn encode(&self) -> Result<Vec<u8>, RecordError> {
        match self {
            serde_json::Value::String(s) => Ok(s.as_bytes().to_vec()),
            other => Ok(serde_json::to_vec(other)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report() -> DeliveryReport {
        DeliveryReport { destination: "t".into(), partition: Some(0), offset: Some(42), ts_ms: 0 }
    }

    #[test]
    fn complete_runs_callback_then_resolves_handle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let (completer, handle) = SendCompleter::new(Some(Box::new(move |r: &SendResult| {
            assert!(r.is_ok());
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        std::thread::spawn(move || completer.complete(Ok(report())));

        assert_eq!(handle.wait(), Ok(report()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_completer_completes_with_closed_error_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let (completer, handle) = SendCompleter::new(Some(Box::new(move |r: &SendResult| {
            assert_eq!(r.as_ref().unwrap_err().kind(), crate::ErrorKind::Closed);
            seen.fetch_add(1, Ordering::SeqCst);
        })));
        drop(completer);

        let err = handle.wait().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_outside_runtime_blocks_until_complete() {
        assert!(blocking_allowed());
        let (completer, handle) = SendCompleter::new(None);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            completer.complete(Err(RecordError::broker("rejected")));
        });
        assert_eq!(handle.wait(), Err(RecordError::broker("rejected")));
    }

    #[test]
    fn wait_inside_multi_thread_runtime_uses_block_in_place() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(2).build().unwrap();
        let (completer, handle) = SendCompleter::new(None);
        let result = rt.block_on(async move {
            assert!(blocking_allowed());
            std::thread::spawn(move || completer.complete(Ok(report())));
            handle.wait()
        });
        assert_eq!(result, Ok(report()));
    }

    #[test]
    fn wait_inside_current_thread_runtime_refuses_to_block() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (_completer, handle) = SendCompleter::new(None);
        let err = rt.block_on(async move {
            assert!(!blocking_allowed());
            handle.wait().unwrap_err()
        });
        assert_eq!(err.kind(), crate::ErrorKind::Config);
    }

    #[test]
    fn json_strings_encode_raw() {
        assert_eq!(serde_json::json!("abc").encode().unwrap(), b"abc".to_vec());
        assert_eq!(serde_json::json!({"a": 1}).encode().unwrap(), br#"{"a":1}"#.to_vec());
    }
}
