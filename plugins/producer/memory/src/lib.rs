use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use bridge_api::{
    Completion, DeliveryReport, MessageProducer, OutboundMessage, ProducerProperties, RecordError,
    SendCompleter, SendHandle, now_ms,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryProducerConfig
// ═══════════════════════════════════════════════════════════════

/// Свойство: destinations через запятую, которые «брокер» отвергает.
pub const FAIL_DESTINATIONS: &str = "memory.fail.destinations";
/// Свойство: сколько последних сообщений хранить.
pub const MAX_RECORDS: &str = "memory.max.records";

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone)]
pub struct MemoryProducerConfig {
    pub max_records: usize,
    pub fail_destinations: HashSet<String>,
}

impl Default for MemoryProducerConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            fail_destinations: HashSet::new(),
        }
    }
}

impl MemoryProducerConfig {
    /// Разобрать `memory.*` свойства; остальные игнорируются.
    pub fn from_properties(props: &ProducerProperties) -> Result<Self, RecordError> {
        let mut cfg = Self::default();
        if let Some(raw) = props.get(MAX_RECORDS) {
            cfg.max_records = raw
                .parse()
                .map_err(|e| RecordError::config(format!("{MAX_RECORDS} = '{raw}': {e}")))?;
            if cfg.max_records == 0 {
                return Err(RecordError::config(format!("{MAX_RECORDS} must be > 0")));
            }
        }
        if let Some(raw) = props.get(FAIL_DESTINATIONS) {
            cfg.fail_destinations = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(cfg)
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryProducer
// ═══════════════════════════════════════════════════════════════

struct SendJob<K, V> {
    message: OutboundMessage<K, V>,
    completer: SendCompleter,
}

/// In-process producer: отправки завершаются на собственном worker-потоке,
/// как у настоящего клиента брокера. Принятые сообщения — в ring buffer.
///
/// `close()` — flush: worker дорабатывает очередь и останавливается;
/// отправки после close завершаются ошибкой `Closed` сразу.
pub struct MemoryProducer<K, V> {
    tx: Mutex<Option<mpsc::UnboundedSender<SendJob<K, V>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    sent: Arc<RwLock<VecDeque<OutboundMessage<K, V>>>>,
}

impl<K, V> MemoryProducer<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: MemoryProducerConfig) -> Result<Self, RecordError> {
        if config.max_records == 0 {
            return Err(RecordError::config(format!("{MAX_RECORDS} must be > 0")));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(RwLock::new(VecDeque::with_capacity(config.max_records.min(65536))));

        let worker_sent = sent.clone();
        let worker = std::thread::Builder::new()
            .name("memory-producer".into())
            .spawn(move || run_worker(rx, worker_sent, config))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            sent,
        })
    }

    pub fn from_properties(props: &ProducerProperties) -> Result<Self, RecordError> {
        Self::new(MemoryProducerConfig::from_properties(props)?)
    }

    /// Снимок принятых «брокером» сообщений в порядке завершения.
    pub fn sent(&self) -> Vec<OutboundMessage<K, V>> {
        self.sent.read().iter().cloned().collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.read().len()
    }
}

fn run_worker<K, V>(
    mut rx: mpsc::UnboundedReceiver<SendJob<K, V>>,
    sent: Arc<RwLock<VecDeque<OutboundMessage<K, V>>>>,
    config: MemoryProducerConfig,
) {
    let mut offset: i64 = 0;
    while let Some(SendJob { message, completer }) = rx.blocking_recv() {
        if config.fail_destinations.contains(&message.destination) {
            completer.complete(Err(RecordError::broker(format!(
                "destination '{}' rejected the message",
                message.destination
            ))));
            continue;
        }

        let report = DeliveryReport {
            destination: message.destination.clone(),
            partition: Some(0),
            offset: Some(offset),
            ts_ms: now_ms(),
        };
        offset += 1;
        {
            let mut buf = sent.write();
            if buf.len() >= config.max_records {
                buf.pop_front();
            }
            buf.push_back(message);
        }
        completer.complete(Ok(report));
    }
    tracing::debug!(delivered = offset, "memory producer worker stopped");
}

impl<K, V> MessageProducer<K, V> for MemoryProducer<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn submit(&self, message: OutboundMessage<K, V>, on_complete: Option<Completion>) -> SendHandle {
        let (completer, handle) = SendCompleter::new(on_complete);
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if let Err(mpsc::error::SendError(job)) = tx.send(SendJob { message, completer }) {
                    drop(guard);
                    job.completer.complete(Err(RecordError::closed("memory producer worker is gone")));
                }
            }
            None => {
                drop(guard);
                completer.complete(Err(RecordError::closed("memory producer is closed")));
            }
        }
        handle
    }

    fn close(&self) -> Result<(), RecordError> {
        // drop sender → worker drains the queue and exits
        self.tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            worker
                .join()
                .map_err(|_| RecordError::new("memory producer worker panicked"))?;
        }
        Ok(())
    }
}

impl<K, V> Drop for MemoryProducer<K, V> {
    fn drop(&mut self) {
        self.tx.get_mut().take();
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}
