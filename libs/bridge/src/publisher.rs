use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use bridge_api::{
    Completion, DestinationSelector, MessageProducer, OutboundMessage, ProducerProperties,
    RecordError, RecordMapper, SendResult, Tuple, blocking_allowed,
};

use crate::collector::{Collector, Pending};
use crate::mapper::{DEFAULT_KEY_FIELD, DEFAULT_MESSAGE_FIELD, FieldNameMapper};
use crate::selector::FixedDestination;
use crate::{BridgeError, DeliveryMode};

/// Ключ runtime-конфига с destination по умолчанию (когда selector не задан).
pub const TOPIC: &str = "topic";

/// Конфиг, который host передаёт в `start` (аналог общего конфига топологии).
pub type RuntimeConf = HashMap<String, Value>;

// ═══════════════════════════════════════════════════════════════
//  Producer factory
// ═══════════════════════════════════════════════════════════════

/// Создание producer'а из passthrough-свойств. Точка подмены в тестах.
pub trait ProducerFactory<K, V> {
    fn create(&self, properties: &ProducerProperties)
        -> Result<Arc<dyn MessageProducer<K, V>>, RecordError>;
}

impl<K, V, F> ProducerFactory<K, V> for F
where
    F: Fn(&ProducerProperties) -> Result<Arc<dyn MessageProducer<K, V>>, RecordError>,
{
    fn create(&self, properties: &ProducerProperties)
        -> Result<Arc<dyn MessageProducer<K, V>>, RecordError> {
        self(properties)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Builder
// ═══════════════════════════════════════════════════════════════

/// Конфигурация bridge до старта: стратегии, флаги режима, свойства producer'а.
pub struct BridgeBuilder<K, V> {
    name: String,
    mapper: Option<(Arc<dyn RecordMapper<K, V>>, String)>,
    selector: Option<(Arc<dyn DestinationSelector>, String)>,
    producer_properties: ProducerProperties,
    fire_and_forget: bool,
    async_send: bool,
}

impl<K, V> BridgeBuilder<K, V>
where
    K: fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mapper: None,
            selector: None,
            producer_properties: ProducerProperties::new(),
            fire_and_forget: false,
            async_send: true,
        }
    }

    pub fn with_mapper<M>(mut self, mapper: M) -> Self
    where
        M: RecordMapper<K, V> + 'static,
    {
        let mapper: Arc<dyn RecordMapper<K, V>> = Arc::new(mapper);
        self.mapper = Some((mapper, short_type_name::<M>().to_string()));
        self
    }

    /// Публиковать все записи в один destination.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        let selector = FixedDestination::new(destination);
        let label = format!("FixedDestination({})", selector.name());
        let selector: Arc<dyn DestinationSelector> = Arc::new(selector);
        self.selector = Some((selector, label));
        self
    }

    pub fn with_selector<S>(mut self, selector: S) -> Self
    where
        S: DestinationSelector + 'static,
    {
        let selector: Arc<dyn DestinationSelector> = Arc::new(selector);
        self.selector = Some((selector, short_type_name::<S>().to_string()));
        self
    }

    pub fn with_producer_properties(mut self, properties: ProducerProperties) -> Self {
        self.producer_properties = properties;
        self
    }

    /// true — ack сразу после передачи producer'у, не дожидаясь брокера.
    pub fn fire_and_forget(mut self, fire_and_forget: bool) -> Self {
        self.fire_and_forget = fire_and_forget;
        self
    }

    /// true (default) — не ждать брокера перед следующей записью;
    /// false — синхронная отправка.
    pub fn async_send(mut self, async_send: bool) -> Self {
        self.async_send = async_send;
        self
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::from_flags(self.async_send, self.fire_and_forget)
    }

    /// Запустить bridge.
    ///
    /// Без selector'а берётся destination из `conf["topic"]`; если и его нет —
    /// `NoDestination`, и producer не создаётся. Без mapper'а JSON-bridge
    /// получает `FieldNameMapper::default()`, остальные типы — `NoMapper`.
    /// Synchronous внутри current-thread runtime — `Config`.
    pub fn start<F>(
        self,
        conf: &RuntimeConf,
        collector: Collector,
        factory: F,
    ) -> Result<PublisherBridge<K, V>, BridgeError>
    where
        F: ProducerFactory<K, V>,
    {
        let mode = self.delivery_mode();
        if mode.blocks() && !blocking_allowed() {
            return Err(BridgeError::Config(
                "synchronous delivery cannot block inside a current-thread tokio runtime".into(),
            ));
        }

        let (mapper, mapper_label) = match self.mapper {
            Some(mapper) => mapper,
            None => {
                let mapper = default_mapper::<K, V>().ok_or(BridgeError::NoMapper)?;
                tracing::info!(
                    bridge = %self.name,
                    key_field = DEFAULT_KEY_FIELD,
                    message_field = DEFAULT_MESSAGE_FIELD,
                    "mapper not specified, using field name mapper"
                );
                (mapper, "FieldNameMapper".to_string())
            }
        };

        let (selector, selector_label) = match self.selector {
            Some(selector) => selector,
            None => match conf.get(TOPIC) {
                Some(Value::String(topic)) => {
                    tracing::info!(
                        bridge = %self.name,
                        %topic,
                        "selector not specified, using fixed destination from runtime config"
                    );
                    let label = format!("FixedDestination({topic})");
                    let selector: Arc<dyn DestinationSelector> = Arc::new(FixedDestination::new(topic.clone()));
                    (selector, label)
                }
                _ => return Err(BridgeError::NoDestination),
            },
        };

        let producer = factory
            .create(&self.producer_properties)
            .map_err(BridgeError::ProducerInit)?;

        let bridge = PublisherBridge {
            name: self.name,
            mapper,
            mapper_label,
            selector,
            selector_label,
            producer,
            collector,
            mode,
            producer_properties: self.producer_properties,
        };
        tracing::info!(bridge = %bridge.name, config = ?bridge, "bridge started");
        Ok(bridge)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Publisher bridge
// ═══════════════════════════════════════════════════════════════

/// Tuple → сообщение брокера → disposition в ack sink.
///
/// `on_record` вызывается из одного processing thread'а; completion
/// callback'и producer'а приходят с его собственных потоков. Каждая
/// не-tick запись получает ровно одну disposition, что бы ни случилось.
pub struct PublisherBridge<K, V> {
    name: String,
    mapper: Arc<dyn RecordMapper<K, V>>,
    mapper_label: String,
    selector: Arc<dyn DestinationSelector>,
    selector_label: String,
    producer: Arc<dyn MessageProducer<K, V>>,
    collector: Collector,
    mode: DeliveryMode,
    producer_properties: ProducerProperties,
}

impl<K, V> PublisherBridge<K, V>
where
    K: fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Обработать одну входящую запись. Ничего не возвращает и не паникует:
    /// результат уходит в ack sink (синхронно или из callback'а).
    pub fn on_record(&self, tuple: Tuple) {
        let id = tuple.id;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            if tuple.is_tick() {
                // ticks never reach the broker
                tracing::trace!(bridge = %self.name, tuple = tuple.id, "tick acknowledged");
                self.collector.ack(&tuple);
                return;
            }
            self.publish(Pending::new(tuple, self.collector.clone()));
        }));
        if let Err(payload) = outcome {
            tracing::error!(
                bridge = %self.name,
                tuple = id,
                panic = %panic_message(payload.as_ref()),
                "panic while publishing, record failed"
            );
        }
    }

    /// Закрыть producer. In-flight отправки — по политике producer'а;
    /// неразрешённые к этому моменту записи переигрывает upstream.
    pub fn stop(&self) -> Result<(), BridgeError> {
        tracing::info!(bridge = %self.name, "stopping, closing producer");
        self.producer.close().map_err(BridgeError::Close)
    }

    fn publish(&self, pending: Pending) {
        let message = match self.map(pending.tuple()) {
            Ok(Some(message)) => message,
            Ok(None) => return pending.ack(),
            Err(error) => {
                tracing::warn!(bridge = %self.name, tuple = pending.tuple().id, error = ?error, "mapping failed");
                return pending.fail(error);
            }
        };

        match self.mode {
            DeliveryMode::FireAndForget => {
                let callback = self.log_only(pending.tuple().id);
                let _handle = self.producer.submit(message, Some(callback));
                pending.ack();
            }
            DeliveryMode::AsynchronousAcked => {
                let name = self.name.clone();
                let callback: Completion = Box::new(move |result: &SendResult| match result {
                    Ok(_) => pending.ack(),
                    Err(error) => {
                        tracing::warn!(bridge = %name, tuple = pending.tuple().id, error = ?error, "send failed");
                        pending.fail(error.clone());
                    }
                });
                let _handle = self.producer.submit(message, Some(callback));
            }
            DeliveryMode::Synchronous if !blocking_allowed() => {
                pending.fail(RecordError::config(
                    "synchronous delivery cannot block inside a current-thread tokio runtime",
                ));
            }
            DeliveryMode::Synchronous => match self.producer.submit(message, None).wait() {
                Ok(report) => {
                    tracing::trace!(
                        bridge = %self.name,
                        tuple = pending.tuple().id,
                        destination = %report.destination,
                        partition = ?report.partition,
                        offset = ?report.offset,
                        "delivered"
                    );
                    pending.ack();
                }
                Err(error) => {
                    tracing::warn!(bridge = %self.name, tuple = pending.tuple().id, error = ?error, "send failed");
                    pending.fail(error);
                }
            },
        }
    }

    /// key → message → destination. `Ok(None)` — selector попросил пропустить.
    fn map(&self, tuple: &Tuple) -> Result<Option<OutboundMessage<K, V>>, RecordError> {
        let key = self.mapper.key(tuple)?;
        let value = self.mapper.message(tuple)?;
        match self.selector.destination(tuple)? {
            Some(destination) => Ok(Some(OutboundMessage { destination, key, value })),
            None => {
                tracing::warn!(
                    bridge = %self.name,
                    tuple = tuple.id,
                    key = ?key,
                    "skipping record, destination selector returned none"
                );
                Ok(None)
            }
        }
    }

    /// Callback для fire-and-forget: только диагностика, без disposition.
    fn log_only(&self, id: u64) -> Completion {
        let name = self.name.clone();
        Box::new(move |result: &SendResult| {
            if let Err(error) = result {
                tracing::warn!(bridge = %name, tuple = id, error = ?error, "fire-and-forget send failed");
            }
        })
    }
}

impl<K, V> fmt::Debug for PublisherBridge<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherBridge")
            .field("name", &self.name)
            .field("mapper", &self.mapper_label)
            .field("selector", &self.selector_label)
            .field("mode", &self.mode)
            .field("properties", &self.producer_properties)
            .finish()
    }
}

/// Mapper по умолчанию есть только у JSON-bridge (`K = V = Value`):
/// `FieldNameMapper` с полями `key`/`message`.
fn default_mapper<K: 'static, V: 'static>() -> Option<Arc<dyn RecordMapper<K, V>>> {
    let mapper: Arc<dyn RecordMapper<Value, Value>> = Arc::new(FieldNameMapper::default());
    let erased: Box<dyn Any> = Box::new(mapper);
    erased.downcast::<Arc<dyn RecordMapper<K, V>>>().ok().map(|mapper| *mapper)
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}
