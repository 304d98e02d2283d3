//! `MessageProducer` поверх `rdkafka::ThreadedProducer`.
//!
//! Delivery callbacks приходят на polling-потоке librdkafka; SendCompleter
//! едет через librdkafka как delivery opaque и завершается там же.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::client::ClientContext;
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{
    BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer,
};

use bridge_api::{
    Completion, DeliveryReport, MessageProducer, OutboundMessage, ProducerProperties, RecordError,
    SendCompleter, SendHandle, WireEncode, now_ms,
};

/// Обязательное свойство клиента.
pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";

fn default_flush_timeout() -> Duration {
    Duration::from_secs(5)
}

// ═══════════════════════════════════════════════════════════════
//  Context
// ═══════════════════════════════════════════════════════════════

struct BridgeContext;

impl ClientContext for BridgeContext {}

impl ProducerContext for BridgeContext {
    type DeliveryOpaque = Box<SendCompleter>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, completer: Self::DeliveryOpaque) {
        let result = match delivery_result {
            Ok(message) => Ok(DeliveryReport {
                destination: message.topic().to_string(),
                partition: Some(message.partition()),
                offset: Some(message.offset()),
                ts_ms: message.timestamp().to_millis().unwrap_or_else(now_ms),
            }),
            Err((error, _message)) => Err(map_error(error)),
        };
        completer.complete(result);
    }
}

fn map_error(error: &KafkaError) -> RecordError {
    match error {
        KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) => {
            RecordError::config(error.to_string())
        }
        other => RecordError::broker(other.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaProducer
// ═══════════════════════════════════════════════════════════════

/// Kafka producer для bridge.
///
/// Свойства уходят в `ClientConfig` как есть (`bootstrap.servers`, `acks`,
/// `linger.ms`, ...). `close()` делает flush с таймаутом; после close
/// отправки сразу завершаются ошибкой `Closed`.
pub struct KafkaProducer<K, V> {
    producer: ThreadedProducer<BridgeContext>,
    flush_timeout: Duration,
    closed: AtomicBool,
    _types: PhantomData<fn(K, V)>,
}

impl<K, V> KafkaProducer<K, V> {
    pub fn from_properties(props: &ProducerProperties) -> Result<Self, RecordError> {
        Self::with_flush_timeout(props, default_flush_timeout())
    }

    pub fn with_flush_timeout(
        props: &ProducerProperties,
        flush_timeout: Duration,
    ) -> Result<Self, RecordError> {
        if !props.contains_key(BOOTSTRAP_SERVERS) {
            return Err(RecordError::config(format!("'{BOOTSTRAP_SERVERS}' is required")));
        }

        let mut client = ClientConfig::new();
        for (key, value) in props {
            client.set(key, value);
        }
        let producer: ThreadedProducer<BridgeContext> = client
            .create_with_context(BridgeContext)
            .map_err(|e| map_error(&e))?;

        tracing::info!(
            servers = %props[BOOTSTRAP_SERVERS],
            properties = props.len(),
            "kafka producer created"
        );
        Ok(Self {
            producer,
            flush_timeout,
            closed: AtomicBool::new(false),
            _types: PhantomData,
        })
    }

    fn encode(message: &OutboundMessage<K, V>) -> Result<(Option<Vec<u8>>, Vec<u8>), RecordError>
    where
        K: WireEncode,
        V: WireEncode,
    {
        let key = message.key.as_ref().map(|k| k.encode()).transpose()?;
        let payload = message.value.encode()?;
        Ok((key, payload))
    }
}

impl<K, V> MessageProducer<K, V> for KafkaProducer<K, V>
where
    K: WireEncode,
    V: WireEncode,
{
    fn submit(&self, message: OutboundMessage<K, V>, on_complete: Option<Completion>) -> SendHandle {
        let (completer, handle) = SendCompleter::new(on_complete);
        if self.closed.load(Ordering::Acquire) {
            completer.complete(Err(RecordError::closed("kafka producer is closed")));
            return handle;
        }

        let (key, payload) = match Self::encode(&message) {
            Ok(encoded) => encoded,
            Err(e) => {
                completer.complete(Err(e));
                return handle;
            }
        };

        let mut record: BaseRecord<'_, [u8], [u8], Box<SendCompleter>> =
            BaseRecord::with_opaque_to(&message.destination, Box::new(completer))
                .payload(&payload[..]);
        if let Some(key) = key.as_deref() {
            record = record.key(key);
        }

        if let Err((error, record)) = self.producer.send(record) {
            tracing::warn!(topic = %message.destination, error = %error, "kafka enqueue failed");
            record.delivery_opaque.complete(Err(map_error(&error)));
        }
        handle
    }

    fn close(&self) -> Result<(), RecordError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let in_flight = self.producer.in_flight_count();
        tracing::info!(in_flight, timeout = ?self.flush_timeout, "flushing kafka producer");
        self.producer.flush(self.flush_timeout).map_err(|e| map_error(&e))
    }
}
