use bridge_api::RecordError;

/// Ошибки жизненного цикла bridge (start/stop). Per-record ошибки сюда
/// не попадают — они превращаются в disposition через ack sink.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no destination configured: set a destination selector or '{topic}' in runtime config", topic = crate::TOPIC)]
    NoDestination,

    #[error("no record mapper configured")]
    NoMapper,

    #[error("config: {0}")]
    Config(String),

    #[error("producer init: {0}")]
    ProducerInit(#[source] RecordError),

    #[error("producer close: {0}")]
    Close(#[source] RecordError),
}
