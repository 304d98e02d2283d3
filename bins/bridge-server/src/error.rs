#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Bridge(#[from] bridge::BridgeError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("processing thread panicked")]
    ProcessingPanicked,
}
