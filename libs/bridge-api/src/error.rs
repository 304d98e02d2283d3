/// Category of a per-record error. Lets the bridge and the ack sink tell
/// apart bad input from broker trouble without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration — permanent, fail at startup.
    Config,
    /// Key/message/destination extraction or serialization failed — bad record.
    Format,
    /// Broker rejected the message (or the client gave up on it).
    Broker,
    /// I/O or network error.
    Io,
    /// Producer is closed or abandoned the send before completing it.
    Closed,
    /// Logical error (invalid state, panic in a collaborator, generic).
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Broker => f.write_str("broker"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Closed => f.write_str("closed"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Unified error type for all collaborator contracts (mapper, selector,
/// producer) and the payload of `AckSink::report_error`.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// Cheap to clone: one completion result is seen by both the callback and
/// the `SendHandle`.
#[derive(Clone, PartialEq, Eq)]
pub struct RecordError {
    kind: ErrorKind,
    message: String,
}

impl RecordError {
    /// Generic logic error (default kind).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    /// Extraction/serialization error — the record itself is bad.
    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Broker, message: msg.into() }
    }

    pub fn closed(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Closed, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RecordError {}

impl From<String> for RecordError {
    fn from(s: String) -> Self { Self { kind: ErrorKind::Logic, message: s } }
}

impl From<&str> for RecordError {
    fn from(s: &str) -> Self { Self { kind: ErrorKind::Logic, message: s.to_string() } }
}

impl From<std::io::Error> for RecordError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Io, message: e.to_string() } }
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}
