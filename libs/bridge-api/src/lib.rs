//! Контракты вокруг publisher bridge: входящие tuple'ы, стратегии
//! mapping/selection, асинхронный producer и ack sink upstream pipeline'а.
//!
//! Crate намеренно без логики — только типы и трейты, которые реализуют
//! внешние коллабораторы.

mod ack;
mod error;
mod mapping;
mod producer;
mod record;
mod util;

pub use ack::AckSink;
pub use error::{ErrorKind, RecordError};
pub use mapping::{DestinationSelector, RecordMapper};
pub use producer::{
    Completion, DeliveryReport, MessageProducer, OutboundMessage, SendCompleter, SendHandle,
    SendResult, WireEncode, blocking_allowed,
};
pub use record::{DEFAULT_STREAM, SYSTEM_COMPONENT, TICK_STREAM, Tuple};
pub use util::{display_value, now_ms, resolve_path};

/// Свойства producer'а — пробрасываются в клиент брокера как есть.
pub type ProducerProperties = std::collections::BTreeMap<String, String>;
