//! Publisher bridge: tuple'ы upstream pipeline'а → асинхронный producer
//! брокера, с at-least-once контрактом — каждая запись получает ровно
//! одну disposition (ack или fail) в ack sink.

pub mod config;
pub mod error;
mod collector;
mod mapper;
mod mode;
mod publisher;
mod selector;

pub use collector::Collector;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use mapper::{DEFAULT_KEY_FIELD, DEFAULT_MESSAGE_FIELD, FieldNameMapper};
pub use mode::DeliveryMode;
pub use publisher::{BridgeBuilder, ProducerFactory, PublisherBridge, RuntimeConf, TOPIC};
pub use selector::{FieldNameSelector, FixedDestination};
