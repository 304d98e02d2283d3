use serde::{Deserialize, Serialize};

/// Когда bridge подтверждает запись относительно ответа брокера.
///
/// Задаётся один раз до старта и дальше не меняется.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Блокировать processing thread до ответа брокера, затем ack/fail.
    Synchronous,
    /// Не блокировать; ack/fail из completion callback'а producer'а.
    #[default]
    AsynchronousAcked,
    /// Ack сразу после передачи producer'у; ошибки брокера только в логах.
    FireAndForget,
}

impl DeliveryMode {
    /// `async = false` ⇒ Synchronous независимо от `fire_and_forget`.
    pub fn from_flags(async_send: bool, fire_and_forget: bool) -> Self {
        match (async_send, fire_and_forget) {
            (false, _) => DeliveryMode::Synchronous,
            (true, true) => DeliveryMode::FireAndForget,
            (true, false) => DeliveryMode::AsynchronousAcked,
        }
    }

    /// Блокирует ли режим вызывающий поток на время отправки.
    pub fn blocks(&self) -> bool {
        matches!(self, DeliveryMode::Synchronous)
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryMode::Synchronous => write!(f, "synchronous"),
            DeliveryMode::AsynchronousAcked => write!(f, "asynchronous_acked"),
            DeliveryMode::FireAndForget => write!(f, "fire_and_forget"),
        }
    }
}
