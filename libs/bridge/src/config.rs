use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use bridge_api::ProducerProperties;

use crate::mapper::{DEFAULT_KEY_FIELD, DEFAULT_MESSAGE_FIELD, FieldNameMapper};
use crate::publisher::{BridgeBuilder, RuntimeConf, TOPIC};
use crate::selector::FieldNameSelector;
use crate::DeliveryMode;

// ═══════════════════════════════════════════════════════════════
//  Bridge Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация bridge из TOML.
///
/// Destination: либо `topic` (фиксированный), либо `topic_field`
/// (поле записи), не оба. Без обоих — fallback на `topic` runtime-конфига.
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_name")]
    pub name: String,
    /// Фиксированный destination для всех записей.
    pub topic: Option<String>,
    /// Поле записи (dot-path) с именем destination.
    pub topic_field: Option<String>,
    #[serde(default = "default_key_field")]
    pub key_field: String,
    #[serde(default = "default_message_field")]
    pub message_field: String,
    /// Ack сразу после передачи producer'у.
    #[serde(default)]
    pub fire_and_forget: bool,
    /// false — синхронная отправка (fire_and_forget игнорируется).
    #[serde(default = "default_async", rename = "async")]
    pub async_send: bool,
    /// Passthrough в клиент брокера (значения приводятся к строкам).
    #[serde(default)]
    pub producer_properties: BTreeMap<String, toml::Value>,
}

fn default_bridge_name() -> String {
    "unnamed".into()
}
fn default_key_field() -> String {
    DEFAULT_KEY_FIELD.into()
}
fn default_message_field() -> String {
    DEFAULT_MESSAGE_FIELD.into()
}
fn default_async() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_bridge_name(),
            topic: None,
            topic_field: None,
            key_field: default_key_field(),
            message_field: default_message_field(),
            fire_and_forget: false,
            async_send: default_async(),
            producer_properties: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Validate: topic и topic_field взаимоисключающие, имена полей непустые.
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.is_some() && self.topic_field.is_some() {
            return Err(format!(
                "bridge [{}]: cannot specify both 'topic' and 'topic_field'",
                self.name
            ));
        }
        if self.topic.as_deref().is_some_and(str::is_empty) {
            return Err(format!("bridge [{}]: 'topic' must not be empty", self.name));
        }
        if self.topic_field.as_deref().is_some_and(str::is_empty) {
            return Err(format!("bridge [{}]: 'topic_field' must not be empty", self.name));
        }
        if self.key_field.is_empty() || self.message_field.is_empty() {
            return Err(format!(
                "bridge [{}]: 'key_field' and 'message_field' must not be empty",
                self.name
            ));
        }
        if self.fire_and_forget && !self.async_send {
            tracing::warn!(bridge = %self.name, "fire_and_forget has no effect when async = false");
        }
        Ok(())
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::from_flags(self.async_send, self.fire_and_forget)
    }

    pub fn producer_properties(&self) -> ProducerProperties {
        self.producer_properties
            .iter()
            .map(|(k, v)| (k.clone(), property_string(v)))
            .collect()
    }

    /// Builder с field-name mapper'ом и selector'ом по конфигу.
    ///
    /// `topic_field` без значения в записи падает на `conf["topic"]`.
    pub fn builder(&self, conf: &RuntimeConf) -> BridgeBuilder<Value, Value> {
        let mut builder = BridgeBuilder::new(self.name.clone())
            .with_mapper(FieldNameMapper::new(&self.key_field, &self.message_field))
            .with_producer_properties(self.producer_properties())
            .fire_and_forget(self.fire_and_forget)
            .async_send(self.async_send);

        if let Some(topic) = &self.topic {
            builder = builder.with_destination(topic);
        } else if let Some(field) = &self.topic_field {
            let default = conf.get(TOPIC).and_then(Value::as_str).map(str::to_string);
            builder = builder.with_selector(FieldNameSelector::new(field, default));
        }
        builder
    }
}

/// TOML-значение свойства → строка (строки без кавычек).
fn property_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}
