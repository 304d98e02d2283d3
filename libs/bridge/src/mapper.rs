use serde_json::Value;

use bridge_api::{RecordError, RecordMapper, Tuple};

pub const DEFAULT_KEY_FIELD: &str = "key";
pub const DEFAULT_MESSAGE_FIELD: &str = "message";

/// Mapper по именам полей tuple'а.
///
/// Отсутствующее (или null) key-поле — сообщение без ключа; отсутствующее
/// message-поле — ошибка формата, запись фейлится.
#[derive(Debug, Clone)]
pub struct FieldNameMapper {
    key_field: String,
    message_field: String,
}

impl FieldNameMapper {
    pub fn new(key_field: impl Into<String>, message_field: impl Into<String>) -> Self {
        Self { key_field: key_field.into(), message_field: message_field.into() }
    }
}

impl Default for FieldNameMapper {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FIELD, DEFAULT_MESSAGE_FIELD)
    }
}

impl RecordMapper<Value, Value> for FieldNameMapper {
    fn key(&self, tuple: &Tuple) -> Result<Option<Value>, RecordError> {
        Ok(tuple.value(&self.key_field).filter(|v| !v.is_null()).cloned())
    }

    fn message(&self, tuple: &Tuple) -> Result<Value, RecordError> {
        tuple.value(&self.message_field).cloned().ok_or_else(|| {
            RecordError::format_err(format!(
                "field '{}' not found in tuple {}",
                self.message_field, tuple.id
            ))
        })
    }
}
