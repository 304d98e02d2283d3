use serde_json::Value;

use bridge_api::{DestinationSelector, RecordError, Tuple};

/// Все записи — в один destination.
#[derive(Debug, Clone)]
pub struct FixedDestination {
    destination: String,
}

impl FixedDestination {
    pub fn new(destination: impl Into<String>) -> Self {
        Self { destination: destination.into() }
    }

    pub fn name(&self) -> &str {
        &self.destination
    }
}

impl DestinationSelector for FixedDestination {
    fn destination(&self, _tuple: &Tuple) -> Result<Option<String>, RecordError> {
        Ok(Some(self.destination.clone()))
    }
}

/// Destination из поля записи.
///
/// Нет поля (или null) — `default`, а без него запись пропускается.
/// Поле не строка — ошибка формата.
#[derive(Debug, Clone)]
pub struct FieldNameSelector {
    field: String,
    default: Option<String>,
}

impl FieldNameSelector {
    pub fn new(field: impl Into<String>, default: Option<String>) -> Self {
        Self { field: field.into(), default }
    }
}

impl DestinationSelector for FieldNameSelector {
    fn destination(&self, tuple: &Tuple) -> Result<Option<String>, RecordError> {
        match tuple.value(&self.field) {
            Some(Value::String(destination)) => Ok(Some(destination.clone())),
            None | Some(Value::Null) => {
                tracing::warn!(
                    field = %self.field,
                    tuple = tuple.id,
                    default = ?self.default,
                    "destination field not found, using default"
                );
                Ok(self.default.clone())
            }
            Some(other) => Err(RecordError::format_err(format!(
                "destination field '{}' is not a string: {other}",
                self.field
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tuple(v: Value) -> Tuple {
        match v {
            Value::Object(map) => Tuple::new(1, map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn fixed_destination_ignores_record() {
        let s = FixedDestination::new("orders");
        assert_eq!(s.destination(&tuple(json!({}))).unwrap(), Some("orders".into()));
    }

    #[test]
    fn field_selector_reads_field_and_falls_back() {
        let s = FieldNameSelector::new("route.topic", Some("fallback".into()));
        assert_eq!(
            s.destination(&tuple(json!({"route": {"topic": "eu"}}))).unwrap(),
            Some("eu".into())
        );
        assert_eq!(s.destination(&tuple(json!({}))).unwrap(), Some("fallback".into()));
    }

    #[test]
    fn field_selector_without_default_skips() {
        let s = FieldNameSelector::new("topic", None);
        assert_eq!(s.destination(&tuple(json!({"topic": null}))).unwrap(), None);
    }

    #[test]
    fn non_string_destination_is_an_error() {
        let s = FieldNameSelector::new("topic", None);
        assert!(s.destination(&tuple(json!({"topic": 17}))).is_err());
    }
}
