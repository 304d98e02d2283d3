use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::resolve_path;

/// Компонент, от имени которого upstream runtime шлёт служебные tuple'ы.
pub const SYSTEM_COMPONENT: &str = "__system";
/// Stream периодических tick-сигналов.
pub const TICK_STREAM: &str = "__tick";
/// Stream обычных данных по умолчанию.
pub const DEFAULT_STREAM: &str = "default";

/// Входящая единица работы от upstream pipeline.
///
/// Identity — `id`: каждый tuple должен получить ровно одну итоговую
/// disposition (ack или fail). Поля адресуются по имени, вложенные —
/// через dot-notation (`"order.id"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub id: u64,
    #[serde(default = "default_source_component")]
    pub source_component: String,
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default)]
    pub values: Map<String, Value>,
}

fn default_source_component() -> String {
    "input".into()
}
fn default_stream() -> String {
    DEFAULT_STREAM.into()
}

impl Tuple {
    /// Обычный data tuple из набора именованных полей.
    pub fn new(id: u64, values: Map<String, Value>) -> Self {
        Self {
            id,
            source_component: default_source_component(),
            stream: default_stream(),
            values,
        }
    }

    /// Control signal: tick без payload. Никогда не публикуется.
    pub fn tick(id: u64) -> Self {
        Self {
            id,
            source_component: SYSTEM_COMPONENT.into(),
            stream: TICK_STREAM.into(),
            values: Map::new(),
        }
    }

    pub fn is_tick(&self) -> bool {
        self.source_component == SYSTEM_COMPONENT && self.stream == TICK_STREAM
    }

    /// Значение поля по имени или dot-path. None если сегмент отсутствует.
    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.values.get(field) {
            Some(v) => Some(v),
            None => {
                let (head, rest) = field.split_once('.')?;
                resolve_path(self.values.get(head)?, rest)
            }
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
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn tick_is_recognized_only_on_system_tick_stream() {
        assert!(Tuple::tick(7).is_tick());

        let mut t = Tuple::tick(7);
        t.stream = DEFAULT_STREAM.into();
        assert!(!t.is_tick());

        assert!(!tuple(json!({"key": "k"})).is_tick());
    }

    #[test]
    fn value_resolves_flat_and_dotted_fields() {
        let t = tuple(json!({
            "key": "k1",
            "order": {"route": {"topic": "orders.eu"}},
            "a.b": "literal",
        }));
        assert_eq!(t.value("key"), Some(&json!("k1")));
        assert_eq!(t.value("order.route.topic"), Some(&json!("orders.eu")));
        // exact field name wins over path resolution
        assert_eq!(t.value("a.b"), Some(&json!("literal")));
        assert!(t.value("order.missing").is_none());
        assert!(t.value("message").is_none());
    }

    #[test]
    fn deserializes_with_defaults() {
        let t: Tuple = serde_json::from_str(r#"{"id": 3, "values": {"message": "m"}}"#).unwrap();
        assert_eq!(t.stream, DEFAULT_STREAM);
        assert_eq!(t.source_component, "input");
        assert_eq!(t.value("message"), Some(&json!("m")));
    }
}
