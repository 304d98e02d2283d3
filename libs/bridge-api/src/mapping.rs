use crate::{RecordError, Tuple};

/// Извлечение key и тела сообщения из tuple.
///
/// Чистые функции; ошибка здесь эквивалентна провалу отправки записи.
pub trait RecordMapper<K, V>: Send + Sync {
    /// None — сообщение без ключа.
    fn key(&self, tuple: &Tuple) -> Result<Option<K>, RecordError>;

    fn message(&self, tuple: &Tuple) -> Result<V, RecordError>;
}

/// Выбор destination (topic) для tuple.
///
/// `Ok(None)` — «не публиковать»: bridge подтвердит запись без отправки.
pub trait DestinationSelector: Send + Sync {
    fn destination(&self, tuple: &Tuple) -> Result<Option<String>, RecordError>;
}

impl<F> DestinationSelector for F
where
    F: Fn(&Tuple) -> Result<Option<String>, RecordError> + Send + Sync,
{
    fn destination(&self, tuple: &Tuple) -> Result<Option<String>, RecordError> {
        self(tuple)
    }
}
