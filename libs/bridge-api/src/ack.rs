use crate::{RecordError, Tuple};

/// Интерфейс upstream pipeline для итоговой disposition записи.
///
/// Реализации не обязаны быть потокобезопасными (`&mut self`): bridge
/// сериализует все вызовы через один критический участок.
/// Для записи, которая и репортится, и фейлится, `report_error`
/// вызывается строго до `fail`.
pub trait AckSink: Send {
    fn ack(&mut self, tuple: &Tuple);

    fn fail(&mut self, tuple: &Tuple);

    fn report_error(&mut self, tuple: &Tuple, error: &RecordError);
}
