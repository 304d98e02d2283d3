use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use bridge_api::{AckSink, RecordError, Tuple};

// ═══════════════════════════════════════════════════════════════
//  Collector — единая сериализованная точка доступа к ack sink
// ═══════════════════════════════════════════════════════════════

/// Обёртка над ack sink'ом upstream pipeline'а.
///
/// Processing thread и completion callbacks producer'а ходят в sink только
/// через Collector: каждый вызов — под одним мьютексом, поэтому disposition
/// записи A из callback'а не перемежается с disposition записи B из
/// processing thread.
#[derive(Clone)]
pub struct Collector {
    sink: Arc<Mutex<Box<dyn AckSink>>>,
}

impl Collector {
    pub fn new(sink: impl AckSink + 'static) -> Self {
        Self { sink: Arc::new(Mutex::new(Box::new(sink))) }
    }

    pub fn ack(&self, tuple: &Tuple) {
        self.sink.lock().ack(tuple);
    }

    /// report_error + fail одним критическим участком, в этом порядке.
    pub fn fail(&self, tuple: &Tuple, error: &RecordError) {
        let mut sink = self.sink.lock();
        sink.report_error(tuple, error);
        sink.fail(tuple);
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Collector")
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pending — per-record disposition token
// ═══════════════════════════════════════════════════════════════

/// Запись, ещё не получившая disposition.
///
/// `ack`/`fail` потребляют token — вторая disposition не компилируется.
/// Token, брошенный без disposition (паника коллаборатора, producer потерял
/// callback), фейлит запись в Drop: ноль disposition'ов тоже невозможен.
pub(crate) struct Pending {
    tuple: Tuple,
    collector: Collector,
    resolved: bool,
}

impl Pending {
    pub(crate) fn new(tuple: Tuple, collector: Collector) -> Self {
        Self { tuple, collector, resolved: false }
    }

    pub(crate) fn tuple(&self) -> &Tuple {
        &self.tuple
    }

    pub(crate) fn ack(mut self) {
        self.resolved = true;
        self.collector.ack(&self.tuple);
    }

    pub(crate) fn fail(mut self, error: RecordError) {
        self.resolved = true;
        self.collector.fail(&self.tuple, &error);
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        let error = if std::thread::panicking() {
            RecordError::new("panicked while publishing record")
        } else {
            RecordError::closed("record dropped without disposition")
        };
        tracing::error!(tuple = self.tuple.id, error = ?error, "unresolved record, failing");
        self.collector.fail(&self.tuple, &error);
    }
}
