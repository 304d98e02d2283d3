#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};

use bridge::{Collector, FieldNameMapper};
use bridge_api::{
    AckSink, Completion, ErrorKind, MessageProducer, OutboundMessage, ProducerProperties,
    RecordError, RecordMapper, SendCompleter, SendHandle, Tuple,
};

// ═══════════════════════════════════════════════════════════════
//  Recording ack sink
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Ack(u64),
    Fail(u64),
    Report(u64, ErrorKind),
}

impl SinkEvent {
    pub fn id(&self) -> u64 {
        match self {
            SinkEvent::Ack(id) | SinkEvent::Fail(id) | SinkEvent::Report(id, _) => *id,
        }
    }

    pub fn is_disposition(&self) -> bool {
        !matches!(self, SinkEvent::Report(..))
    }
}

/// Журнал вызовов sink'а + детектор одновременного входа.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    inside: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn dispositions_of(&self, id: u64) -> Vec<SinkEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.id() == id && e.is_disposition())
            .collect()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn record(&self, event: SinkEvent) {
        if self.inside.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        // widen the window for interleaving
        std::thread::yield_now();
        self.events.lock().push(event);
        self.inside.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AckSink for RecordingSink {
    fn ack(&mut self, tuple: &Tuple) {
        self.record(SinkEvent::Ack(tuple.id));
    }

    fn fail(&mut self, tuple: &Tuple) {
        self.record(SinkEvent::Fail(tuple.id));
    }

    fn report_error(&mut self, tuple: &Tuple, error: &RecordError) {
        self.record(SinkEvent::Report(tuple.id, error.kind()));
    }
}

/// Sink, который паникует на каждом вызове.
pub struct PanickingSink;

impl AckSink for PanickingSink {
    fn ack(&mut self, _tuple: &Tuple) {
        panic!("sink exploded on ack");
    }

    fn fail(&mut self, _tuple: &Tuple) {
        panic!("sink exploded on fail");
    }

    fn report_error(&mut self, _tuple: &Tuple, _error: &RecordError) {
        panic!("sink exploded on report_error");
    }
}

pub fn collector() -> (Collector, RecordingSink) {
    let sink = RecordingSink::default();
    (Collector::new(sink.clone()), sink)
}

// ═══════════════════════════════════════════════════════════════
//  Manual producer: тест сам решает когда и чем завершить отправку
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct ManualProducer {
    in_flight: Mutex<Vec<(OutboundMessage<Value, Value>, SendCompleter)>>,
    submitted: AtomicUsize,
    closed: AtomicBool,
}

impl ManualProducer {
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn take_in_flight(&self) -> Vec<(OutboundMessage<Value, Value>, SendCompleter)> {
        std::mem::take(&mut *self.in_flight.lock())
    }
}

impl MessageProducer<Value, Value> for ManualProducer {
    fn submit(&self, message: OutboundMessage<Value, Value>, on_complete: Option<Completion>) -> SendHandle {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let (completer, handle) = SendCompleter::new(on_complete);
        self.in_flight.lock().push((message, completer));
        handle
    }

    fn close(&self) -> Result<(), RecordError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Где producer паникует внутри `submit`.
#[derive(Debug, Clone, Copy)]
pub enum PanicPoint {
    /// До создания SendCompleter: callback уничтожается вместе с аргументами.
    BeforeCompleter,
    /// После: completer дропается во время unwind.
    AfterCompleter,
}

pub struct ExplodingProducer {
    point: PanicPoint,
}

impl ExplodingProducer {
    pub fn new(point: PanicPoint) -> Self {
        Self { point }
    }
}

impl MessageProducer<Value, Value> for ExplodingProducer {
    fn submit(&self, _message: OutboundMessage<Value, Value>, on_complete: Option<Completion>) -> SendHandle {
        match self.point {
            PanicPoint::BeforeCompleter => panic!("producer exploded before completer"),
            PanicPoint::AfterCompleter => {
                let (_completer, _handle) = SendCompleter::new(on_complete);
                panic!("producer exploded after completer");
            }
        }
    }

    fn close(&self) -> Result<(), RecordError> {
        Ok(())
    }
}

pub type Factory =
    Box<dyn Fn(&ProducerProperties) -> Result<Arc<dyn MessageProducer<Value, Value>>, RecordError>>;

/// Factory, отдающая bridge'у заранее созданный producer.
pub fn factory_of<P>(producer: Arc<P>) -> Factory
where
    P: MessageProducer<Value, Value> + 'static,
{
    Box::new(move |_props: &ProducerProperties| {
        let producer: Arc<dyn MessageProducer<Value, Value>> = producer.clone();
        Ok::<_, RecordError>(producer)
    })
}

// ═══════════════════════════════════════════════════════════════
//  Mappers / tuples
// ═══════════════════════════════════════════════════════════════

/// FieldNameMapper со счётчиком вызовов.
#[derive(Clone, Default)]
pub struct CountingMapper {
    inner: FieldNameMapper,
    pub calls: Arc<AtomicUsize>,
}

impl RecordMapper<Value, Value> for CountingMapper {
    fn key(&self, tuple: &Tuple) -> Result<Option<Value>, RecordError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.key(tuple)
    }

    fn message(&self, tuple: &Tuple) -> Result<Value, RecordError> {
        self.inner.message(tuple)
    }
}

pub struct PanickingMapper;

impl RecordMapper<Value, Value> for PanickingMapper {
    fn key(&self, _tuple: &Tuple) -> Result<Option<Value>, RecordError> {
        panic!("mapper exploded");
    }

    fn message(&self, _tuple: &Tuple) -> Result<Value, RecordError> {
        Ok(Value::Null)
    }
}

pub fn record(id: u64, key: &str, message: &str) -> Tuple {
    let Value::Object(values) = json!({ "key": key, "message": message }) else {
        unreachable!()
    };
    Tuple::new(id, values)
}
