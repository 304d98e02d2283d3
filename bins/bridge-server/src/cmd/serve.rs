use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bridge::{Collector, PublisherBridge};
use bridge_api::{MessageProducer, ProducerProperties, RecordError, Tuple};
use producer_memory::MemoryProducer;

use crate::cmd::ack::{AckStats, LoggingAckSink};
use crate::config::{ProducerConfig, ServeArgs, ServerConfig};
use crate::error::ServerError;

type Bridge = PublisherBridge<Value, Value>;

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("bridge-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(
        config = %args.config,
        producer = %config.producer.kind,
        flush_timeout = ?config.producer.flush_timeout(),
        "loaded config"
    );

    // --- Start bridge ---
    let stats = Arc::new(AckStats::default());
    let collector = Collector::new(LoggingAckSink::new(stats.clone()));
    let conf = config.runtime_conf();
    let producer_cfg = &config.producer;
    let bridge: Arc<Bridge> = Arc::new(config.bridge.builder(&conf).start(
        &conf,
        collector,
        |props: &ProducerProperties| create_producer(producer_cfg, props),
    )?);

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let next_id = Arc::new(AtomicU64::new(1));
    let (tx, rx) = mpsc::channel::<Tuple>(config.buffer);

    // --- Processing thread: единственный вызывающий on_record ---
    let worker_bridge = bridge.clone();
    let processing = std::thread::Builder::new()
        .name("bridge-processing".into())
        .spawn(move || process(worker_bridge, rx))?;

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    // --- Tick source ---
    if let Some(period) = config.tick_interval() {
        handles.push(spawn_ticks(period, tx.clone(), next_id.clone(), token.clone()));
        tracing::info!(interval = ?period, "tick source started");
    }

    // --- Input reader ---
    let input = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            tracing::info!(input = %path, "reading records");
            Input::File(BufReader::new(file).lines())
        }
        None => {
            tracing::info!("reading records from stdin");
            Input::Stdin(spawn_stdin(config.buffer)?)
        }
    };
    let reader = spawn_reader(input, tx, next_id, token.clone());

    tracing::info!(bridge = %bridge.name(), mode = %bridge.mode(), "server ready");

    // --- Ожидание Ctrl+C или конца input ---
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("shutting down...");
        }
        _ = token.cancelled() => {}
    }
    token.cancel();

    // Drain: reader + ticks роняют свои sender'ы, processing thread дорабатывает очередь
    let _ = reader.await;
    for h in handles {
        let _ = h.await;
    }
    let drained = tokio::time::timeout(
        config.drain_timeout(),
        tokio::task::spawn_blocking(move || processing.join()),
    )
    .await;
    match drained {
        Ok(Ok(Ok(()))) => {}
        Ok(_) => return Err(ServerError::ProcessingPanicked),
        Err(_) => tracing::warn!(
            timeout = ?config.drain_timeout(),
            "processing queue not drained in time, stopping anyway"
        ),
    }

    // Close producer: in-flight отправки — по его политике
    bridge.stop()?;

    let summary = stats.snapshot();
    tracing::info!(
        acked = summary.acked,
        failed = summary.failed,
        errors = summary.errors,
        ticks = summary.ticks,
        "shutdown complete"
    );
    Ok(())
}

fn create_producer(
    config: &ProducerConfig,
    props: &ProducerProperties,
) -> Result<Arc<dyn MessageProducer<Value, Value>>, RecordError> {
    match config.kind.as_str() {
        "memory" => Ok(Arc::new(MemoryProducer::<Value, Value>::from_properties(props)?)),
        #[cfg(feature = "kafka")]
        "kafka" => Ok(Arc::new(producer_kafka::KafkaProducer::<Value, Value>::with_flush_timeout(
            props,
            config.flush_timeout(),
        )?)),
        other => Err(RecordError::config(format!("unknown producer kind '{other}'"))),
    }
}

fn process(bridge: Arc<Bridge>, mut rx: mpsc::Receiver<Tuple>) {
    let mut processed: u64 = 0;
    while let Some(tuple) = rx.blocking_recv() {
        bridge.on_record(tuple);
        processed += 1;
    }
    tracing::info!(bridge = %bridge.name(), processed, "processing thread stopped");
}

fn spawn_ticks(
    period: std::time::Duration,
    tx: mpsc::Sender<Tuple>,
    next_id: Arc<AtomicU64>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let tick = Tuple::tick(next_id.fetch_add(1, Ordering::Relaxed));
                    if tx.send(tick).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Источник строк input'а.
enum Input {
    File(Lines<BufReader<tokio::fs::File>>),
    /// Строки stdin, прочитанные отдельным std thread'ом.
    Stdin(mpsc::Receiver<io::Result<String>>),
}

impl Input {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self {
            Input::File(lines) => lines.next_line().await,
            Input::Stdin(rx) => rx.recv().await.transpose(),
        }
    }
}

/// Блокирующее чтение stdin в detached thread'е: tokio stdin держит
/// blocking pool, и shutdown после Ctrl+C ждал бы следующей строки.
/// Thread завершается на EOF или когда receiver закрыт.
fn spawn_stdin(buffer: usize) -> io::Result<mpsc::Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel(buffer);
    std::thread::Builder::new().name("stdin-reader".into()).spawn(move || {
        for line in io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    })?;
    Ok(rx)
}

/// JSON-lines → очередь processing thread'а. EOF отменяет token: сервер
/// дорабатывает очередь и выходит.
fn spawn_reader(
    mut input: Input,
    tx: mpsc::Sender<Tuple>,
    next_id: Arc<AtomicU64>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut line_no: u64 = 0;
        loop {
            let line = tokio::select! {
                _ = token.cancelled() => break,
                line = input.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!(lines = line_no, "input exhausted");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "input read error");
                    break;
                }
            };
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line, &next_id) {
                Ok(tuple) => {
                    if tx.send(tuple).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(line = line_no, error = %e, "skipping malformed input line"),
            }
        }
        token.cancel();
    })
}

/// Строка input'а: либо полный tuple (`{"id": .., "values": {..}}`),
/// либо просто объект полей — тогда id назначается по порядку.
fn parse_line(line: &str, next_id: &AtomicU64) -> Result<Tuple, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    match value {
        Value::Object(map) if map.contains_key("id") && map.contains_key("values") => {
            serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())
        }
        Value::Object(map) => Ok(Tuple::new(next_id.fetch_add(1, Ordering::Relaxed), map)),
        other => Err(format!("expected JSON object, got {other}")),
    }
}
