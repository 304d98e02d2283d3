use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bridge_api::{AckSink, RecordError, Tuple, display_value};

/// Счётчики disposition'ов для итогового отчёта.
#[derive(Debug, Default)]
pub struct AckStats {
    acked: AtomicU64,
    ticks: AtomicU64,
    failed: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckSnapshot {
    pub acked: u64,
    pub ticks: u64,
    pub failed: u64,
    pub errors: u64,
}

impl AckStats {
    pub fn snapshot(&self) -> AckSnapshot {
        AckSnapshot {
            acked: self.acked.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Ack sink для standalone-режима: upstream'а с replay нет, поэтому
/// disposition только логируется и считается.
pub struct LoggingAckSink {
    stats: Arc<AckStats>,
}

impl LoggingAckSink {
    pub fn new(stats: Arc<AckStats>) -> Self {
        Self { stats }
    }
}

impl AckSink for LoggingAckSink {
    fn ack(&mut self, tuple: &Tuple) {
        if tuple.is_tick() {
            self.stats.ticks.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.stats.acked.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tuple = tuple.id, "ack");
    }

    fn fail(&mut self, tuple: &Tuple) {
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(tuple = tuple.id, key = %display_value(tuple.value("key")), "fail");
    }

    fn report_error(&mut self, tuple: &Tuple, error: &RecordError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(tuple = tuple.id, kind = %error.kind(), error = %error, "record error");
    }
}
