//! Telemetry port used by the pipeline for validation diagnostics.

use std::fmt;

use parking_lot::Mutex;
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

pub trait Telemetry: Send + Sync + fmt::Debug {
    fn log(&self, level: LogLevel, message: &str, meta: &Json);
    fn record_metric(&self, name: &str, tags: &[(&str, String)]);
}

/// Forwards everything into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn log(&self, level: LogLevel, message: &str, meta: &Json) {
        match level {
            LogLevel::Debug => tracing::debug!(meta = %meta, "{message}"),
            LogLevel::Info => tracing::info!(meta = %meta, "{message}"),
            LogLevel::Warn => tracing::warn!(meta = %meta, "{message}"),
            LogLevel::Error => tracing::error!(meta = %meta, "{message}"),
        }
    }

    fn record_metric(&self, name: &str, tags: &[(&str, String)]) {
        tracing::debug!(metric = name, tags = ?tags, "metric recorded");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub meta: Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecord {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

/// In-memory recorder for tests.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    logs: Mutex<Vec<LogRecord>>,
    metrics: Mutex<Vec<MetricRecord>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().clone()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.metrics.lock().clone()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.logs.lock().iter().filter(|r| r.level == level).count()
    }

    /// Records whose message contains `needle`.
    pub fn find(&self, needle: &str) -> Vec<LogRecord> {
        self.logs
            .lock()
            .iter()
            .filter(|r| r.message.contains(needle))
            .cloned()
            .collect()
    }
}

impl Telemetry for MemoryTelemetry {
    fn log(&self, level: LogLevel, message: &str, meta: &Json) {
        self.logs.lock().push(LogRecord {
            level,
            message: message.to_string(),
            meta: meta.clone(),
        });
    }

    fn record_metric(&self, name: &str, tags: &[(&str, String)]) {
        self.metrics.lock().push(MetricRecord {
            name: name.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
    }
}
