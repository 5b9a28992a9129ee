//! Structured reporting.
//!
//! The dispatcher emits exactly one structured entry per interaction through
//! a [`Reporter`]. Sinks (console, file, queue writers) live behind the
//! trait; [`TracingReporter`] forwards entries to `tracing` and
//! [`MemoryReporter`] keeps them for inspection in tests.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

/// Maximum size of a body rendered into a log entry.
pub const MAXIMUM_LOGGED_PAYLOAD_SIZE: usize = 1024;

/// Severity of a reported entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Structured log sink.
#[async_trait]
pub trait Reporter: Send + Sync + 'static {
    async fn report(&self, level: LogLevel, component: &str, code: &str, payload: Value);
}

/// Forwards entries to `tracing` under the `rsdispatch::report` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

#[async_trait]
impl Reporter for TracingReporter {
    async fn report(&self, level: LogLevel, component: &str, code: &str, payload: Value) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "rsdispatch::report", component, code, %payload)
            }
            LogLevel::Info => {
                tracing::info!(target: "rsdispatch::report", component, code, %payload)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "rsdispatch::report", component, code, %payload)
            }
            LogLevel::Error => {
                tracing::error!(target: "rsdispatch::report", component, code, %payload)
            }
        }
    }
}

/// A captured entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub level: LogLevel,
    pub component: String,
    pub code: String,
    pub payload: Value,
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<ReportEntry>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ReportEntry> {
        self.entries.lock().await.clone()
    }

    /// Entries with the given code.
    pub async fn entries_with_code(&self, code: &str) -> Vec<ReportEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.code == code)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl Reporter for MemoryReporter {
    async fn report(&self, level: LogLevel, component: &str, code: &str, payload: Value) {
        self.entries.lock().await.push(ReportEntry {
            level,
            component: component.to_string(),
            code: code.to_string(),
            payload,
        });
    }
}

/// Renders `value` for a log entry, capped at
/// [`MAXIMUM_LOGGED_PAYLOAD_SIZE`] bytes.
pub fn summarise(value: &Value) -> Value {
    let rendered = value.to_string();
    if rendered.len() <= MAXIMUM_LOGGED_PAYLOAD_SIZE {
        return value.clone();
    }
    let mut cut = MAXIMUM_LOGGED_PAYLOAD_SIZE;
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...[truncated]", &rendered[..cut]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_reporter_captures_entries() {
        let reporter = MemoryReporter::new();
        reporter
            .report(LogLevel::Info, "Widget", "interaction", json!({"status": 200}))
            .await;
        reporter
            .report(LogLevel::Error, "Dispatcher", "fault", json!({}))
            .await;

        let entries = reporter.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].component, "Widget");
        assert_eq!(entries[0].payload["status"], 200);
        assert_eq!(reporter.entries_with_code("fault").await.len(), 1);

        reporter.clear().await;
        assert!(reporter.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_tracing_reporter_does_not_panic_without_subscriber() {
        TracingReporter
            .report(LogLevel::Warn, "Widget", "interaction", json!({"a": 1}))
            .await;
    }

    #[test]
    fn test_summarise_small_payload_is_untouched() {
        let value = json!({"name": "widget"});
        assert_eq!(summarise(&value), value);
    }

    #[test]
    fn test_summarise_caps_large_payload() {
        let value = json!({"blob": "é".repeat(2000)});
        let summary = summarise(&value);
        let text = summary.as_str().unwrap();
        assert!(text.ends_with("...[truncated]"));
        assert!(text.len() <= MAXIMUM_LOGGED_PAYLOAD_SIZE + "...[truncated]".len());
    }

    #[test]
    fn test_levels_order() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert_eq!(LogLevel::Info.as_str(), "info");
    }
}
