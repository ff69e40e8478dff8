//! Structured log lines
//!
//! Components receive a `LogSink` instead of reaching for a global log file.
//! Lines have the form `timestamp LEVEL component message [json-context]`.
//! Every entry is mirrored to `tracing`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::permissions::append_line;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Destination for complete log lines
pub trait LogSink: Send + Sync {
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Append-only file; one `write` per line
#[derive(Debug, Clone)]
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        append_line(&self.path, line)
    }
}

/// Writes to the process error stream
#[derive(Debug, Clone, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "{}", line)
    }
}

/// Keeps lines in memory (tests, dry runs)
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory sink poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

/// One structured log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn new(level: LogLevel, component: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn render(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.level.as_str(),
            self.component,
            self.message
        );
        if let Some(ctx) = &self.context {
            line.push(' ');
            line.push_str(&ctx.to_string());
        }
        line
    }
}

/// Component-scoped writer over a shared sink
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
    sink: Arc<dyn LogSink>,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            component: component.into(),
            sink,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn log(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Debug => tracing::debug!("[{}] {}", entry.component, entry.message),
            LogLevel::Info => tracing::info!("[{}] {}", entry.component, entry.message),
            LogLevel::Warn => tracing::warn!("[{}] {}", entry.component, entry.message),
            LogLevel::Error => tracing::error!("[{}] {}", entry.component, entry.message),
        }

        // a broken log file must not take the caller down with it
        if let Err(e) = self.sink.write_line(&entry.render()) {
            tracing::error!("[LOG] failed to write log line: {}", e);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Info, &self.component, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Warn, &self.component, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogEntry::new(LogLevel::Error, &self.component, message));
    }

    pub fn info_with(&self, message: impl Into<String>, context: serde_json::Value) {
        self.log(LogEntry::new(LogLevel::Info, &self.component, message).with_context(context));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_format() {
        let entry = LogEntry::new(LogLevel::Warn, "maintenance", "3 unresolved alerts")
            .with_context(serde_json::json!({"unresolved_alerts": 3}));
        let line = entry.render();
        let parts: Vec<&str> = line.splitn(4, ' ').collect();

        assert!(DateTime::parse_from_rfc3339(parts[0]).is_ok());
        assert_eq!(parts[1], "WARN");
        assert_eq!(parts[2], "maintenance");
        assert!(line.ends_with(r#"{"unresolved_alerts":3}"#));
    }

    #[test]
    fn test_render_without_context() {
        let line = LogEntry::new(LogLevel::Info, "maintenance", "started").render();
        assert!(line.ends_with("INFO maintenance started"));
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        let logger = StructuredLogger::new("maintenance", Arc::new(sink.clone()));
        logger.info("one");
        logger.error("two");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("ERROR maintenance two"));
    }

    #[test]
    fn test_file_sink_appends() {
        let temp = TempDir::new().unwrap();
        let sink = FileLogSink::new(temp.path().join("maintenance/run.log"));
        sink.write_line("a").unwrap();
        sink.write_line("b").unwrap();
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
