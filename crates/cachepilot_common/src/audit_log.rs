//! Security Event Log v2.2.0
//!
//! Append-only record of security-relevant actions and violations.
//! One plain-text line per event: `[timestamp] [SECURITY] [TYPE] details`.
//! CRITICAL and ERROR events are duplicated to the error stream.
//!
//! Storage: {logs_dir}/security.log (retention is operator-managed)

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationError;
use crate::logging::{LogSink, StderrSink};

/// Security log file name under the logs directory
pub const SECURITY_LOG_FILE: &str = "security.log";

/// Redacted details are cut at this many bytes
const MAX_DETAILS_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    Critical,
    Error,
    Warning,
    Info,
    ValidationFailure,
    CommandBlocked,
    PermissionMismatch,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::CommandBlocked => "COMMAND_BLOCKED",
            Self::PermissionMismatch => "PERMISSION_MISMATCH",
        }
    }

    /// Also goes to the error stream
    pub fn escalates(&self) -> bool {
        matches!(self, Self::Critical | Self::Error)
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: SecurityEventType,
    pub details: String,
}

impl SecurityEvent {
    /// Build an event; details are redacted on the way in.
    pub fn new(event_type: SecurityEventType, details: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            details: sanitize_for_audit(details),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[{}] [SECURITY] [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.event_type,
            self.details
        )
    }
}

/// Writer for security events
#[derive(Clone)]
pub struct SecurityEventLogger {
    sink: Arc<dyn LogSink>,
    error_stream: Arc<dyn LogSink>,
}

impl SecurityEventLogger {
    /// Logger whose escalations go to stderr
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_error_stream(sink, Arc::new(StderrSink))
    }

    pub fn with_error_stream(sink: Arc<dyn LogSink>, error_stream: Arc<dyn LogSink>) -> Self {
        Self { sink, error_stream }
    }

    pub fn log(&self, event: &SecurityEvent) {
        let line = event.render();

        if let Err(e) = self.sink.write_line(&line) {
            tracing::error!("[SECURITY] failed to append security event: {}", e);
        }

        if event.event_type.escalates() {
            tracing::error!("[SECURITY] [{}] {}", event.event_type, event.details);
            if let Err(e) = self.error_stream.write_line(&line) {
                tracing::error!("[SECURITY] failed to write to error stream: {}", e);
            }
        } else {
            tracing::info!("[SECURITY] [{}] {}", event.event_type, event.details);
        }
    }

    pub fn log_event(&self, event_type: SecurityEventType, details: &str) {
        self.log(&SecurityEvent::new(event_type, details));
    }

    /// Record a rejected input or path
    pub fn log_validation_failure(&self, what: &str, err: &ValidationError) {
        self.log_event(
            SecurityEventType::ValidationFailure,
            &format!("{} rejected ({}): {}", what, err.kind().as_str(), err),
        );
    }
}

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)(password|passwd|pwd)\s*[=:]\s*\S+",
            "[REDACTED_PASSWORD]",
        ),
        (r"(?i)(requirepass)\s+\S+", "requirepass [REDACTED]"),
        (
            r"(?i)(api[_-]?key|apikey)\s*[=:]\s*\S+",
            "[REDACTED_API_KEY]",
        ),
        (r"(?i)(secret|token)\s*[=:]\s*\S+", "[REDACTED_SECRET]"),
        (r"(?i)(bearer)\s+\S+", "Bearer [REDACTED]"),
        (r"(?i)Authorization:\s*\S+", "Authorization: [REDACTED]"),
    ]
    .into_iter()
    .map(|(p, r)| (Regex::new(p).expect("static regex"), r))
    .collect()
});

/// Strip secrets and bound the length of free text bound for the security log
pub fn sanitize_for_audit(text: &str) -> String {
    let mut sanitized = text.replace(['\n', '\r'], " ");

    for (re, replacement) in SECRET_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }

    if sanitized.len() > MAX_DETAILS_LEN {
        let mut cut = MAX_DETAILS_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}... [truncated]", &sanitized[..cut]);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;

    fn logger() -> (SecurityEventLogger, MemorySink, MemorySink) {
        let sink = MemorySink::new();
        let errors = MemorySink::new();
        let logger =
            SecurityEventLogger::with_error_stream(Arc::new(sink.clone()), Arc::new(errors.clone()));
        (logger, sink, errors)
    }

    #[test]
    fn test_line_format() {
        let event = SecurityEvent::new(SecurityEventType::Warning, "3 audit findings");
        let line = event.render();
        assert!(line.starts_with('['));
        assert!(line.contains("] [SECURITY] [WARNING] 3 audit findings"));
    }

    #[test]
    fn test_critical_and_error_escalate() {
        let (logger, sink, errors) = logger();
        logger.log_event(SecurityEventType::Info, "audit started");
        logger.log_event(SecurityEventType::Error, "container daemon down");
        logger.log_event(SecurityEventType::Critical, "CA key world-readable");

        assert_eq!(sink.lines().len(), 3);
        let escalated = errors.lines();
        assert_eq!(escalated.len(), 2);
        assert!(escalated[0].contains("[ERROR] container daemon down"));
        assert!(escalated[1].contains("[CRITICAL]"));
    }

    #[test]
    fn test_details_redacted() {
        let (logger, sink, _) = logger();
        logger.log_event(
            SecurityEventType::CommandBlocked,
            "redis-cli -a x password=hunter2 api_key: abc123",
        );
        let line = &sink.lines()[0];
        assert!(!line.contains("hunter2"));
        assert!(!line.contains("abc123"));
        assert!(line.contains("[REDACTED_PASSWORD]"));
    }

    #[test]
    fn test_details_single_line_and_bounded() {
        let long = format!("first\nsecond {}", "x".repeat(5000));
        let sanitized = sanitize_for_audit(&long);
        assert!(!sanitized.contains('\n'));
        assert!(sanitized.ends_with("... [truncated]"));
        assert!(sanitized.len() < 1100);
    }

    #[test]
    fn test_validation_failure_event() {
        let (logger, sink, errors) = logger();
        logger.log_validation_failure("tenant name", &ValidationError::input("reserved name"));
        assert!(sink.contains("[VALIDATION_FAILURE] tenant name rejected (input)"));
        assert!(errors.lines().is_empty());
    }
}
