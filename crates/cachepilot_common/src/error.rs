//! Error types for CachePilot validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::health::TriStateCode;

/// Outcome of every Validator, SecretGenerator and CertificateInspector call.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Category of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Path,
    Permission,
    Certificate,
    ExternalTool,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::Path => "path",
            ErrorKind::Permission => "permission",
            ErrorKind::Certificate => "certificate",
            ErrorKind::ExternalTool => "external_tool",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Malformed or dangerous input, rejected before use
    #[error("Invalid input: {0}")]
    Input(String),

    /// Traversal or containment violation
    #[error("Path rejected: {0}")]
    Path(String),

    /// Mode or ownership mismatch (warning level)
    #[error("Permission check failed: {0}")]
    Permission(String),

    /// Missing, unparseable or expired certificate
    #[error("Certificate problem ({severity}): {message}")]
    Certificate {
        severity: TriStateCode,
        message: String,
    },

    /// A required utility or entropy source is unavailable
    #[error("External tool unavailable: {0}")]
    ExternalTool(String),
}

impl ValidationError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn path(msg: impl Into<String>) -> Self {
        Self::Path(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn certificate(severity: TriStateCode, msg: impl Into<String>) -> Self {
        Self::Certificate {
            severity,
            message: msg.into(),
        }
    }

    pub fn external_tool(msg: impl Into<String>) -> Self {
        Self::ExternalTool(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Path(_) => ErrorKind::Path,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Certificate { .. } => ErrorKind::Certificate,
            Self::ExternalTool(_) => ErrorKind::ExternalTool,
        }
    }

    /// Detail-free message safe to hand to API clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Input(_) => "Invalid input provided",
            Self::Path(_) => "Resource not found",
            Self::Permission(_) => "Access denied",
            Self::Certificate { .. } => "Certificate unavailable",
            Self::ExternalTool(_) => "An error occurred while processing your request",
        }
    }

    /// Severity used when the failure feeds a health aggregate.
    pub fn severity(&self) -> TriStateCode {
        match self {
            Self::Certificate { severity, .. } => *severity,
            Self::Permission(_) => TriStateCode::Degraded,
            _ => TriStateCode::Unhealthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ValidationError::input("x").kind(), ErrorKind::Input);
        assert_eq!(ValidationError::path("x").kind(), ErrorKind::Path);
        assert_eq!(
            ValidationError::certificate(TriStateCode::Degraded, "x").kind(),
            ErrorKind::Certificate
        );
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = ValidationError::path("/etc/shadow escapes /opt/cachepilot");
        assert!(!err.public_message().contains("shadow"));
        assert!(err.to_string().contains("shadow"));
    }

    #[test]
    fn test_severity() {
        assert_eq!(ValidationError::permission("644").severity(), TriStateCode::Degraded);
        assert_eq!(ValidationError::input("bad").severity(), TriStateCode::Unhealthy);
    }
}
