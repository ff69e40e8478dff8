//! CachePilot Common - security validation toolkit v2.2.0
//!
//! Guarded primitives shared by the maintenance daemon and tenant tooling:
//! path containment, input sanitization, permission/ownership checks,
//! certificate expiry, secrets, the command whitelist and the security log.

pub mod audit_log;
pub mod certificate;
pub mod command_exec;
pub mod command_whitelist;
pub mod error;
pub mod health;
pub mod identifiers;
pub mod logging;
pub mod path_guard;
pub mod permissions;
pub mod sanitize;
pub mod secrets;
pub mod security_audit;

pub use audit_log::{sanitize_for_audit, SecurityEvent, SecurityEventLogger, SecurityEventType};
pub use certificate::{verify_certificate_validity, CertificateInspector, CertificateRecord};
pub use command_exec::{CommandError, CommandOutput, GuardedCommand};
pub use command_whitelist::check_command_whitelist;
pub use error::{ErrorKind, ValidationError, ValidationResult};
pub use health::TriStateCode;
pub use identifiers::{
    parse_memory_limit, parse_port_number, validate_backup_name, validate_domain_name,
    validate_email_address, validate_memory_limit, validate_password_strength,
    validate_port_number, validate_tenant_name_strict,
};
pub use logging::{
    FileLogSink, LogEntry, LogLevel, LogSink, MemorySink, StderrSink, StructuredLogger,
};
pub use path_guard::{validate_path, validate_tls_cert_path};
pub use permissions::{check_permissions, verify_ownership};
pub use sanitize::{contains_suspicious_pattern, sanitize_command_argument, sanitize_input};
pub use secrets::{generate_secure_password, secure_file_deletion};
pub use security_audit::{audit_configuration, PathCheck, SecurityAuditReport};
