//! Identifier validation
//!
//! Tenant names, ports, memory limits, domains, e-mail addresses, backup
//! archive names and password strength. Reserved values are kept as static
//! sets so callers and tests can query them directly.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ValidationError, ValidationResult};

pub const TENANT_NAME_MIN_LEN: usize = 3;
pub const TENANT_NAME_MAX_LEN: usize = 63;

/// Names that would collide with infrastructure or environment labels
pub const RESERVED_TENANT_NAMES: &[&str] = &[
    "test",
    "prod",
    "dev",
    "staging",
    "localhost",
    "redis",
    "admin",
    "root",
    "system",
];

pub const MIN_PORT: u32 = 1024;
pub const MAX_PORT: u32 = 65535;

/// Ports used by the platform itself
pub const RESERVED_PORTS: &[u16] = &[6379, 8000, 8001, 8080, 8443, 9090];

pub const MIN_MEMORY_MB: u32 = 64;
pub const MAX_MEMORY_MB: u32 = 65536;

pub const MAX_DOMAIN_LEN: usize = 253;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_BACKUP_NAME_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 16;

static TENANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*[a-z0-9]$").expect("static regex"));

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$",
    )
    .expect("static regex")
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("static regex")
});

static BACKUP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+\.(?:tar\.gz|zip)$").expect("static regex"));

const PASSWORD_SPECIALS: &str = "!@#$%^&*()_+-=[]{};:,.<>?";

pub fn is_reserved_tenant_name(name: &str) -> bool {
    RESERVED_TENANT_NAMES.contains(&name)
}

pub fn is_reserved_port(port: u16) -> bool {
    RESERVED_PORTS.contains(&port)
}

/// Strict tenant name check; the name doubles as a container and directory name.
pub fn validate_tenant_name_strict(name: &str) -> ValidationResult<&str> {
    let len = name.len();
    if !(TENANT_NAME_MIN_LEN..=TENANT_NAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::input(format!(
            "tenant name must be {}-{} characters long",
            TENANT_NAME_MIN_LEN, TENANT_NAME_MAX_LEN
        )));
    }

    if !TENANT_RE.is_match(name) {
        return Err(ValidationError::input(
            "tenant name must start with a letter, contain only lowercase letters, \
             numbers and hyphens, and not end with a hyphen",
        ));
    }

    if name.contains("--") {
        return Err(ValidationError::input(
            "tenant name cannot contain consecutive hyphens",
        ));
    }

    if is_reserved_tenant_name(name) {
        return Err(ValidationError::input(format!(
            "tenant name '{}' is reserved",
            name
        )));
    }

    Ok(name)
}

pub fn validate_port_number(port: u32) -> ValidationResult<u16> {
    if port < MIN_PORT {
        return Err(ValidationError::input(format!(
            "port must be {} or higher (privileged ports not allowed)",
            MIN_PORT
        )));
    }
    if port > MAX_PORT {
        return Err(ValidationError::input(format!(
            "port must be {} or lower",
            MAX_PORT
        )));
    }

    let port = port as u16;
    if is_reserved_port(port) {
        return Err(ValidationError::input(format!(
            "port {} is reserved for system use",
            port
        )));
    }

    Ok(port)
}

/// Port given as text (CLI flag, env file value).
pub fn parse_port_number(raw: &str) -> ValidationResult<u16> {
    let port: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::input(format!("port '{}' is not numeric", raw)))?;
    validate_port_number(port)
}

pub fn validate_memory_limit(mb: u32) -> ValidationResult<u32> {
    if mb < MIN_MEMORY_MB {
        return Err(ValidationError::input(format!(
            "memory limit must be at least {} MB",
            MIN_MEMORY_MB
        )));
    }
    if mb > MAX_MEMORY_MB {
        return Err(ValidationError::input(format!(
            "memory limit cannot exceed {} MB",
            MAX_MEMORY_MB
        )));
    }
    Ok(mb)
}

pub fn parse_memory_limit(raw: &str) -> ValidationResult<u32> {
    let mb: u32 = raw
        .trim()
        .parse()
        .map_err(|_| ValidationError::input(format!("memory limit '{}' is not numeric", raw)))?;
    validate_memory_limit(mb)
}

pub fn validate_domain_name(domain: &str) -> ValidationResult<&str> {
    if domain.is_empty() {
        return Err(ValidationError::input("domain must not be empty"));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(ValidationError::input(format!(
            "domain name too long (max {} characters)",
            MAX_DOMAIN_LEN
        )));
    }
    if !DOMAIN_RE.is_match(domain) {
        return Err(ValidationError::input("invalid domain name format"));
    }
    Ok(domain)
}

pub fn validate_email_address(email: &str) -> ValidationResult<&str> {
    if email.is_empty() {
        return Err(ValidationError::input("email must not be empty"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::input("email address too long"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::input("invalid email address format"));
    }
    Ok(email)
}

/// Backup archives are `<name>.tar.gz` or `<name>.zip` with a plain stem.
pub fn validate_backup_name(name: &str) -> ValidationResult<&str> {
    if name.is_empty() {
        return Err(ValidationError::input("backup name must not be empty"));
    }
    if name.len() > MAX_BACKUP_NAME_LEN {
        return Err(ValidationError::input("backup name too long"));
    }
    if !BACKUP_NAME_RE.is_match(name) {
        return Err(ValidationError::input("invalid backup file name format"));
    }
    Ok(name)
}

pub fn validate_password_strength(password: &str, min_length: usize) -> ValidationResult<()> {
    if password.chars().count() < min_length {
        return Err(ValidationError::input(format!(
            "password must be at least {} characters",
            min_length
        )));
    }

    let checks: [(&str, fn(char) -> bool); 4] = [
        ("lowercase letters", |c| c.is_ascii_lowercase()),
        ("uppercase letters", |c| c.is_ascii_uppercase()),
        ("numbers", |c| c.is_ascii_digit()),
        ("special characters", |c| PASSWORD_SPECIALS.contains(c)),
    ];

    for (label, check) in checks {
        if !password.chars().any(check) {
            return Err(ValidationError::input(format!(
                "password must contain {}",
                label
            )));
        }
    }

    Ok(())
}
