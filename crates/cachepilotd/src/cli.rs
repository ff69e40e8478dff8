//! CLI - Command-line argument parsing
//!
//! Defines the cachepilotd command structure using clap and the
//! single-value validation behind `cachepilotd validate`.

use cachepilot_common::{
    check_command_whitelist, parse_memory_limit, parse_port_number, sanitize_input,
    validate_backup_name, validate_domain_name, validate_email_address, validate_path,
    validate_password_strength, validate_tenant_name_strict, validate_tls_cert_path,
    ValidationError, ValidationResult,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use cachepilot_common::certificate::DEFAULT_WARN_DAYS;
use cachepilot_common::identifiers::MIN_PASSWORD_LEN;
use cachepilot_common::secrets::DEFAULT_PASSWORD_LENGTH;

/// CachePilot maintenance daemon
#[derive(Parser, Debug)]
#[command(name = "cachepilotd")]
#[command(about = "CachePilot - scheduled maintenance and security validation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (overrides $CACHEPILOT_CONFIG and the default locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the maintenance pipeline once (always exits 0)
    Run,

    /// Audit permissions on secrets and data directories
    Audit,

    /// Classify a certificate's expiry (exit 0/1/2, 3 on error)
    CheckCert {
        file: PathBuf,

        #[arg(long, default_value_t = DEFAULT_WARN_DAYS)]
        warn_days: i64,
    },

    /// Print a random password
    GenPassword {
        #[arg(long, default_value_t = DEFAULT_PASSWORD_LENGTH)]
        length: usize,
    },

    /// Mark an alert resolved
    ResolveAlert { id: String },

    /// Check one value with a validator
    Validate {
        #[arg(value_enum)]
        kind: ValidateKind,
        value: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidateKind {
    Tenant,
    Port,
    Memory,
    Domain,
    Email,
    Path,
    Input,
    Command,
    BackupName,
    Password,
}

/// Run the validator for `kind`; `Ok` carries the normalized value.
pub fn validate_value(kind: ValidateKind, value: &str, base_dir: &Path) -> ValidationResult<String> {
    match kind {
        ValidateKind::Tenant => validate_tenant_name_strict(value).map(str::to_string),
        ValidateKind::Port => parse_port_number(value).map(|p| p.to_string()),
        ValidateKind::Memory => parse_memory_limit(value).map(|m| m.to_string()),
        ValidateKind::Domain => validate_domain_name(value).map(str::to_string),
        ValidateKind::Email => validate_email_address(value).map(str::to_string),
        ValidateKind::Path => validate_path(value, &base_dir.to_string_lossy())
            .map(|p| p.display().to_string()),
        ValidateKind::Input => sanitize_input(value, false).map(str::to_string),
        ValidateKind::Command => check_command_whitelist(value).map(|_| value.to_string()),
        ValidateKind::BackupName => validate_backup_name(value).map(str::to_string),
        ValidateKind::Password => {
            validate_password_strength(value, MIN_PASSWORD_LEN).map(|_| "strong".to_string())
        }
    }
}

/// Certificate file contained in one of `roots` (first match wins).
pub fn resolve_cert_path(file: &Path, roots: &[&Path]) -> ValidationResult<PathBuf> {
    let raw = file.to_string_lossy();
    let mut last_err = ValidationError::input("no certificate root configured");
    for root in roots {
        match validate_tls_cert_path(&raw, &root.to_string_lossy()) {
            Ok(resolved) => return Ok(resolved),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["cachepilotd"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["cachepilotd", "check-cert", "/ca/ca.crt", "--warn-days", "14"]);
        assert_eq!(
            cli.command,
            Some(Commands::CheckCert {
                file: PathBuf::from("/ca/ca.crt"),
                warn_days: 14
            })
        );

        let cli = Cli::parse_from(["cachepilotd", "--config", "/tmp/m.toml", "validate", "backup-name", "a.zip"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Validate { kind: ValidateKind::BackupName, .. })
        ));
    }

    #[test]
    fn test_validate_value() {
        let base = Path::new("/opt/cachepilot");
        assert_eq!(validate_value(ValidateKind::Port, "7300", base).unwrap(), "7300");
        assert!(validate_value(ValidateKind::Port, "6379", base).is_err());
        assert!(validate_value(ValidateKind::Port, "seven", base).is_err());
        assert!(validate_value(ValidateKind::Tenant, "test", base).is_err());
        assert!(validate_value(ValidateKind::Command, "bash -c id", base).is_err());
        assert!(validate_value(ValidateKind::Command, "docker ps", base).is_ok());
        assert!(validate_value(ValidateKind::Input, "a;b", base).is_err());
    }

    #[test]
    fn test_resolve_cert_path() {
        let ca = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        std::fs::write(ca.path().join("ca.crt"), "x").unwrap();
        std::fs::write(base.path().join("redis.pem"), "x").unwrap();
        std::fs::write(base.path().join("notes.txt"), "x").unwrap();
        std::fs::write(elsewhere.path().join("stray.crt"), "x").unwrap();
        let roots = [ca.path(), base.path()];

        let resolved = resolve_cert_path(&ca.path().join("ca.crt"), &roots).unwrap();
        assert!(resolved.ends_with("ca.crt"));
        assert!(resolve_cert_path(&base.path().join("redis.pem"), &roots).is_ok());
        assert!(resolve_cert_path(&base.path().join("notes.txt"), &roots).is_err());
        assert!(resolve_cert_path(&elsewhere.path().join("stray.crt"), &roots).is_err());
        assert!(resolve_cert_path(Path::new("../ca.crt"), &roots).is_err());
        assert!(resolve_cert_path(&ca.path().join("ca.crt"), &[]).is_err());
    }

    #[test]
    fn test_validate_path_kind() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("tenants/x")).unwrap();
        let resolved = validate_value(ValidateKind::Path, "tenants/x", temp.path()).unwrap();
        assert!(resolved.ends_with("tenants/x"));
        assert!(validate_value(ValidateKind::Path, "../etc", temp.path()).is_err());
    }
}
