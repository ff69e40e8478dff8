//! CachePilot Daemon - scheduled maintenance and security validation
//!
//! Invoked by the maintenance timer (`cachepilotd run`) and by operators for
//! one-off checks.

use anyhow::Result;
use cachepilot_common::{
    audit_configuration, generate_secure_password, verify_certificate_validity, FileLogSink,
    SecurityEventLogger, SecurityEventType,
};
use cachepilotd::alerts::FileAlertStore;
use cachepilotd::cli::{resolve_cert_path, validate_value, Cli, Commands};
use cachepilotd::orchestrator::run_on_host;
use cachepilotd::Config;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// `check-cert` exit code when the certificate cannot be read
const EXIT_CERT_ERROR: i32 = 3;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    // a scheduled run never fails on its config; one-off commands do
    let config = match (&command, &cli.config) {
        (Commands::Run, path) => Config::load_lenient(path.as_deref()),
        (_, Some(path)) => {
            let mut config = Config::load_from_path(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        (_, None) => Config::load(),
    };

    let code = match command {
        Commands::Run => run_maintenance(&config).await,
        Commands::Audit => audit(&config)?,
        Commands::CheckCert { file, warn_days } => check_cert(&config, &file, warn_days).await,
        Commands::GenPassword { length } => {
            println!("{}", generate_secure_password(length)?);
            0
        }
        Commands::ResolveAlert { id } => {
            let store = FileAlertStore::new(config.paths.alerts_file());
            if store.resolve_alert(&id)? {
                println!("resolved {}", id);
                0
            } else {
                eprintln!("no alert with id {}", id);
                1
            }
        }
        Commands::Validate { kind, value } => {
            match validate_value(kind, &value, &config.paths.base_dir) {
                Ok(normalized) => {
                    println!("{}", normalized);
                    0
                }
                Err(e) => {
                    security_logger(&config)
                        .log_validation_failure(&format!("{:?} value", kind), &e);
                    eprintln!("invalid: {}", e);
                    1
                }
            }
        }
    };

    std::process::exit(code)
}

fn security_logger(config: &Config) -> SecurityEventLogger {
    SecurityEventLogger::new(Arc::new(FileLogSink::new(config.paths.security_log_file())))
}

/// One pipeline run. Failures are logged, never turned into an exit status.
async fn run_maintenance(config: &Config) -> i32 {
    info!("CachePilot maintenance v{} starting", env!("CARGO_PKG_VERSION"));

    match run_on_host(config).await {
        Some(run) => match serde_json::to_string(&run.summary()) {
            Ok(summary) => println!("{}", summary),
            Err(e) => error!("[MAINT] Cannot serialize summary: {}", e),
        },
        None => info!("[MAINT] Skipped, another run is active"),
    }
    0
}

fn audit(config: &Config) -> Result<i32> {
    let report = audit_configuration(&config.paths.config_dir, &config.paths.data_dir);

    let security = security_logger(config);
    for failure in report.failures() {
        security.log_event(
            SecurityEventType::PermissionMismatch,
            &format!(
                "{} has mode {} (expected {})",
                failure.path.display(),
                failure.actual_perm.as_deref().unwrap_or("unknown"),
                failure.expected_perm
            ),
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.passed() { 0 } else { 1 })
}

async fn check_cert(config: &Config, file: &Path, warn_days: i64) -> i32 {
    let roots = [config.paths.ca_dir.as_path(), config.paths.base_dir.as_path()];
    let file = match resolve_cert_path(file, &roots) {
        Ok(file) => file,
        Err(e) => {
            security_logger(config).log_validation_failure("certificate path", &e);
            eprintln!("invalid: {}", e);
            return EXIT_CERT_ERROR;
        }
    };

    match verify_certificate_validity(&file, warn_days).await {
        Ok(code) => {
            println!("{}", code);
            i32::from(code.code())
        }
        Err(e) => {
            eprintln!("{}", e);
            EXIT_CERT_ERROR
        }
    }
}
