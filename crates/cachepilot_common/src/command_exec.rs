//! GuardedCommand - the single process-execution path
//!
//! - Program must pass the command whitelist
//! - Arguments marked untrusted must pass `sanitize_input`
//! - Every spawn has a bounded timeout; the child is killed when it expires
//! - Output is captured (truncated at 64 KiB) and returned without
//!   interpretation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command_whitelist::check_command_whitelist;
use crate::error::ValidationError;
use crate::sanitize::sanitize_input;

/// Maximum output length to capture
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Default timeout for external commands
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command blocked: {0}")]
    NotWhitelisted(ValidationError),

    #[error("argument rejected: {0}")]
    Rejected(ValidationError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with {code}: {stderr}")]
    NonZero {
        program: String,
        code: i32,
        stderr: String,
    },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub program: String,
    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone)]
struct Arg {
    value: String,
    untrusted: bool,
    /// masked in `display()`
    secret: bool,
}

/// Builder for a whitelisted, time-bounded external command
#[derive(Debug, Clone)]
pub struct GuardedCommand {
    program: String,
    args: Vec<Arg>,
    timeout: Duration,
    current_dir: Option<PathBuf>,
}

impl GuardedCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            current_dir: None,
        }
    }

    /// Build from an operator-configured argv; every argument is untrusted.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        let mut cmd = Self::new(program.clone());
        for arg in rest {
            cmd = cmd.untrusted_arg(arg.clone());
        }
        Some(cmd)
    }

    /// Literal argument written by us
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            untrusted: false,
            secret: false,
        });
        self
    }

    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for v in values {
            self = self.arg(v);
        }
        self
    }

    /// Argument derived from tenant, user or config input
    pub fn untrusted_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            untrusted: true,
            secret: false,
        });
        self
    }

    /// Untrusted argument that must not appear in logs (passwords)
    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            untrusted: true,
            secret: true,
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().map(|a| {
            if a.secret {
                "********".to_string()
            } else {
                a.value.clone()
            }
        }));
        parts.join(" ")
    }

    /// Whitelist and sanitize without spawning.
    pub fn validate(&self) -> Result<(), CommandError> {
        check_command_whitelist(&self.program).map_err(CommandError::NotWhitelisted)?;
        for arg in self.args.iter().filter(|a| a.untrusted) {
            sanitize_input(&arg.value, true).map_err(CommandError::Rejected)?;
        }
        Ok(())
    }

    /// Run the command; a non-zero exit is still `Ok`.
    pub async fn run(&self) -> Result<CommandOutput, CommandError> {
        self.validate()?;

        let start = Instant::now();
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|a| a.value.as_str()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        debug!("[EXEC] {}", self.display());

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CommandError::Spawn {
                    program: self.program.clone(),
                    source: e,
                })
            }
            Err(_) => {
                warn!("[EXEC] Timeout after {:?}: {}", self.timeout, self.display());
                return Err(CommandError::Timeout {
                    program: self.program.clone(),
                    secs: self.timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            program: self.program.clone(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: truncate_output(&output.stdout),
            stderr: truncate_output(&output.stderr),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run the command and treat a non-zero exit as an error.
    pub async fn run_checked(&self) -> Result<CommandOutput, CommandError> {
        let output = self.run().await?;
        if !output.success() {
            return Err(CommandError::NonZero {
                program: output.program,
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn truncate_output(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_OUTPUT_BYTES {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };
    String::from_utf8_lossy(slice).to_string()
}
