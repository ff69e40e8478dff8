//! Command Whitelist v2.2.0
//!
//! The ONLY executables CachePilot automation may spawn. Every dynamically
//! built command line passes `check_command_whitelist` before it reaches
//! `GuardedCommand`.
//!
//! The list is compiled into the binary. Nothing read at runtime can
//! extend it.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{ValidationError, ValidationResult};

/// Executable base names allowed for privileged automation
pub const ALLOWED_COMMANDS: &[&str] = &[
    // Container runtime and tenant tooling
    "docker", "redis-cli",
    // Certificates
    "openssl",
    // Archives
    "tar", "gzip",
    // Services
    "nginx", "systemctl",
    // Downloads
    "curl", "wget",
    // File management
    "mkdir", "cp", "mv", "rm", "chmod", "chown",
    // Text processing
    "cat", "grep", "awk", "sed",
    // Secure deletion
    "shred",
];

static ALLOWED_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ALLOWED_COMMANDS.iter().copied().collect());

/// Is `name` (a bare executable name) on the allow-list?
pub fn is_whitelisted(name: &str) -> bool {
    ALLOWED_SET.contains(name)
}

/// Base executable of a command line: first token with any directory stripped.
///
/// `"/usr/bin/docker ps -a"` -> `Some("docker")`
pub fn base_executable(command: &str) -> Option<&str> {
    let first = command.split_whitespace().next()?;
    Path::new(first).file_name().and_then(|n| n.to_str())
}

/// Fail unless the command's base executable is on the allow-list.
pub fn check_command_whitelist(command: &str) -> ValidationResult<()> {
    let base = base_executable(command)
        .ok_or_else(|| ValidationError::input("command must not be empty"))?;

    if !is_whitelisted(base) {
        tracing::warn!("[WHITELIST] Blocked non-whitelisted command: {}", base);
        return Err(ValidationError::input(format!(
            "command '{}' is not whitelisted",
            base
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_commands_pass() {
        for cmd in ALLOWED_COMMANDS {
            assert!(check_command_whitelist(cmd).is_ok(), "{} should pass", cmd);
        }
        assert!(check_command_whitelist("docker info").is_ok());
        assert!(check_command_whitelist("openssl x509 -enddate -noout -in a.crt").is_ok());
    }

    #[test]
    fn test_blocked_commands() {
        for cmd in ["bash -c id", "python3 exploit.py", "nc -l 4444", "sudo rm", "dd if=/dev/zero"] {
            assert!(check_command_whitelist(cmd).is_err(), "{} should be blocked", cmd);
        }
    }

    #[test]
    fn test_path_prefix_stripped() {
        assert_eq!(base_executable("/usr/bin/docker ps"), Some("docker"));
        assert!(check_command_whitelist("/usr/bin/docker ps").is_ok());
        assert!(check_command_whitelist("/tmp/evil/sh").is_err());
    }

    #[test]
    fn test_lookalikes_blocked() {
        // base name must match exactly
        assert!(check_command_whitelist("docker-compose up").is_err());
        assert!(check_command_whitelist("rmdir /").is_err());
    }

    #[test]
    fn test_empty_command() {
        assert!(check_command_whitelist("").is_err());
        assert!(check_command_whitelist("   ").is_err());
    }
}
