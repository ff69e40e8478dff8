//! Secret generation and secure deletion
//!
//! Passwords come straight from the OS CSPRNG. `secure_file_deletion` is
//! destructive: the file content is overwritten and the file removed.

use rand::rngs::OsRng;
use rand::RngCore;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::command_exec::GuardedCommand;
use crate::error::{ValidationError, ValidationResult};

pub const DEFAULT_PASSWORD_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 16;

/// Base64 alphabet without `+`, `/` and `=`: shell- and URL-safe
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits a byte; bytes at or
/// above it are discarded so every character is equally likely.
const REJECTION_BOUND: u8 = (256 / PASSWORD_ALPHABET.len() * PASSWORD_ALPHABET.len()) as u8;

/// Utility used for multi-pass overwrite when installed
const SECURE_ERASE_TOOL: &str = "shred";

/// Random password of exactly `length` characters.
pub fn generate_secure_password(length: usize) -> ValidationResult<String> {
    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::input(format!(
            "password length must be at least {}",
            MIN_PASSWORD_LENGTH
        )));
    }

    let mut password = String::with_capacity(length);
    let mut buf = [0u8; 64];

    while password.len() < length {
        OsRng.try_fill_bytes(&mut buf).map_err(|e| {
            ValidationError::external_tool(format!("secure random source unavailable: {}", e))
        })?;

        for &b in buf.iter().filter(|&&b| b < REJECTION_BOUND) {
            if password.len() == length {
                break;
            }
            password.push(PASSWORD_ALPHABET[b as usize % PASSWORD_ALPHABET.len()] as char);
        }
    }

    Ok(password)
}

/// Overwrite `file` and remove it.
///
/// Uses a 3-pass `shred` when it is installed, otherwise a single pass of
/// random data. A missing or failing `shred` degrades to the fallback.
pub async fn secure_file_deletion(file: &Path) -> ValidationResult<()> {
    if !file.is_file() {
        return Err(ValidationError::path(format!(
            "{} does not exist",
            file.display()
        )));
    }

    if find_in_path(SECURE_ERASE_TOOL).is_some() {
        let result = GuardedCommand::new(SECURE_ERASE_TOOL)
            .args(["-f", "-z", "-u", "-n", "3"])
            .untrusted_arg(file.to_string_lossy())
            .run_checked()
            .await;

        match result {
            Ok(_) if !file.exists() => {
                debug!("[SECRETS] shredded {}", file.display());
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => warn!("[SECRETS] shred failed, using fallback overwrite: {}", e),
        }
    }

    overwrite_with_random(file)?;
    fs::remove_file(file).map_err(|e| {
        ValidationError::permission(format!("cannot remove {}: {}", file.display(), e))
    })
}

fn overwrite_with_random(file: &Path) -> ValidationResult<()> {
    let len = fs::metadata(file)
        .map_err(|e| ValidationError::path(format!("{}: {}", file.display(), e)))?
        .len();

    let mut handle = OpenOptions::new()
        .write(true)
        .open(file)
        .map_err(|e| ValidationError::permission(format!("cannot open {}: {}", file.display(), e)))?;

    let mut remaining = len;
    let mut chunk = vec![0u8; 8192];
    while remaining > 0 {
        let n = remaining.min(chunk.len() as u64) as usize;
        OsRng.try_fill_bytes(&mut chunk[..n]).map_err(|e| {
            ValidationError::external_tool(format!("secure random source unavailable: {}", e))
        })?;
        handle
            .write_all(&chunk[..n])
            .map_err(|e| ValidationError::permission(format!("overwrite failed: {}", e)))?;
        remaining -= n as u64;
    }

    handle
        .sync_all()
        .map_err(|e| ValidationError::permission(format!("sync failed: {}", e)))
}

/// Locate an executable on `$PATH`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_password_exact_length_and_alphabet() {
        for _ in 0..200 {
            let pw = generate_secure_password(DEFAULT_PASSWORD_LENGTH).unwrap();
            assert_eq!(pw.len(), 32);
            assert!(!pw.contains('/'));
            assert!(!pw.contains('+'));
            assert!(!pw.contains('='));
            assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_password_long_lengths() {
        let pw = generate_secure_password(500).unwrap();
        assert_eq!(pw.len(), 500);
    }

    #[test]
    fn test_password_too_short() {
        assert!(generate_secure_password(15).is_err());
        assert!(generate_secure_password(16).is_ok());
    }

    #[test]
    fn test_passwords_differ() {
        let a = generate_secure_password(32).unwrap();
        let b = generate_secure_password(32).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_secure_deletion_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("api-keys.json");
        fs::write(&path, "super secret key material").unwrap();

        secure_file_deletion(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_secure_deletion_missing_file() {
        let err = secure_file_deletion(Path::new("/nonexistent/cachepilot/secret"))
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::Path(_)));
    }

    #[test]
    fn test_fallback_overwrite_changes_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secret");
        let original = vec![b'A'; 20_000];
        fs::write(&path, &original).unwrap();

        overwrite_with_random(&path).unwrap();
        let after = fs::read(&path).unwrap();
        assert_eq!(after.len(), original.len());
        assert_ne!(after, original);
    }
}
