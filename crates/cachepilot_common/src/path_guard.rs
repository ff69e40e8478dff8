//! Path containment
//!
//! Resolves a candidate path against an authorized base directory and
//! refuses anything that ends up outside of it.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{ValidationError, ValidationResult};

/// Default base directory for CachePilot managed files
pub const DEFAULT_BASE_DIR: &str = "/opt/cachepilot";

/// Default CA store used by `validate_tls_cert_path`
pub const DEFAULT_CA_DIR: &str = "/opt/cachepilot/data/ca";

/// Extensions accepted for certificate material
pub const CERT_EXTENSIONS: &[&str] = &["pem", "crt", "key"];

/// Validate that `path` resolves inside `base_dir`.
///
/// Relative paths are joined onto `base_dir`. Both sides are canonicalized
/// (symlinks, `.` and `..` resolved), so the path must exist. Containment is
/// checked per path component: `/opt/cachepilot-evil` is not inside
/// `/opt/cachepilot`.
pub fn validate_path(path: &str, base_dir: &str) -> ValidationResult<PathBuf> {
    if path.is_empty() {
        return Err(ValidationError::input("path must not be empty"));
    }
    if base_dir.is_empty() {
        return Err(ValidationError::input("base directory must not be empty"));
    }

    // Rejected before resolution even though canonicalization would catch it
    if has_traversal_token(path) {
        return Err(ValidationError::path(format!(
            "path traversal token in '{}'",
            path
        )));
    }

    let base = fs::canonicalize(base_dir).map_err(|e| {
        ValidationError::path(format!("base directory {} unusable: {}", base_dir, e))
    })?;

    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };

    let resolved = fs::canonicalize(&joined)
        .map_err(|e| ValidationError::path(format!("cannot resolve {}: {}", joined.display(), e)))?;

    if !is_contained(&resolved, &base) {
        return Err(ValidationError::path(format!(
            "{} is outside {}",
            resolved.display(),
            base.display()
        )));
    }

    Ok(resolved)
}

/// `validate_path` plus a certificate-material extension check.
pub fn validate_tls_cert_path(path: &str, base_dir: &str) -> ValidationResult<PathBuf> {
    let resolved = validate_path(path, base_dir)?;

    let ext_ok = resolved
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| CERT_EXTENSIONS.contains(&e))
        .unwrap_or(false);

    if !ext_ok {
        return Err(ValidationError::input(format!(
            "invalid certificate file extension: {}",
            resolved.display()
        )));
    }

    Ok(resolved)
}

fn has_traversal_token(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

/// Component-wise containment: equal to `base` or strictly below it.
fn is_contained(resolved: &Path, base: &Path) -> bool {
    resolved == base || resolved.starts_with(base)
}
