//! Permission and ownership checks v2.2.0
//!
//! Read-only inspection of file modes and owners for CachePilot's sensitive
//! files, plus the two write helpers every store in the workspace uses:
//! `atomic_write` (temp file + rename) and `append_line` (single write per
//! line, append mode).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User};

use crate::error::{ValidationError, ValidationResult};

/// Mode expected on secrets (.env, API keys, CA private key)
pub const SECRET_FILE_MODE: &str = "600";

/// Modes accepted on sensitive directories
pub const ALLOWED_DIR_MODES: &[&str] = &["700", "755"];

pub const DEFAULT_OWNER: &str = "root";
pub const DEFAULT_GROUP: &str = "root";

/// Octal permission bits of `path` as `stat -c %a` prints them.
pub fn mode_string(path: &Path) -> ValidationResult<String> {
    let metadata = fs::metadata(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ValidationError::path(format!("{} does not exist", path.display()))
        } else {
            ValidationError::permission(format!("cannot read mode of {}: {}", path.display(), e))
        }
    })?;
    Ok(format!("{:o}", metadata.permissions().mode() & 0o7777))
}

/// Fail unless the octal mode of `file` is exactly `expected_mode`.
///
/// A mismatch is a warning-level `Permission` error, never silent success.
pub fn check_permissions(file: &Path, expected_mode: &str) -> ValidationResult<()> {
    let actual = mode_string(file)?;
    if actual != expected_mode {
        return Err(ValidationError::permission(format!(
            "{} has mode {} (expected {})",
            file.display(),
            actual,
            expected_mode
        )));
    }
    Ok(())
}

/// Fail unless `path` is owned by `expected_user:expected_group`.
pub fn verify_ownership(
    path: &Path,
    expected_user: &str,
    expected_group: &str,
) -> ValidationResult<()> {
    let metadata = fs::metadata(path)
        .map_err(|_| ValidationError::path(format!("{} does not exist", path.display())))?;

    let user = user_name(metadata.uid());
    let group = group_name(metadata.gid());

    if user != expected_user || group != expected_group {
        return Err(ValidationError::permission(format!(
            "{} is owned by {}:{} (expected {}:{})",
            path.display(),
            user,
            group,
            expected_user,
            expected_group
        )));
    }
    Ok(())
}

/// Name of a uid, or the number when it has no passwd entry
fn user_name(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

fn group_name(gid: u32) -> String {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => group.name,
        _ => gid.to_string(),
    }
}

/// Write `content` to `path` atomically with the given mode.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    fs::set_permissions(&temp_path, fs::Permissions::from_mode(mode))?;
    fs::rename(&temp_path, path)
}

/// Append one line with a single `write` call.
///
/// Concurrent writers in append mode never interleave partial lines.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(buf.as_bytes())
}
