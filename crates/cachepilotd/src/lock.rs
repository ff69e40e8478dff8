//! At-most-one maintenance run
//!
//! `flock(LOCK_EX | LOCK_NB)` on a lock file. The lock lives as long as the
//! guard; the kernel drops it if the process dies.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held for the duration of one run
#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// `Ok(None)` when another run holds the lock.
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("[LOCK] cannot restrict {}: {}", path.display(), e);
        }

        if !try_flock_exclusive(&file)? {
            return Ok(None);
        }

        debug!("[LOCK] acquired {}", path.display());
        Ok(Some(Self {
            _file: file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is a valid descriptor owned by `file` for the whole call.
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_refused_until_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run/maintenance.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(RunLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(RunLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn test_lock_file_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("maintenance.lock");
        let lock = RunLock::try_acquire(&path).unwrap().unwrap();
        let mode = fs::metadata(lock.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
