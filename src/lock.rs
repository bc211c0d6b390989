#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::LockError;

/// File name of the instance lock inside the configuration directory.
pub const LOCK_FILE: &str = "recmd.lock";

/// Exclusive advisory lock over one configuration directory.
///
/// The daemon holds it for its whole lifetime. Local subcommands that write
/// the catalog or execute commands hold it for the duration of the call, so
/// the catalog has a single writer and commands never run in parallel across
/// processes. Released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Open without truncating so a held lock keeps its owner's pid.
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        if file.try_lock_exclusive().is_err() {
            let pid = std::fs::read_to_string(path)
                .map(|s| s.trim().to_owned())
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_owned());
            return Err(LockError::Held {
                path: path.to_path_buf(),
                pid,
            });
        }

        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        tracing::debug!(path = %path.display(), "acquired instance lock");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(LOCK_FILE);

        let held = InstanceLock::acquire(&path).unwrap();
        assert_eq!(held.path(), path);

        let err = InstanceLock::acquire(&path).unwrap_err();
        match err {
            LockError::Held { pid, .. } => assert_eq!(pid, std::process::id().to_string()),
            other => panic!("unexpected error: {other}"),
        }

        drop(held);
        assert!(InstanceLock::acquire(&path).is_ok());
    }
}
