#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::catalog::model::{Command, CommandStatus, ScheduledCommand};
use crate::error::StoreError;

/// File name of the catalog inside the configuration directory.
pub const HISTORY_FILE: &str = "recmd_history.json";

/// The durable command catalog: one pretty-printed JSON array, read and
/// rewritten wholesale on every mutation.
#[derive(Debug)]
pub struct CommandStore {
    path: PathBuf,
    // Held for the whole read-modify-write of every mutation.
    writer: Mutex<()>,
}

impl CommandStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(()),
        }
    }

    /// Opens the catalog at `path`, creating an empty file if none exists.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let store = Self::new(path);
        store.ensure_file()?;
        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_file(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, b"").map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn list(&self) -> Result<Vec<Command>, StoreError> {
        self.read_all()
    }

    pub fn insert(&self, cmd: Command) -> Result<(), StoreError> {
        let _guard = self.writer.lock();
        let mut cmds = self.read_all()?;
        if cmds.iter().any(|c| c.hash == cmd.hash) {
            tracing::warn!(hash = %cmd.hash, "command hash already exists");
            return Err(StoreError::DuplicateHash(cmd.hash));
        }
        tracing::info!(hash = %cmd.hash, "adding command");
        cmds.push(cmd);
        self.write_all(&cmds)
    }

    /// First record, in catalog order, whose hash starts with `prefix`.
    pub fn select_by_hash_prefix(&self, prefix: &str) -> Result<Option<Command>, StoreError> {
        let cmds = self.read_all()?;
        Ok(cmds.into_iter().find(|c| c.hash.starts_with(prefix)))
    }

    pub fn search_by_description(&self, needle: &str) -> Result<Vec<Command>, StoreError> {
        let needle = needle.to_lowercase();
        let cmds = self.read_all()?;
        Ok(cmds
            .into_iter()
            .filter(|c| c.description.to_lowercase().contains(&needle))
            .collect())
    }

    /// Removes the first record whose hash starts with `prefix` and returns
    /// it (zero or one element).
    pub fn delete_by_hash_prefix(&self, prefix: &str) -> Result<Vec<Command>, StoreError> {
        let _guard = self.writer.lock();
        let mut cmds = self.read_all()?;
        let Some(index) = cmds.iter().position(|c| c.hash.starts_with(prefix)) else {
            return Ok(Vec::new());
        };
        let removed = cmds.remove(index);
        self.write_all(&cmds)?;
        tracing::info!(hash = %removed.hash, "deleted command");
        Ok(vec![removed])
    }

    /// Sets the duration of the record with exactly `hash`. Returns whether a
    /// record matched; a miss leaves the file untouched.
    pub fn update_duration(&self, hash: &str, duration: i64) -> Result<bool, StoreError> {
        let _guard = self.writer.lock();
        let mut cmds = self.read_all()?;
        let Some(cmd) = cmds.iter_mut().find(|c| c.hash == hash) else {
            tracing::debug!(hash, "no command to update");
            return Ok(false);
        };
        cmd.duration = duration;
        self.write_all(&cmds)?;
        tracing::info!(hash, duration_ms = duration, "updated duration");
        Ok(true)
    }

    /// Folds a finished run back into the catalog. Only completed runs
    /// record their duration; returns whether a record was updated.
    pub fn record_run(&self, finished: &ScheduledCommand) -> Result<bool, StoreError> {
        if finished.command.status != CommandStatus::Completed {
            return Ok(false);
        }
        self.update_duration(&finished.command.hash, finished.command.duration)
    }

    fn read_all(&self) -> Result<Vec<Command>, StoreError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&data).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_all(&self, cmds: &[Command]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(cmds)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &data).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
