#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("command hash already exists: {0}")]
    DuplicateHash(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another recmd process (pid {pid}) holds {path}; while the daemon runs, use its HTTP API")]
    Held { path: PathBuf, pid: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid working directory: {0}")]
    InvalidWorkingDirectory(String),

    #[error("scheduler worker is not running")]
    WorkerGone,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("bad secret")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("scheduler error: {0}")]
    Scheduler(SchedulerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateHash(hash) => {
                Self::Conflict(format!("command hash already exists: {hash}"))
            }
            other => Self::Store(other),
        }
    }
}

impl From<SchedulerError> for GatewayError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidWorkingDirectory(dir) => {
                Self::BadRequest(format!("invalid working directory: {dir}"))
            }
            other => Self::Scheduler(other),
        }
    }
}
