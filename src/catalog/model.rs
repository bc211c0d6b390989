#![forbid(unsafe_code)]

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Number of digest bytes kept in a command hash (30 hex characters).
pub const HASH_BYTES: usize = 15;

/// Sentinel stored in `duration` until the command has completed once.
pub const NEVER_RUN: i64 = -1;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    #[default]
    Idle,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl CommandStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(rename = "commandHash")]
    pub hash: String,
    #[serde(rename = "commandString")]
    pub command_text: String,
    #[serde(default)]
    pub description: String,
    /// Last measured run time in milliseconds, or [`NEVER_RUN`].
    pub duration: i64,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub status: CommandStatus,
}

impl Command {
    #[must_use]
    pub fn new(command_text: &str, description: &str, working_directory: &str) -> Self {
        Self {
            hash: command_hash(command_text),
            command_text: command_text.to_owned(),
            description: description.to_owned(),
            duration: NEVER_RUN,
            working_directory: working_directory.to_owned(),
            status: CommandStatus::Idle,
        }
    }
}

/// A single execution of a [`Command`]. Never persisted; only the duration
/// flows back into the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledCommand {
    #[serde(flatten)]
    pub command: Command,
    pub coutput: String,
    pub exit_status: i32,
    pub start_time: String,
    pub end_time: String,
}

#[must_use]
pub fn command_hash(command_text: &str) -> String {
    let digest = Sha256::digest(command_text.as_bytes());
    hex::encode(&digest[..HASH_BYTES])
}

/// Returns what a command actually runs: the contents of the invoked script
/// for `<interpreter> <script>` style commands, otherwise the command text.
#[must_use]
pub fn script_source(cmd: &Command) -> String {
    let words: Vec<&str> = cmd.command_text.split_whitespace().collect();
    if let [_, script] = words.as_slice() {
        let path = Path::new(&cmd.working_directory).join(script);
        if path.is_file() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => return contents,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read script");
                }
            }
        }
    }
    cmd.command_text.clone()
}
