#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use anyhow::Context as _;

use crate::catalog::{Command, CommandStatus, ScheduledCommand};

/// Exit status reported when the shell could not be started or was killed by
/// a signal.
pub const NO_EXIT_CODE: i32 = -1;

/// Runs `cmd` to completion through `shell`. Failures are reported in the
/// returned record, never as errors.
pub async fn execute(shell: &str, cmd: Command) -> ScheduledCommand {
    let start_time = now_rfc3339();
    let started = Instant::now();

    let (status, exit_status, coutput) = match run_shell_script(shell, &cmd).await {
        Ok((code, output)) => {
            let status = if code == 0 {
                CommandStatus::Completed
            } else {
                CommandStatus::Failed
            };
            (status, code, output)
        }
        Err(e) => {
            tracing::error!(hash = %cmd.hash, error = %format!("{e:#}"), "failed to launch command");
            (CommandStatus::Failed, NO_EXIT_CODE, format!("{e:#}"))
        }
    };

    let elapsed = started.elapsed();
    let mut command = cmd;
    command.status = status;
    command.duration = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);

    ScheduledCommand {
        command,
        coutput,
        exit_status,
        start_time,
        end_time: now_rfc3339(),
    }
}

async fn run_shell_script(shell: &str, cmd: &Command) -> anyhow::Result<(i32, String)> {
    let mut script = tempfile::Builder::new()
        .prefix("recmd-")
        .suffix(".sh")
        .tempfile()
        .context("failed to create temp script")?;
    let script_path = script.path().to_path_buf();
    write!(script, "#!/bin/sh\nexec 2>&1\n\n{}\n", cmd.command_text)
        .and_then(|()| script.flush())
        .with_context(|| format!("failed to write {}", script_path.display()))?;

    let working_dir = if cmd.working_directory.is_empty() {
        std::env::current_dir().context("failed to get current directory")?
    } else {
        Path::new(&cmd.working_directory).to_path_buf()
    };

    let output = tokio::process::Command::new(shell)
        .arg(script.path())
        .current_dir(&working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("failed to start {shell} in {}", working_dir.display()))?;

    // The script merges stderr into stdout; anything left on stderr came
    // from the shell before that redirect.
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok((output.status.code().unwrap_or(NO_EXIT_CODE), combined))
}

#[must_use]
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_owned())
}
