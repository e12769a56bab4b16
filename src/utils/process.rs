//! Subprocess execution for `git` and `ssh-keygen`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{GitIdError, Result};

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run a program to completion, capturing its output.
///
/// Interactive prompts are disabled for git so a missing credential fails
/// fast instead of blocking. The child is killed when `timeout` elapses.
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GCM_INTERACTIVE", "never")
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let shown = format!("{} {}", program, args.join(" "));
    tracing::debug!(command = %shown, "spawning");

    let child = cmd
        .spawn()
        .map_err(|e| GitIdError::command(&shown, e.to_string()))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| GitIdError::command(&shown, e.to_string()))?,
        Err(_) => {
            return Err(GitIdError::command(
                &shown,
                format!("timed out after {}s", timeout.as_secs()),
            ));
        }
    };

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_names_the_command() {
        let err = run(
            "gitid-no-such-program",
            &["--flag", "value"],
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "COMMAND_FAILED");
        assert_eq!(err.details().unwrap()["command"], "gitid-no-such-program --flag value");
    }
}
