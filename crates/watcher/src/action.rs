//! Actions fired on a confirmed edge

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Shell used when `$SHELL` is unset
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Action errors
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("failed to run {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a fired action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when killed by a signal
    pub status: Option<i32>,
}

impl ActionOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Something to do once a transition is confirmed
#[async_trait]
pub trait Action: Send + Sync {
    async fn fire(&self) -> Result<ActionOutput, ActionError>;
}

/// Runs a command string through `<shell> -c`
#[derive(Debug, Clone)]
pub struct ShellAction {
    shell: PathBuf,
    command: String,
}

impl ShellAction {
    /// Use the shell named by `$SHELL`
    pub fn new(command: impl Into<String>) -> Self {
        let shell = std::env::var_os("SHELL")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_SHELL));
        Self::with_shell(shell, command)
    }

    pub fn with_shell(shell: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Action for ShellAction {
    async fn fire(&self) -> Result<ActionOutput, ActionError> {
        info!(shell = %self.shell.display(), command = %self.command, "Running action");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|source| ActionError::Spawn {
                shell: self.shell.display().to_string(),
                source,
            })?;

        let result = ActionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code(),
        };
        debug!(status = ?result.status, "Action finished");
        Ok(result)
    }
}
