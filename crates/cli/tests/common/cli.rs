//! Helpers for running the `gpiotrigger` binary with a timeout

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// `gpiotrigger` invocation builder
pub struct TriggerCommand {
    binary_path: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl TriggerCommand {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_gpiotrigger")),
            args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point the binary at a fake sysfs tree
    pub fn sysfs_root(&mut self, root: impl AsRef<Path>) -> &mut Self {
        self.args.push("--sysfs-root".to_string());
        self.args.push(root.as_ref().display().to_string());
        self
    }

    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Run to completion, killing the child if it outlives the timeout
    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();
        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn gpiotrigger")?;

        while child.try_wait()?.is_none() {
            if start.elapsed() > self.timeout {
                child.kill()?;
                anyhow::bail!("gpiotrigger timed out after {:?}: {:?}", self.timeout, self.args);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        let output = child
            .wait_with_output()
            .context("Failed to collect gpiotrigger output")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    pub fn assert_success(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if !result.success() {
            anyhow::bail!(
                "Command failed (exit code: {}):\nArgs: {:?}\nStdout: {}\nStderr: {}",
                result.exit_code,
                self.args,
                result.stdout,
                result.stderr
            );
        }

        Ok(result)
    }

    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }
}

/// Captured output of one run
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}
