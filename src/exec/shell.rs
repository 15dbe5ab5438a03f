// src/exec/shell.rs

//! Production [`CommandRunner`] that spawns commands through the shell.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandOutcome, CommandRunner, TIMEOUT_STATUS};

/// Runs command strings via `sh -c` (or `cmd /C` on Windows) with a hard
/// timeout. The child is killed on timeout and on drop.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> CommandOutcome {
        debug!(command, timeout_secs = timeout.as_secs_f64(), "running command");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command, error = %e, "failed to spawn command");
                return CommandOutcome {
                    status: -1,
                    output: format!("failed to spawn: {e}"),
                };
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let status = output.status.code().unwrap_or(-1);
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                let captured = if stdout.trim().is_empty() { stderr } else { stdout };
                if status != 0 {
                    debug!(command, status, "command exited nonzero");
                }
                CommandOutcome {
                    status,
                    output: captured,
                }
            }
            Ok(Err(e)) => {
                warn!(command, error = %e, "failed to collect command output");
                CommandOutcome {
                    status: -1,
                    output: format!("failed to collect output: {e}"),
                }
            }
            Err(_) => {
                // The future owning the child is dropped here, which kills it.
                warn!(command, timeout_secs = timeout.as_secs_f64(), "command timed out");
                CommandOutcome {
                    status: TIMEOUT_STATUS,
                    output: "command timed out".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_on_success() {
        let out = ShellRunner::new()
            .run("echo hello", Duration::from_secs(5))
            .await;
        assert!(out.success());
        assert_eq!(out.output.trim(), "hello");
    }

    #[tokio::test]
    async fn falls_back_to_stderr_on_failure() {
        let out = ShellRunner::new()
            .run("ls /definitely/not/a/path/xyz", Duration::from_secs(5))
            .await;
        assert!(!out.success());
        assert!(!out.output.trim().is_empty());
    }

    #[tokio::test]
    async fn reports_timeouts_with_sentinel_status() {
        let out = ShellRunner::new()
            .run("sleep 5", Duration::from_millis(50))
            .await;
        assert_eq!(out.status, TIMEOUT_STATUS);
    }
}
