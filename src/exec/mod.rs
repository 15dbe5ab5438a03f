// src/exec/mod.rs

//! External command execution.
//!
//! Everything the daemon does against remote storage goes through a
//! [`CommandRunner`]: directory listings, metadata downloads, data copies,
//! source deletion and quarantine moves. Production uses [`ShellRunner`],
//! which spawns the command through the platform shell with a timeout;
//! tests substitute a scripted runner that never touches a process.

pub mod shell;
pub mod template;

pub use shell::ShellRunner;
pub use template::expand_template;

use std::time::Duration;

use async_trait::async_trait;

/// Exit status reported for a command that timed out.
pub const TIMEOUT_STATUS: i32 = 100;

/// Result of running one external command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Process exit status; zero means success. Timeouts are reported as
    /// [`TIMEOUT_STATUS`], spawn failures as -1.
    pub status: i32,
    /// Captured stdout, falling back to stderr when stdout is empty.
    pub output: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Format a one-line error for logs and history records.
    pub fn error_text(&self) -> String {
        format!("status={} output: {}", self.status, self.output.trim())
    }
}

/// Trait abstracting how external commands are executed.
///
/// Command strings come from trusted configuration templates; substitution
/// is literal, not shell-escaped.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> CommandOutcome;
}
