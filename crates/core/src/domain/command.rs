// Command Domain Model - outcome of one executed command

use serde::Serialize;

/// How a command is run inside an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Time-bounded, output collected
    Capture,
    /// Unbounded, controlling terminal handed to the child
    Interactive,
}

/// Result of one command execution
///
/// Text is decoded lossily and trailing whitespace is trimmed. `exit_code`
/// is `None` when the child was killed, timed out or never started; the
/// reason is then carried in `stderr`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
}

impl CommandResult {
    pub fn from_output(
        exit_code: Option<i32>,
        stdout: &[u8],
        stderr: &[u8],
        duration_ms: i64,
    ) -> Self {
        Self {
            exit_code,
            stdout: String::from_utf8_lossy(stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(stderr).trim_end().to_string(),
            duration_ms,
        }
    }

    /// Result standing in for a command that produced nothing usable
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            stderr: reason.into(),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// True when stdout carries no text at all
    pub fn is_blank(&self) -> bool {
        self.stdout.trim().is_empty()
    }
}
