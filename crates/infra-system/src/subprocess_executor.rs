// Subprocess runner implementation
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use hijacklab_core::domain::CommandResult;
use hijacklab_core::port::{CommandRunner, ExecutionError, TimeProvider};

/// Spawns real child processes with tokio
pub struct TokioCommandRunner {
    time_provider: Arc<dyn TimeProvider>,
}

impl TokioCommandRunner {
    /// Create a new command runner
    ///
    /// # Arguments
    /// * `time_provider` - Time provider for duration tracking
    ///
    /// # Example
    /// ```ignore
    /// let runner = TokioCommandRunner::new(Arc::new(SystemTimeProvider));
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }

    fn command(argv: &[String]) -> Result<Command, ExecutionError> {
        let (program, args) = argv.split_first().ok_or(ExecutionError::EmptyCommand)?;
        let mut command = Command::new(program);
        command.args(args);
        Ok(command)
    }

    /// Kill the whole process group of a timed-out child
    ///
    /// The node shell forks the real tool, so killing only the direct
    /// child would leave it running.
    fn kill_group(pgid: Option<u32>) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pgid) = pgid {
                if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                    debug!(pgid = %pgid, error = %e, "Process group already gone");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = pgid;
        }
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn capture(
        &self,
        argv: &[String],
        bound: Duration,
    ) -> Result<CommandResult, ExecutionError> {
        let mut command = Self::command(argv)?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let start_time = self.time_provider.now_millis();
        let child = command
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", argv[0], e)))?;
        let pgid = child.id();

        let output = match timeout(bound, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecutionError::IoError(e.to_string())),
            Err(_) => {
                Self::kill_group(pgid);
                let bound_ms = bound.as_millis() as i64;
                warn!(command = ?argv, timeout_ms = bound_ms, "Command timed out");
                return Err(ExecutionError::Timeout(bound_ms));
            }
        };

        let duration_ms = self.time_provider.now_millis() - start_time;
        let result = CommandResult::from_output(
            output.status.code(),
            &output.stdout,
            &output.stderr,
            duration_ms,
        );

        debug!(
            command = ?argv,
            duration_ms = %duration_ms,
            exit_code = ?result.exit_code,
            "Command completed"
        );

        Ok(result)
    }

    async fn interactive(&self, argv: &[String]) -> Result<Option<i32>, ExecutionError> {
        let mut command = Self::command(argv)?;
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = command
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", argv[0], e)))?;

        let status = child
            .wait()
            .await
            .map_err(|e| ExecutionError::IoError(e.to_string()))?;

        Ok(status.code())
    }
}
