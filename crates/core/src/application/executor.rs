//! Remote Command Executor - runs commands inside a node's execution context
//!
//! Every command goes through a shell so pipes, quoting and redirections in
//! the command text survive. Capture mode is always time-bounded; the
//! interactive handover is the only unbounded call.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::interrupt::HandoverFlag;
use super::terminal_guard::TerminalGuard;
use crate::domain::{CommandResult, ExecMode, ExecutionContext, LabConfig};
use crate::port::{CommandRunner, TerminalControl};

/// Runs commands on nodes (or the host) through a `CommandRunner`
pub struct RemoteExecutor {
    runner: Arc<dyn CommandRunner>,
    terminal: Arc<dyn TerminalControl>,
    attach: Vec<String>,
    shell: Vec<String>,
    accepted_hostnames: Vec<String>,
    capture_timeout: Duration,
    preflight_timeout: Duration,
    handover: HandoverFlag,
}

impl RemoteExecutor {
    /// Create a new executor
    ///
    /// # Arguments
    /// * `runner` - Spawns the actual OS processes
    /// * `terminal` - Saved and restored around interactive handovers
    /// * `config` - Attach template, shell, timeouts and accepted hostnames
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        terminal: Arc<dyn TerminalControl>,
        config: &LabConfig,
    ) -> Self {
        Self {
            runner,
            terminal,
            attach: config.attach_command.clone(),
            shell: config.shell.clone(),
            accepted_hostnames: config.accepted_hostnames.clone(),
            capture_timeout: Duration::from_secs(config.probe.timeout_secs),
            preflight_timeout: Duration::from_secs(config.probe.preflight_timeout_secs),
            handover: HandoverFlag::default(),
        }
    }

    /// Override the capture-mode bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Flag raised while the terminal belongs to an interactive child
    pub fn handover_flag(&self) -> HandoverFlag {
        self.handover.clone()
    }

    /// Run `command` inside `context`
    ///
    /// Never fails: spawn errors and timeouts come back as a result with
    /// empty stdout and the cause in stderr.
    pub async fn execute(
        &self,
        context: &ExecutionContext,
        command: &str,
        mode: ExecMode,
    ) -> CommandResult {
        self.preflight(context).await;

        let mut argv = self.attach_argv(context);
        argv.extend(self.shell.iter().cloned());
        argv.push(command.to_string());

        debug!(node = %context.node, pid = context.pid, command = %command, mode = ?mode, "Executing on node");
        self.dispatch(argv, mode).await
    }

    /// Run `command` on the host through the configured shell
    pub async fn execute_host(&self, command: &str, mode: ExecMode) -> CommandResult {
        let mut argv = self.shell.clone();
        argv.push(command.to_string());

        debug!(command = %command, mode = ?mode, "Executing on host");
        self.dispatch(argv, mode).await
    }

    /// Hostname sanity check inside `context`
    ///
    /// Returns false when the context reports a different, non-default
    /// hostname. A mismatch is only logged: the emulator leaves most
    /// namespaces with the same default hostname.
    pub async fn preflight(&self, context: &ExecutionContext) -> bool {
        if self.attach.is_empty() {
            return true;
        }

        let mut argv = self.attach_argv(context);
        argv.push("hostname".to_string());

        let hostname = match self.runner.capture(&argv, self.preflight_timeout).await {
            Ok(result) => result.stdout.trim().to_string(),
            Err(e) => {
                debug!(node = %context.node, error = %e, "Hostname check unavailable");
                return true;
            }
        };

        let consistent = hostname.is_empty()
            || hostname == context.node.as_str()
            || self.accepted_hostnames.iter().any(|h| h == &hostname);

        if !consistent {
            warn!(
                node = %context.node,
                pid = context.pid,
                hostname = %hostname,
                "Requested node and namespace hostname differ"
            );
        }
        consistent
    }

    fn attach_argv(&self, context: &ExecutionContext) -> Vec<String> {
        let pid = context.pid.to_string();
        self.attach
            .iter()
            .map(|arg| arg.replace("{pid}", &pid))
            .collect()
    }

    async fn dispatch(&self, argv: Vec<String>, mode: ExecMode) -> CommandResult {
        match mode {
            ExecMode::Capture => self.capture(&argv).await,
            ExecMode::Interactive => self.interactive(&argv).await,
        }
    }

    async fn capture(&self, argv: &[String]) -> CommandResult {
        match self.runner.capture(argv, self.capture_timeout).await {
            Ok(result) => result,
            Err(e) => {
                warn!(command = ?argv, error = %e, "Capture failed, treating output as empty");
                CommandResult::empty(e.to_string())
            }
        }
    }

    async fn interactive(&self, argv: &[String]) -> CommandResult {
        // declaration order matters: the scope drops first, then the guard restores
        let _guard = TerminalGuard::save(self.terminal.clone());
        let _scope = self.handover.enter();

        info!(command = ?argv, "Handing terminal over");
        let started = Instant::now();
        let outcome = self.runner.interactive(argv).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(exit_code) => {
                info!(exit_code = ?exit_code, duration_ms, "Interactive session ended");
                CommandResult {
                    exit_code,
                    duration_ms,
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(error = %e, "Interactive session failed");
                CommandResult {
                    duration_ms,
                    ..CommandResult::empty(e.to_string())
                }
            }
        }
    }
}
