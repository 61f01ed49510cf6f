// Command Runner Port
// Abstraction for spawning OS commands (captured or attached to the terminal)

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::CommandResult;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Process timeout after {0}ms")]
    Timeout(i64),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Empty command line")]
    EmptyCommand,
}

/// Command Runner trait
///
/// Implementations:
/// - TokioCommandRunner: spawns real child processes
/// - mocks::ScriptedRunner: canned responses for tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv` with stdin closed and collect its output
    ///
    /// A nonzero exit status is a normal result, not an error.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the program cannot be started
    /// - ExecutionError::Timeout if the command outlives `timeout`
    async fn capture(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> Result<CommandResult, ExecutionError>;

    /// Run `argv` attached to the controlling terminal until it exits
    ///
    /// Returns the exit code, `None` if the child died from a signal.
    async fn interactive(&self, argv: &[String]) -> Result<Option<i32>, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Canned response for a scripted command
    #[derive(Debug, Clone)]
    pub enum Response {
        Output(CommandResult),
        Error(ExecutionError),
    }

    /// Behavior of the interactive handover
    #[derive(Debug, Clone)]
    pub enum InteractiveBehavior {
        Exit(Option<i32>),
        Fail(ExecutionError),
        /// Panic with message (simulates a crash mid-handover)
        Panic(String),
        /// Console that never exits on its own
        Hang,
    }

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Runner answering by substring match on the joined command line
    ///
    /// Rules are checked in insertion order; unmatched commands behave like
    /// a missing tool (exit 127, empty stdout).
    pub struct ScriptedRunner {
        rules: Mutex<Vec<(String, Response)>>,
        calls: Mutex<Vec<String>>,
        interactive: Mutex<InteractiveBehavior>,
        on_interactive: Mutex<Option<Hook>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self {
                rules: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                interactive: Mutex::new(InteractiveBehavior::Exit(Some(0))),
                on_interactive: Mutex::new(None),
            }
        }

        /// Answer commands containing `needle` with `stdout` and exit 0
        pub fn respond(self, needle: impl Into<String>, stdout: impl Into<String>) -> Self {
            let result = CommandResult {
                exit_code: Some(0),
                stdout: stdout.into(),
                ..Default::default()
            };
            self.push(needle.into(), Response::Output(result));
            self
        }

        pub fn respond_with(self, needle: impl Into<String>, result: CommandResult) -> Self {
            self.push(needle.into(), Response::Output(result));
            self
        }

        pub fn fail(self, needle: impl Into<String>, error: ExecutionError) -> Self {
            self.push(needle.into(), Response::Error(error));
            self
        }

        pub fn interactive_behavior(self, behavior: InteractiveBehavior) -> Self {
            *self.interactive.lock().unwrap() = behavior;
            self
        }

        /// Run `hook` while the interactive child is "attached"
        pub fn on_interactive(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
            *self.on_interactive.lock().unwrap() = Some(Box::new(hook));
            self
        }

        fn push(&self, needle: String, response: Response) {
            self.rules.lock().unwrap().push((needle, response));
        }

        /// Every command line seen so far, in call order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls whose command line contains `needle`
        pub fn calls_matching(&self, needle: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.contains(needle))
                .collect()
        }
    }

    impl Default for ScriptedRunner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn capture(
            &self,
            argv: &[String],
            _timeout: Duration,
        ) -> Result<CommandResult, ExecutionError> {
            let line = argv.join(" ");
            self.calls.lock().unwrap().push(line.clone());

            let rules = self.rules.lock().unwrap();
            match rules.iter().find(|(needle, _)| line.contains(needle.as_str())) {
                Some((_, Response::Output(result))) => Ok(result.clone()),
                Some((_, Response::Error(error))) => Err(error.clone()),
                None => Ok(CommandResult {
                    exit_code: Some(127),
                    ..Default::default()
                }),
            }
        }

        async fn interactive(&self, argv: &[String]) -> Result<Option<i32>, ExecutionError> {
            self.calls.lock().unwrap().push(argv.join(" "));

            if let Some(hook) = self.on_interactive.lock().unwrap().as_ref() {
                hook();
            }

            let behavior = self.interactive.lock().unwrap().clone();
            match behavior {
                InteractiveBehavior::Exit(code) => Ok(code),
                InteractiveBehavior::Fail(error) => Err(error),
                InteractiveBehavior::Panic(msg) => panic!("{}", msg),
                InteractiveBehavior::Hang => std::future::pending().await,
            }
        }
    }
}
