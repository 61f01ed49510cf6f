// Application Layer - Resolver, executor, probes, verification and sequencing

pub mod constants;
pub mod executor;
pub mod interrupt;
pub mod orchestrator;
pub mod probe;
pub mod resolver;
pub mod terminal_guard;
pub mod verification;

// Re-exports
pub use executor::RemoteExecutor;
pub use interrupt::{interrupt_channel, HandoverFlag, InterruptSender, InterruptToken};
pub use orchestrator::{AttackOptions, Orchestrator, ResetOptions, StartOptions, VerifyOptions};
pub use probe::NodeProbes;
pub use resolver::{NamespaceResolver, NodeTag, ResolveError};
pub use terminal_guard::TerminalGuard;
pub use verification::VerificationEngine;
