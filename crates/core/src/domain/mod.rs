// Domain Layer - Testbed entities and verification vocabulary

pub mod command;
pub mod config;
pub mod error;
pub mod node;
pub mod probe;

// Re-exports
pub use command::{CommandResult, ExecMode};
pub use config::{
    render_template, DaemonCommands, LabConfig, ProbeSettings, SessionExpectation, Topology,
};
pub use error::DomainError;
pub use node::{ExecutionContext, NodeName, ProcessRecord, ProcessSnapshot};
pub use probe::{Expectation, MatchRule, ProbeResult, ProbeSpec, VerificationVerdict};
