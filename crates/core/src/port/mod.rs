// Port Layer - Interfaces for external dependencies

pub mod command_runner;
pub mod process_scanner;
pub mod report_sink;
pub mod state_probe;
pub mod terminal;
pub mod time_provider; // For deterministic settling delays

// Re-exports
pub use command_runner::{CommandRunner, ExecutionError};
pub use process_scanner::{ProcessScanner, ScanError};
pub use report_sink::ReportSink;
pub use state_probe::StateProbe;
pub use terminal::{TerminalControl, TerminalState};
pub use time_provider::TimeProvider;
