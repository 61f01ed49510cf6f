// hijacklab Infrastructure - System Adapters
// Implements: ProcessScanner, CommandRunner, TerminalControl

pub mod subprocess_executor;
pub mod sysinfo_scanner;
pub mod tty_terminal;

pub use subprocess_executor::TokioCommandRunner;
pub use sysinfo_scanner::SysinfoProcessScanner;
pub use tty_terminal::TtyTerminal;
