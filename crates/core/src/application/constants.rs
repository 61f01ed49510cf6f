// Timing and sizing constants (ADR: No magic values)
use std::time::Duration;

/// Settling delay before verification when the caller gives none (10s)
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Seconds the topology launcher waits for sysctl changes
pub const DEFAULT_START_SLEEP_SECS: u64 = 3;

/// Characters of evidence shown per row in summary tables
pub const EVIDENCE_SNIPPET_CHARS: usize = 120;

/// Default number of log lines read by the verify operation
pub const DEFAULT_TAIL_LINES: usize = 10;

/// Exit status reported after a user interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: u8 = 130;
