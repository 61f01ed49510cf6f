// Process table port
// Read-only, unlocked; every call returns a fresh snapshot (no caching)

use thiserror::Error;

use crate::domain::ProcessSnapshot;

/// Process table scan errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("process table unavailable: {0}")]
    Unavailable(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

/// Lists OS processes with their full command lines
pub trait ProcessScanner: Send + Sync {
    /// Take a snapshot of the process table in scan order (oldest first)
    ///
    /// # Errors
    /// - ScanError::Unavailable if the table cannot be read at all
    fn snapshot(&self) -> Result<ProcessSnapshot, ScanError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scanner returning a settable snapshot or error
    pub struct StaticScanner {
        outcome: Arc<Mutex<Result<ProcessSnapshot, ScanError>>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl StaticScanner {
        pub fn new(snapshot: ProcessSnapshot) -> Self {
            Self {
                outcome: Arc::new(Mutex::new(Ok(snapshot))),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn failing(error: ScanError) -> Self {
            Self {
                outcome: Arc::new(Mutex::new(Err(error))),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn set_snapshot(&self, snapshot: ProcessSnapshot) {
            *self.outcome.lock().unwrap() = Ok(snapshot);
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    impl ProcessScanner for StaticScanner {
        fn snapshot(&self) -> Result<ProcessSnapshot, ScanError> {
            *self.call_count.lock().unwrap() += 1;
            self.outcome.lock().unwrap().clone()
        }
    }
}
