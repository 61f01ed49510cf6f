// Terminal control port
// The attached console is known to leave the tty in raw mode with the cursor hidden

/// Saved line-discipline attributes of the controlling terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    pub input_flags: u64,
    pub output_flags: u64,
    pub control_flags: u64,
    pub local_flags: u64,
    pub control_chars: Vec<u8>,
}

/// Save/restore access to the controlling terminal
///
/// All methods are best effort and never fail: a tool without a tty
/// (piped, cron) simply has nothing to restore.
pub trait TerminalControl: Send + Sync {
    /// Capture current attributes, `None` if stdin is not a terminal
    fn save(&self) -> Option<TerminalState>;

    /// Reapply previously captured attributes
    fn restore(&self, state: &TerminalState);

    /// Secondary reset of terminal defaults (sane modes, visible cursor)
    fn reset_defaults(&self);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory terminal whose attributes tests can corrupt
    #[derive(Clone)]
    pub struct MockTerminal {
        current: Arc<Mutex<TerminalState>>,
        restores: Arc<Mutex<usize>>,
        resets: Arc<Mutex<usize>>,
    }

    impl MockTerminal {
        pub fn new() -> Self {
            Self {
                current: Arc::new(Mutex::new(TerminalState {
                    input_flags: 0o2406,
                    output_flags: 0o5,
                    control_flags: 0o277,
                    local_flags: 0o105073,
                    control_chars: vec![3, 28, 127, 21, 4, 0, 1, 0],
                })),
                restores: Arc::new(Mutex::new(0)),
                resets: Arc::new(Mutex::new(0)),
            }
        }

        /// Simulate a console leaving the terminal in raw mode
        pub fn corrupt(&self) {
            let mut state = self.current.lock().unwrap();
            state.local_flags = 0;
            state.input_flags = 0;
            state.control_chars = vec![0; 8];
        }

        pub fn current(&self) -> TerminalState {
            self.current.lock().unwrap().clone()
        }

        pub fn restore_count(&self) -> usize {
            *self.restores.lock().unwrap()
        }

        pub fn reset_count(&self) -> usize {
            *self.resets.lock().unwrap()
        }
    }

    impl Default for MockTerminal {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TerminalControl for MockTerminal {
        fn save(&self) -> Option<TerminalState> {
            Some(self.current())
        }

        fn restore(&self, state: &TerminalState) {
            *self.current.lock().unwrap() = state.clone();
            *self.restores.lock().unwrap() += 1;
        }

        fn reset_defaults(&self) {
            *self.resets.lock().unwrap() += 1;
        }
    }
}
