// Scoped terminal save/restore

use std::sync::Arc;
use tracing::debug;

use crate::port::{TerminalControl, TerminalState};

/// Restores the saved terminal attributes when dropped
///
/// Drop runs on every exit path: normal return, `?` propagation, panic
/// unwinding and cancellation of the owning future.
pub struct TerminalGuard {
    terminal: Arc<dyn TerminalControl>,
    saved: Option<TerminalState>,
}

impl TerminalGuard {
    pub fn save(terminal: Arc<dyn TerminalControl>) -> Self {
        let saved = terminal.save();
        debug!(tty = saved.is_some(), "Terminal state saved");
        Self { terminal, saved }
    }

    pub fn saved(&self) -> Option<&TerminalState> {
        self.saved.as_ref()
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(state) = &self.saved {
            self.terminal.restore(state);
        }
        self.terminal.reset_defaults();
        debug!("Terminal state restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::terminal::mocks::MockTerminal;

    #[test]
    fn test_guard_restores_on_drop() {
        let terminal = MockTerminal::new();
        let before = terminal.current();
        {
            let _guard = TerminalGuard::save(Arc::new(terminal.clone()));
            terminal.corrupt();
            assert_ne!(terminal.current(), before);
        }
        assert_eq!(terminal.current(), before);
        assert_eq!(terminal.restore_count(), 1);
        assert_eq!(terminal.reset_count(), 1);
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let terminal = MockTerminal::new();
        let before = terminal.current();
        let inner = terminal.clone();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = TerminalGuard::save(Arc::new(inner.clone()));
            inner.corrupt();
            panic!("console crashed");
        }));

        assert!(outcome.is_err());
        assert_eq!(terminal.current(), before);
    }

    #[test]
    fn test_guard_dropped_early_restores_once() {
        let terminal = MockTerminal::new();
        let before = terminal.current();
        let guard = TerminalGuard::save(Arc::new(terminal.clone()));
        assert_eq!(guard.saved(), Some(&before));

        terminal.corrupt();
        drop(guard);

        assert_eq!(terminal.current(), before);
        assert_eq!(terminal.restore_count(), 1);
    }
}
