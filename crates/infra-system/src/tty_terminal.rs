// Controlling terminal adapter (termios on stdin)
use std::io::IsTerminal;
use std::process::{Command, Stdio};
use tracing::debug;

use hijacklab_core::port::{TerminalControl, TerminalState};

/// Terminal control for the process's stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct TtyTerminal;

impl TtyTerminal {
    pub fn new() -> Self {
        Self
    }

    /// Run a terminal utility, ignoring every failure
    fn run_quietly(program: &str, arg: &str) {
        let status = Command::new(program)
            .arg(arg)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            debug!(program, error = %e, "Terminal reset utility unavailable");
        }
    }
}

impl TerminalControl for TtyTerminal {
    fn save(&self) -> Option<TerminalState> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return None;
        }

        #[cfg(unix)]
        {
            use nix::sys::termios::tcgetattr;

            match tcgetattr(&stdin) {
                Ok(termios) => Some(TerminalState {
                    input_flags: termios.input_flags.bits() as u64,
                    output_flags: termios.output_flags.bits() as u64,
                    control_flags: termios.control_flags.bits() as u64,
                    local_flags: termios.local_flags.bits() as u64,
                    control_chars: termios.control_chars.to_vec(),
                }),
                Err(e) => {
                    debug!(error = %e, "tcgetattr failed");
                    None
                }
            }
        }

        #[cfg(not(unix))]
        {
            None
        }
    }

    fn restore(&self, state: &TerminalState) {
        #[cfg(unix)]
        {
            use nix::sys::termios::{
                tcgetattr, tcsetattr, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg,
            };

            let stdin = std::io::stdin();
            let mut termios = match tcgetattr(&stdin) {
                Ok(termios) => termios,
                Err(e) => {
                    debug!(error = %e, "tcgetattr failed, nothing to restore");
                    return;
                }
            };

            termios.input_flags = InputFlags::from_bits_truncate(state.input_flags as _);
            termios.output_flags = OutputFlags::from_bits_truncate(state.output_flags as _);
            termios.control_flags = ControlFlags::from_bits_truncate(state.control_flags as _);
            termios.local_flags = LocalFlags::from_bits_truncate(state.local_flags as _);
            for (slot, value) in termios.control_chars.iter_mut().zip(&state.control_chars) {
                *slot = *value;
            }

            if let Err(e) = tcsetattr(&stdin, SetArg::TCSADRAIN, &termios) {
                debug!(error = %e, "tcsetattr failed");
            }
        }

        #[cfg(not(unix))]
        {
            let _ = state;
        }
    }

    fn reset_defaults(&self) {
        if !std::io::stdin().is_terminal() {
            return;
        }
        Self::run_quietly("stty", "sane");
        Self::run_quietly("tput", "cnorm");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_restore_round_trip_is_harmless() {
        let terminal = TtyTerminal::new();

        // test harnesses usually run without a tty
        if let Some(state) = terminal.save() {
            terminal.restore(&state);
            assert_eq!(terminal.save(), Some(state));
        }
        terminal.reset_defaults();
    }
}
