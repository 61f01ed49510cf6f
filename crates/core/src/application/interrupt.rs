// Interrupt handling - user Ctrl-C vs. an active console handover

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Interrupt signal observed by the running operation
#[derive(Clone)]
pub struct InterruptToken {
    rx: watch::Receiver<bool>,
}

impl InterruptToken {
    /// Check if an interrupt was requested
    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for an interrupt
    pub async fn wait(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // sender gone: nobody can interrupt anymore
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Interrupt sender
pub struct InterruptSender {
    tx: watch::Sender<bool>,
}

impl InterruptSender {
    /// Cancel the running operation
    pub fn interrupt(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create an interrupt channel
pub fn interrupt_channel() -> (InterruptSender, InterruptToken) {
    let (tx, rx) = watch::channel(false);
    (InterruptSender { tx }, InterruptToken { rx })
}

/// Marks an interactive handover in progress
///
/// While active, Ctrl-C belongs to the attached console and must not
/// cancel the tool.
#[derive(Clone, Default)]
pub struct HandoverFlag {
    active: Arc<AtomicBool>,
}

impl HandoverFlag {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Activate until the returned scope is dropped
    pub fn enter(&self) -> HandoverScope {
        self.active.store(true, Ordering::SeqCst);
        HandoverScope {
            active: self.active.clone(),
        }
    }
}

/// Clears the handover flag on drop
pub struct HandoverScope {
    active: Arc<AtomicBool>,
}

impl Drop for HandoverScope {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
