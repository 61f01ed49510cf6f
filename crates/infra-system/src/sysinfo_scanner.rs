// Process table scanner implementation
// reason: sysinfo for cross-platform process enumeration
use std::sync::{Arc, Mutex};
use sysinfo::{ProcessRefreshKind, System, UpdateKind};
use tracing::debug;

use hijacklab_core::domain::{ProcessRecord, ProcessSnapshot};
use hijacklab_core::port::{ProcessScanner, ScanError};

/// Process scanner backed by sysinfo
///
/// Records come back ordered by (start time, pid) so that "last in scan
/// order" means "most recently started".
pub struct SysinfoProcessScanner {
    system: Arc<Mutex<System>>,
}

impl SysinfoProcessScanner {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoProcessScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessScanner for SysinfoProcessScanner {
    fn snapshot(&self) -> Result<ProcessSnapshot, ScanError> {
        let mut sys = self
            .system
            .lock()
            .map_err(|e| ScanError::Unavailable(format!("scanner lock poisoned: {}", e)))?;

        // command lines are not part of the default refresh
        sys.refresh_processes_specifics(
            ProcessRefreshKind::new().with_cmd(UpdateKind::Always),
        );

        let mut entries: Vec<(u64, ProcessRecord)> = sys
            .processes()
            .values()
            // kernel threads and zombies carry no command line
            .filter(|p| !p.cmd().is_empty())
            .map(|p| {
                let record = ProcessRecord::new(
                    p.pid().as_u32(),
                    p.parent().map(|parent| parent.as_u32()),
                    p.cmd().to_vec(),
                );
                (p.start_time(), record)
            })
            .collect();

        if entries.is_empty() {
            return Err(ScanError::Unavailable(
                "no readable process command lines".to_string(),
            ));
        }

        entries.sort_by_key(|(started, record)| (*started, record.pid));
        let self_pid = sysinfo::get_current_pid().ok().map(|pid| pid.as_u32());

        debug!(processes = entries.len(), self_pid = ?self_pid, "Process table scanned");

        Ok(ProcessSnapshot::new(
            entries.into_iter().map(|(_, record)| record).collect(),
            self_pid,
        ))
    }
}
