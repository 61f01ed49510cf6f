// Node Domain Model - topology participants and the processes backing them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{DomainError, Result};

/// Logical topology node name (e.g. `R6`, `h5-1`)
///
/// Unique within a running experiment. Never empty, never contains whitespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidNodeName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Built-in defaults that are known to be valid
    pub(crate) fn from_static(name: &'static str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NodeName> for String {
    fn from(value: NodeName) -> Self {
        value.0
    }
}

/// Live OS handle representing a node at one instant
///
/// Discovered by the resolver, never created. Goes stale as soon as the
/// backing process exits or is restarted by the emulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub node: NodeName,
    pub pid: u32,
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.node, self.pid)
    }
}

/// One row of a process table snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub parent: Option<u32>,
    pub argv: Vec<String>,
}

impl ProcessRecord {
    pub fn new(pid: u32, parent: Option<u32>, argv: Vec<String>) -> Self {
        Self { pid, parent, argv }
    }

    /// Full command line, arguments joined by single spaces
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Process table snapshot in scan order
///
/// Scan order is oldest first: the emulator appends restarted node shells
/// at the end instead of reusing pids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub records: Vec<ProcessRecord>,
    /// Pid of the process that took the snapshot, if known
    pub self_pid: Option<u32>,
}

impl ProcessSnapshot {
    pub fn new(records: Vec<ProcessRecord>, self_pid: Option<u32>) -> Self {
        Self { records, self_pid }
    }

    pub fn find(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.iter().find(|r| r.pid == pid)
    }

    /// Pid of the scanning process followed by all of its ancestors
    pub fn lineage(&self) -> Vec<u32> {
        let mut lineage = Vec::new();
        let mut cursor = self.self_pid;

        while let Some(pid) = cursor {
            // parent links can loop in a torn snapshot
            if lineage.contains(&pid) {
                break;
            }
            lineage.push(pid);
            cursor = self.find(pid).and_then(|r| r.parent);
        }

        lineage
    }
}
