//! Namespace Resolver - maps a logical node name to the process backing it
//!
//! Resolution is a pure function over a process snapshot. The resolver
//! rescans on every call because the sequencer restarts node processes
//! between operations.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{DomainError, ExecutionContext, LabConfig, NodeName, ProcessSnapshot};
use crate::port::{ProcessScanner, ScanError};

/// Resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("node `{0}` not found")]
    NotFound(NodeName),
}

/// Command-line marker binding a process to a node (`mininet:R6`)
#[derive(Debug, Clone)]
pub struct NodeTag {
    pattern: Regex,
}

impl NodeTag {
    pub fn new(prefix: &str) -> Result<Self, DomainError> {
        let pattern = format!(r"(?:^|[^A-Za-z0-9_]){}([A-Za-z0-9\-]+)", regex::escape(prefix));
        let pattern = Regex::new(&pattern)
            .map_err(|e| DomainError::ValidationError(format!("node tag: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Node name tagged in `command_line`, if any
    pub fn extract<'a>(&self, command_line: &'a str) -> Option<&'a str> {
        self.pattern
            .captures(command_line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Whether a process is an instance of this tool (`hijacklab`, `sudo hijacklab`)
fn is_tool_instance(argv: &[String], tool_name: &str) -> bool {
    argv.iter()
        .take(3)
        .any(|arg| Path::new(arg).file_name().and_then(|f| f.to_str()) == Some(tool_name))
}

/// Tagged processes eligible to represent a node, in scan order
fn candidates<'a>(
    snapshot: &'a ProcessSnapshot,
    tag: &'a NodeTag,
    tool_name: &'a str,
) -> impl Iterator<Item = (NodeName, u32)> + 'a {
    let lineage = snapshot.lineage();

    snapshot
        .records
        .iter()
        .filter(move |r| !lineage.contains(&r.pid))
        .filter(move |r| !is_tool_instance(&r.argv, tool_name))
        .filter_map(move |r| {
            let line = r.command_line();
            let name = tag.extract(&line)?;
            NodeName::new(name).ok().map(|n| (n, r.pid))
        })
}

/// Resolve `node` in `snapshot`; the last tagged record in scan order wins
pub fn resolve_in(
    snapshot: &ProcessSnapshot,
    node: &NodeName,
    tag: &NodeTag,
    tool_name: &str,
) -> Option<ExecutionContext> {
    candidates(snapshot, tag, tool_name)
        .filter(|(name, _)| name == node)
        .last()
        .map(|(node, pid)| ExecutionContext { node, pid })
}

/// Every resolvable node in `snapshot`, sorted by name
pub fn list_in(
    snapshot: &ProcessSnapshot,
    tag: &NodeTag,
    tool_name: &str,
) -> BTreeMap<NodeName, ExecutionContext> {
    let mut nodes = BTreeMap::new();
    for (node, pid) in candidates(snapshot, tag, tool_name) {
        // later records overwrite earlier ones
        nodes.insert(node.clone(), ExecutionContext { node, pid });
    }
    nodes
}

/// Resolver bound to a live process scanner
pub struct NamespaceResolver {
    scanner: Arc<dyn ProcessScanner>,
    tag: NodeTag,
    tool_name: String,
}

impl NamespaceResolver {
    pub fn new(scanner: Arc<dyn ProcessScanner>, config: &LabConfig) -> Result<Self, DomainError> {
        Ok(Self {
            scanner,
            tag: NodeTag::new(&config.node_tag_prefix)?,
            tool_name: config.tool_name.clone(),
        })
    }

    /// Current execution context of `node`
    ///
    /// A failed scan degrades to NotFound; callers treat it as "not ready yet".
    pub fn resolve(&self, node: &NodeName) -> Result<ExecutionContext, ResolveError> {
        let snapshot = self.snapshot_or_empty();
        let context = resolve_in(&snapshot, node, &self.tag, &self.tool_name)
            .ok_or_else(|| ResolveError::NotFound(node.clone()))?;

        debug!(node = %node, pid = context.pid, "Node resolved");
        Ok(context)
    }

    /// All resolvable nodes; empty when the process table cannot be read
    pub fn list(&self) -> BTreeMap<NodeName, ExecutionContext> {
        list_in(&self.snapshot_or_empty(), &self.tag, &self.tool_name)
    }

    /// All resolvable nodes, surfacing scan failure
    pub fn try_list(&self) -> Result<BTreeMap<NodeName, ExecutionContext>, ScanError> {
        let snapshot = self.scanner.snapshot()?;
        Ok(list_in(&snapshot, &self.tag, &self.tool_name))
    }

    fn snapshot_or_empty(&self) -> ProcessSnapshot {
        self.scanner.snapshot().unwrap_or_else(|e| {
            warn!(error = %e, "Process table scan failed, treating as empty");
            ProcessSnapshot::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProcessRecord;
    use crate::port::process_scanner::mocks::StaticScanner;

    fn tag() -> NodeTag {
        NodeTag::new("mininet:").unwrap()
    }

    fn node(name: &str) -> NodeName {
        NodeName::new(name).unwrap()
    }

    fn record(pid: u32, parent: u32, line: &str) -> ProcessRecord {
        ProcessRecord::new(
            pid,
            Some(parent),
            line.split_whitespace().map(String::from).collect(),
        )
    }

    fn shell(pid: u32, name: &str) -> ProcessRecord {
        record(pid, 1, &format!("bash --norc --noediting -is mininet:{}", name))
    }

    #[test]
    fn test_tag_extraction() {
        let tag = tag();
        assert_eq!(tag.extract("bash --norc -is mininet:R6"), Some("R6"));
        assert_eq!(tag.extract("bash -is mininet:h5-1 extra"), Some("h5-1"));
        assert_eq!(tag.extract("/usr/lib/frr/bgpd -f conf/bgpd-R6.conf"), None);
        assert_eq!(tag.extract("notmininet:R6"), None);
    }

    #[test]
    fn test_missing_node_is_none() {
        let snapshot = ProcessSnapshot::new(vec![shell(10, "R1")], Some(99));
        assert_eq!(resolve_in(&snapshot, &node("R9"), &tag(), "hijacklab"), None);
        assert_eq!(
            resolve_in(&ProcessSnapshot::default(), &node("R1"), &tag(), "hijacklab"),
            None
        );
    }

    #[test]
    fn test_single_match() {
        let snapshot = ProcessSnapshot::new(vec![shell(10, "R1"), shell(11, "R2")], Some(99));
        let context = resolve_in(&snapshot, &node("R2"), &tag(), "hijacklab").unwrap();
        assert_eq!(context.pid, 11);
        assert_eq!(context.node, node("R2"));
    }

    #[test]
    fn test_last_in_scan_order_wins() {
        // restarted shell appended with a lower pid after wraparound
        let snapshot = ProcessSnapshot::new(
            vec![shell(500, "R3"), shell(12, "R1"), shell(20, "R3")],
            Some(99),
        );
        let context = resolve_in(&snapshot, &node("R3"), &tag(), "hijacklab").unwrap();
        assert_eq!(context.pid, 20);
    }

    #[test]
    fn test_never_selects_self_or_ancestors() {
        let snapshot = ProcessSnapshot::new(
            vec![
                shell(10, "R6"),
                record(50, 1, "bash -c sudo python3 orchestrate mininet:R6"),
                record(51, 50, "sudo runner --node mininet:R6"),
                record(52, 51, "runner --node mininet:R6"),
            ],
            Some(52),
        );
        let context = resolve_in(&snapshot, &node("R6"), &tag(), "hijacklab").unwrap();
        assert_eq!(context.pid, 10);
    }

    #[test]
    fn test_never_selects_tool_instances() {
        let snapshot = ProcessSnapshot::new(
            vec![
                shell(10, "R6"),
                // another operator terminal quoting the tag as an argument
                ProcessRecord::new(
                    60,
                    Some(1),
                    vec![
                        "sudo".into(),
                        "/usr/local/bin/hijacklab".into(),
                        "exec".into(),
                        "--node".into(),
                        "R6".into(),
                        "echo 'mininet:R6'".into(),
                    ],
                ),
            ],
            Some(99),
        );
        let context = resolve_in(&snapshot, &node("R6"), &tag(), "hijacklab").unwrap();
        assert_eq!(context.pid, 10);

        let only_tool = ProcessSnapshot::new(vec![snapshot.records[1].clone()], Some(99));
        assert_eq!(resolve_in(&only_tool, &node("R6"), &tag(), "hijacklab"), None);
    }

    #[test]
    fn test_list_is_sorted_and_last_wins() {
        let snapshot = ProcessSnapshot::new(
            vec![shell(30, "R2"), shell(31, "R1"), shell(32, "R2")],
            Some(99),
        );
        let nodes = list_in(&snapshot, &tag(), "hijacklab");
        let names: Vec<&str> = nodes.keys().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["R1", "R2"]);
        assert_eq!(nodes[&node("R2")].pid, 32);
    }

    #[test]
    fn test_resolver_degrades_scan_failure() {
        let scanner = Arc::new(StaticScanner::failing(ScanError::AccessDenied(
            "/proc".into(),
        )));
        let resolver = NamespaceResolver::new(scanner, &LabConfig::default()).unwrap();

        assert_eq!(
            resolver.resolve(&node("R1")),
            Err(ResolveError::NotFound(node("R1")))
        );
        assert!(resolver.list().is_empty());
        assert!(resolver.try_list().is_err());
    }

    #[test]
    fn test_list_is_idempotent() {
        let scanner = Arc::new(StaticScanner::new(ProcessSnapshot::new(
            vec![shell(10, "R1"), shell(11, "h1-1")],
            Some(99),
        )));
        let resolver = NamespaceResolver::new(scanner.clone(), &LabConfig::default()).unwrap();

        assert_eq!(resolver.list(), resolver.list());
        assert_eq!(scanner.call_count(), 2);
    }
}
