// Probe Domain Model - observations, expectations and verdicts

use serde::Serialize;
use std::fmt;

use super::node::NodeName;

/// Which signal a probe observes, with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeSpec {
    /// Listening TCP sockets on `port`
    Listener { port: u16 },
    /// BGP neighbor summary of the node's routing daemon
    ProtocolSummary,
    /// HTTP body fetched from `address`
    Reachability { address: String, timeout_secs: u64 },
    /// Last `lines` lines of the node's daemon log
    LogTail { lines: usize },
    /// Processes whose `ps aux` line matches `pattern`
    Process { pattern: String },
}

impl ProbeSpec {
    /// Short signal name used in evidence reports
    pub fn signal_name(&self) -> String {
        match self {
            ProbeSpec::Listener { port } => format!("listener:{}", port),
            ProbeSpec::ProtocolSummary => "bgp-summary".to_string(),
            ProbeSpec::Reachability { address, .. } => format!("http:{}", address),
            ProbeSpec::LogTail { lines } => format!("log-tail:{}", lines),
            ProbeSpec::Process { pattern } => format!("process:{}", pattern),
        }
    }
}

/// How a probe's evidence is judged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchRule {
    /// The probe's own success decides
    NonEmpty,
    /// The summary line for `peer` shows an established session
    PeerEstablished { peer: String },
    /// The evidence contains `marker`
    Contains { marker: String },
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::NonEmpty => write!(f, "non-empty"),
            MatchRule::PeerEstablished { peer } => write!(f, "peer {} established", peer),
            MatchRule::Contains { marker } => write!(f, "contains {:?}", marker),
        }
    }
}

/// One check handed to the verification engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expectation {
    pub node: NodeName,
    pub probe: ProbeSpec,
    pub rule: MatchRule,
}

impl Expectation {
    pub fn new(node: NodeName, probe: ProbeSpec, rule: MatchRule) -> Self {
        Self { node, probe, rule }
    }

    pub fn listener(node: NodeName, port: u16) -> Self {
        Self::new(node, ProbeSpec::Listener { port }, MatchRule::NonEmpty)
    }

    pub fn session(node: NodeName, peer: impl Into<String>) -> Self {
        Self::new(
            node,
            ProbeSpec::ProtocolSummary,
            MatchRule::PeerEstablished { peer: peer.into() },
        )
    }

    pub fn reachable(
        node: NodeName,
        address: impl Into<String>,
        timeout_secs: u64,
        marker: impl Into<String>,
    ) -> Self {
        Self::new(
            node,
            ProbeSpec::Reachability {
                address: address.into(),
                timeout_secs,
            },
            MatchRule::Contains {
                marker: marker.into(),
            },
        )
    }

    pub fn log_tail(node: NodeName, lines: usize) -> Self {
        Self::new(node, ProbeSpec::LogTail { lines }, MatchRule::NonEmpty)
    }

    pub fn process(node: NodeName, pattern: impl Into<String>) -> Self {
        Self::new(
            node,
            ProbeSpec::Process {
                pattern: pattern.into(),
            },
            MatchRule::NonEmpty,
        )
    }
}

/// Outcome of one probe or check
///
/// Always carries non-empty evidence, failures included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub node: NodeName,
    pub signal: String,
    pub success: bool,
    pub evidence: String,
    /// Last strategy attempted (e.g. `vtysh`, `vty-crlf`, `log-tail`)
    pub strategy: String,
}

const NO_OUTPUT: &str = "(no output)";

impl ProbeResult {
    pub fn passed(
        node: &NodeName,
        signal: impl Into<String>,
        strategy: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self::build(node, signal.into(), true, strategy.into(), evidence.into())
    }

    pub fn failed(
        node: &NodeName,
        signal: impl Into<String>,
        strategy: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self::build(node, signal.into(), false, strategy.into(), evidence.into())
    }

    fn build(
        node: &NodeName,
        signal: String,
        success: bool,
        strategy: String,
        evidence: String,
    ) -> Self {
        let evidence = if evidence.trim().is_empty() {
            NO_OUTPUT.to_string()
        } else {
            evidence
        };

        Self {
            node: node.clone(),
            signal,
            success,
            evidence,
            strategy,
        }
    }
}

/// Ordered check results plus their logical AND
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationVerdict {
    pub results: Vec<ProbeResult>,
    pub passed: bool,
}

impl VerificationVerdict {
    pub fn from_results(results: Vec<ProbeResult>) -> Self {
        let passed = results.iter().all(|r| r.success);
        Self { results, passed }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(|r| !r.success)
    }

    /// Combine verdicts of several rounds into one, keeping order
    pub fn merge(verdicts: impl IntoIterator<Item = VerificationVerdict>) -> Self {
        Self::from_results(verdicts.into_iter().flat_map(|v| v.results).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeName {
        NodeName::new(name).unwrap()
    }

    #[test]
    fn test_failed_result_never_has_blank_evidence() {
        let result = ProbeResult::failed(&node("R1"), "listener:179", "ss", "   ");
        assert_eq!(result.evidence, NO_OUTPUT);
        assert!(!result.success);
    }

    #[test]
    fn test_verdict_is_logical_and() {
        let pass = ProbeResult::passed(&node("R1"), "a", "s", "ok");
        let fail = ProbeResult::failed(&node("R2"), "b", "s", "bad");

        assert!(VerificationVerdict::from_results(vec![pass.clone(), pass.clone()]).passed);
        let verdict = VerificationVerdict::from_results(vec![pass, fail]);
        assert!(!verdict.passed);
        assert_eq!(verdict.failures().count(), 1);
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(ProbeSpec::Listener { port: 179 }.signal_name(), "listener:179");
        assert_eq!(
            ProbeSpec::Reachability {
                address: "11.0.1.1".into(),
                timeout_secs: 3
            }
            .signal_name(),
            "http:11.0.1.1"
        );
    }
}
