//! Convergence/Verification Engine - composes probes into a verdict
//!
//! Stateless and single-shot: no retry or backoff happens here. Callers
//! insert a settling delay before calling `verify`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{Expectation, MatchRule, ProbeResult, ProbeSettings, VerificationVerdict};
use crate::port::StateProbe;

pub struct VerificationEngine {
    probe: Arc<dyn StateProbe>,
    evidence_chars: usize,
}

impl VerificationEngine {
    pub fn new(probe: Arc<dyn StateProbe>) -> Self {
        Self {
            probe,
            evidence_chars: ProbeSettings::default().evidence_chars,
        }
    }

    /// Characters of a matched body kept as evidence
    pub fn with_evidence_chars(mut self, evidence_chars: usize) -> Self {
        self.evidence_chars = evidence_chars;
        self
    }

    /// Run every expectation in order and AND the outcomes
    ///
    /// The verdict always carries one result per expectation, in input
    /// order, each with evidence.
    pub async fn verify(&self, expectations: &[Expectation]) -> VerificationVerdict {
        let mut observed = Vec::with_capacity(expectations.len());
        for expectation in expectations {
            observed.push(
                self.probe
                    .probe(&expectation.node, &expectation.probe)
                    .await,
            );
        }
        self.judge_observed(expectations, observed)
    }

    /// Judge results observed earlier, one per expectation, in order
    pub fn judge_observed(
        &self,
        expectations: &[Expectation],
        observed: Vec<ProbeResult>,
    ) -> VerificationVerdict {
        let mut results = Vec::with_capacity(expectations.len());

        for (expectation, observed) in expectations.iter().zip(observed) {
            let judged = judge(observed, &expectation.rule, self.evidence_chars);

            if !judged.success {
                warn!(
                    node = %judged.node,
                    signal = %judged.signal,
                    strategy = %judged.strategy,
                    "Check failed"
                );
            }
            results.push(judged);
        }

        let verdict = VerificationVerdict::from_results(results);
        info!(
            checks = verdict.results.len(),
            passed = verdict.passed,
            "Verification completed"
        );
        verdict
    }
}

/// Apply `rule` to a probe outcome
///
/// Markers are searched in the whole body; only the reported evidence is
/// cut to `evidence_chars`.
fn judge(mut result: ProbeResult, rule: &MatchRule, evidence_chars: usize) -> ProbeResult {
    if !result.success {
        return result;
    }

    let failure = match rule {
        MatchRule::NonEmpty => None,
        MatchRule::PeerEstablished { peer } => match peer_established(&result.evidence, peer) {
            Some(true) => None,
            Some(false) => Some(format!("session with {} is not established", peer)),
            None => Some(format!("no summary line for peer {}", peer)),
        },
        MatchRule::Contains { marker } => {
            let found = result.evidence.contains(marker.as_str());
            result.evidence = result.evidence.chars().take(evidence_chars).collect();
            if found {
                None
            } else {
                Some(format!("expected marker {:?} not found", marker))
            }
        }
    };

    if let Some(reason) = failure {
        result.success = false;
        result.evidence = format!("{}; observed:\n{}", reason, result.evidence);
    }
    result
}

/// Session state of `peer` in a neighbor summary
///
/// `None` when no line starts with the peer address. Established when the
/// line carries a state token starting with `estab` or its trailing
/// received-prefix count is at least 1.
pub fn peer_established(summary: &str, peer: &str) -> Option<bool> {
    let line = summary
        .lines()
        .map(str::trim)
        .find(|line| line.split_whitespace().next() == Some(peer))?;

    let state_token = line
        .split_whitespace()
        .any(|token| token.to_ascii_lowercase().starts_with("estab"));

    let prefixes = line
        .split_whitespace()
        .last()
        .and_then(|token| token.parse::<u64>().ok())
        .map(|count| count >= 1)
        .unwrap_or(false);

    Some(state_token || prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeName, ProbeSpec};
    use crate::port::state_probe::mocks::InjectedProbe;

    fn node(name: &str) -> NodeName {
        NodeName::new(name).unwrap()
    }

    #[test]
    fn test_peer_established_by_prefix_count() {
        let summary = "\
Neighbor        V  AS MsgRcvd MsgSent TblVer InQ OutQ Up/Down  State/PfxRcd
9.0.7.2         4   6      12      14      0   0    0 00:02:11        2
9.0.4.1         4   4       3       3      0   0    0 never    Active";

        assert_eq!(peer_established(summary, "9.0.7.2"), Some(true));
        assert_eq!(peer_established(summary, "9.0.4.1"), Some(false));
        assert_eq!(peer_established(summary, "9.0.9.9"), None);
    }

    #[test]
    fn test_peer_established_by_state_token() {
        assert_eq!(
            peer_established("9.0.7.2 4 6 1 1 0 0 0 00:00:05 Established 0", "9.0.7.2"),
            Some(true)
        );
        assert_eq!(
            peer_established("9.0.7.2 4 6 1 1 0 0 0 00:00:05 Estab", "9.0.7.2"),
            Some(true)
        );
        assert_eq!(
            peer_established("9.0.7.2 4 6 1 1 0 0 0 00:00:05 0", "9.0.7.2"),
            Some(false)
        );
    }

    #[test]
    fn test_peer_line_must_start_with_peer() {
        // peer address appearing mid-line is not its summary line
        assert_eq!(
            peer_established("bgpd: neighbor 9.0.7.2 Established", "9.0.7.2"),
            None
        );
    }

    #[tokio::test]
    async fn test_verdict_is_and_over_all_combinations() {
        for n in 0..=3usize {
            for mask in 0..(1u32 << n) {
                let results: Vec<ProbeResult> = (0..n)
                    .map(|i| {
                        if mask & (1 << i) != 0 {
                            ProbeResult::passed(&node("R1"), format!("c{}", i), "mock", "ok")
                        } else {
                            ProbeResult::failed(&node("R1"), format!("c{}", i), "mock", "bad")
                        }
                    })
                    .collect();
                let expectations: Vec<Expectation> = (0..n)
                    .map(|_| Expectation::listener(node("R1"), 179))
                    .collect();

                let engine = VerificationEngine::new(Arc::new(InjectedProbe::new(results)));
                let verdict = engine.verify(&expectations).await;

                assert_eq!(verdict.results.len(), n);
                assert_eq!(verdict.passed, mask == (1u32 << n) - 1);
                let order: Vec<String> = verdict.results.iter().map(|r| r.signal.clone()).collect();
                let expected: Vec<String> = (0..n).map(|i| format!("c{}", i)).collect();
                assert_eq!(order, expected);
            }
        }
    }

    #[tokio::test]
    async fn test_contains_rule_explains_mismatch() {
        let probe = Arc::new(InjectedProbe::new(vec![ProbeResult::passed(
            &node("h5-1"),
            "http:11.0.1.1",
            "curl",
            "Default web server 2.1.1 (AS1)",
        )]));
        let engine = VerificationEngine::new(probe.clone());

        let verdict = engine
            .verify(&[Expectation::reachable(
                node("h5-1"),
                "11.0.1.1",
                3,
                "Attacker web server",
            )])
            .await;

        assert!(!verdict.passed);
        assert!(verdict.results[0].evidence.contains("Default web server"));
        assert_eq!(
            probe.requests()[0].1,
            ProbeSpec::Reachability {
                address: "11.0.1.1".into(),
                timeout_secs: 3
            }
        );
    }

    #[tokio::test]
    async fn test_marker_past_evidence_limit_is_found() {
        let body = format!("<html>{}*** Attacker web server (AS6) ***", "p".repeat(600));
        let probe = Arc::new(InjectedProbe::new(vec![ProbeResult::passed(
            &node("h5-1"),
            "http:11.0.1.1",
            "curl",
            body,
        )]));
        let engine = VerificationEngine::new(probe).with_evidence_chars(500);

        let verdict = engine
            .verify(&[Expectation::reachable(
                node("h5-1"),
                "11.0.1.1",
                3,
                "Attacker web server",
            )])
            .await;

        assert!(verdict.passed);
        assert_eq!(verdict.results[0].evidence.chars().count(), 500);
        assert!(verdict.results[0].evidence.starts_with("<html>ppp"));
    }

    #[tokio::test]
    async fn test_failed_probe_is_not_rejudged() {
        let probe = Arc::new(InjectedProbe::new(vec![ProbeResult::failed(
            &node("R3"),
            "bgp-summary",
            "log-tail",
            "summary unavailable",
        )]));
        let engine = VerificationEngine::new(probe);

        let verdict = engine
            .verify(&[Expectation::session(node("R3"), "9.0.7.2")])
            .await;

        assert!(!verdict.passed);
        assert_eq!(verdict.results[0].strategy, "log-tail");
        assert_eq!(verdict.results[0].evidence, "summary unavailable");
    }
}
