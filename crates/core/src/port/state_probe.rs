// State probe port
// Seam between the verification engine and the concrete probe strategies
use async_trait::async_trait;

use crate::domain::{NodeName, ProbeResult, ProbeSpec};

/// Observes one signal on one node
///
/// Never fails: every outcome, including an unresolvable node or an
/// exhausted fallback chain, is a `ProbeResult` with evidence.
#[async_trait]
pub trait StateProbe: Send + Sync {
    async fn probe(&self, node: &NodeName, spec: &ProbeSpec) -> ProbeResult;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Probe handing out injected results in call order
    pub struct InjectedProbe {
        results: Mutex<VecDeque<ProbeResult>>,
        requests: Mutex<Vec<(NodeName, ProbeSpec)>>,
    }

    impl InjectedProbe {
        pub fn new(results: Vec<ProbeResult>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<(NodeName, ProbeSpec)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StateProbe for InjectedProbe {
        async fn probe(&self, node: &NodeName, spec: &ProbeSpec) -> ProbeResult {
            self.requests
                .lock()
                .unwrap()
                .push((node.clone(), spec.clone()));

            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    ProbeResult::failed(node, spec.signal_name(), "mock", "no injected result")
                })
        }
    }
}
