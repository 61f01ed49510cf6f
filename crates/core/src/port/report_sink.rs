// Report sink port
// Formatter capability injected at startup (plain or rich rendering)

use std::collections::BTreeMap;

use crate::domain::{ExecutionContext, NodeName, VerificationVerdict};

/// Receives operator-facing progress and evidence
pub trait ReportSink: Send + Sync {
    /// Section title
    fn header(&self, title: &str);

    /// Titled block of command output; empty bodies are rendered as such
    fn block(&self, title: &str, body: &str);

    /// Numbered step of a multi-step procedure
    fn step(&self, index: usize, total: usize, message: &str);

    /// Free-form note for the operator
    fn notice(&self, message: &str);

    /// Table of currently resolvable nodes
    fn nodes(&self, nodes: &BTreeMap<NodeName, ExecutionContext>);

    /// Full evidence report followed by the pass/fail line
    fn verdict(&self, verdict: &VerificationVerdict);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Event captured by RecordingSink
    #[derive(Debug, Clone, PartialEq)]
    pub enum ReportEvent {
        Header(String),
        Block { title: String, body: String },
        Step(usize, usize, String),
        Notice(String),
        Nodes(Vec<String>),
        Verdict(VerificationVerdict),
    }

    /// Sink recording every event in order
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<ReportEvent>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ReportEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn verdicts(&self) -> Vec<VerificationVerdict> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ReportEvent::Verdict(v) => Some(v),
                    _ => None,
                })
                .collect()
        }

        fn push(&self, event: ReportEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ReportSink for RecordingSink {
        fn header(&self, title: &str) {
            self.push(ReportEvent::Header(title.to_string()));
        }

        fn block(&self, title: &str, body: &str) {
            self.push(ReportEvent::Block {
                title: title.to_string(),
                body: body.to_string(),
            });
        }

        fn step(&self, index: usize, total: usize, message: &str) {
            self.push(ReportEvent::Step(index, total, message.to_string()));
        }

        fn notice(&self, message: &str) {
            self.push(ReportEvent::Notice(message.to_string()));
        }

        fn nodes(&self, nodes: &BTreeMap<NodeName, ExecutionContext>) {
            self.push(ReportEvent::Nodes(
                nodes.keys().map(|n| n.to_string()).collect(),
            ));
        }

        fn verdict(&self, verdict: &VerificationVerdict) {
            self.push(ReportEvent::Verdict(verdict.clone()));
        }
    }
}
