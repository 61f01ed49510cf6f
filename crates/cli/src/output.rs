//! Report rendering (plain text or colored tables)

use colored::Colorize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tabled::{Table, Tabled};

use hijacklab_core::application::constants::EVIDENCE_SNIPPET_CHARS;
use hijacklab_core::domain::{ExecutionContext, NodeName, ProbeResult, VerificationVerdict};
use hijacklab_core::port::ReportSink;

const EMPTY_BODY: &str = "(empty)";

/// Output style selected with `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Rich,
}

impl OutputFormat {
    pub fn sink(self) -> Arc<dyn ReportSink> {
        match self {
            OutputFormat::Plain => Arc::new(PlainSink),
            OutputFormat::Rich => Arc::new(RichSink),
        }
    }
}

fn pass_label(success: bool) -> &'static str {
    if success {
        "PASS"
    } else {
        "FAIL"
    }
}

fn passed_count(verdict: &VerificationVerdict) -> usize {
    verdict.results.iter().filter(|r| r.success).count()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First line of `evidence`, cut to the table width
fn snippet(evidence: &str) -> String {
    let first = evidence.lines().next().unwrap_or_default();
    let mut cut: String = first.chars().take(EVIDENCE_SNIPPET_CHARS).collect();
    if first.chars().count() > EVIDENCE_SNIPPET_CHARS || evidence.lines().nth(1).is_some() {
        cut.push_str(" ...");
    }
    cut
}

pub fn render_nodes_plain(nodes: &BTreeMap<NodeName, ExecutionContext>) -> String {
    if nodes.is_empty() {
        return "no running nodes".to_string();
    }
    nodes
        .values()
        .map(|ctx| format!("{:<8} pid={}", ctx.node.as_str(), ctx.pid))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Evidence report and the final line
pub fn render_verdict_plain(verdict: &VerificationVerdict) -> String {
    let mut out = String::new();
    for result in &verdict.results {
        out.push_str(&format!(
            "[{}] {} {} (via {})\n{}\n",
            pass_label(result.success),
            result.node,
            result.signal,
            result.strategy,
            indent(&result.evidence)
        ));
    }
    out.push_str(&format!(
        "RESULT: {} ({}/{} checks passed)",
        pass_label(verdict.passed),
        passed_count(verdict),
        verdict.results.len()
    ));
    out
}

/// Plain text, no color
pub struct PlainSink;

impl ReportSink for PlainSink {
    fn header(&self, title: &str) {
        println!("\n=== {} ===", title);
    }

    fn block(&self, title: &str, body: &str) {
        println!("--- {} ---", title);
        println!("{}", if body.trim().is_empty() { EMPTY_BODY } else { body });
    }

    fn step(&self, index: usize, total: usize, message: &str) {
        println!("[{}/{}] {}", index, total, message);
    }

    fn notice(&self, message: &str) {
        println!("[*] {}", message);
    }

    fn nodes(&self, nodes: &BTreeMap<NodeName, ExecutionContext>) {
        println!("{}", render_nodes_plain(nodes));
    }

    fn verdict(&self, verdict: &VerificationVerdict) {
        println!("{}", render_verdict_plain(verdict));
    }
}

#[derive(Tabled)]
struct NodeRow {
    node: String,
    pid: u32,
}

#[derive(Tabled)]
struct CheckRow {
    status: String,
    node: String,
    signal: String,
    via: String,
    evidence: String,
}

impl From<&ProbeResult> for CheckRow {
    fn from(result: &ProbeResult) -> Self {
        Self {
            status: pass_label(result.success).to_string(),
            node: result.node.to_string(),
            signal: result.signal.clone(),
            via: result.strategy.clone(),
            evidence: snippet(&result.evidence),
        }
    }
}

/// Colored headers and tabled summaries
pub struct RichSink;

impl ReportSink for RichSink {
    fn header(&self, title: &str) {
        println!();
        println!("{}", title.cyan().bold());
    }

    fn block(&self, title: &str, body: &str) {
        println!("{}", title.bold());
        if body.trim().is_empty() {
            println!("{}", EMPTY_BODY.dimmed());
        } else {
            println!("{}", body);
        }
    }

    fn step(&self, index: usize, total: usize, message: &str) {
        println!("{} {}", format!("[{}/{}]", index, total).blue().bold(), message);
    }

    fn notice(&self, message: &str) {
        println!("{} {}", "•".yellow().bold(), message);
    }

    fn nodes(&self, nodes: &BTreeMap<NodeName, ExecutionContext>) {
        if nodes.is_empty() {
            println!("{}", "No running nodes".yellow());
            return;
        }
        let rows: Vec<NodeRow> = nodes
            .values()
            .map(|ctx| NodeRow {
                node: ctx.node.to_string(),
                pid: ctx.pid,
            })
            .collect();
        println!("{}", Table::new(rows));
    }

    fn verdict(&self, verdict: &VerificationVerdict) {
        if verdict.results.is_empty() {
            println!("{}", "No checks were run".yellow());
        } else {
            let rows: Vec<CheckRow> = verdict.results.iter().map(CheckRow::from).collect();
            println!("{}", Table::new(rows));
        }

        for failed in verdict.failures() {
            println!(
                "{} {} {}",
                "✗".red().bold(),
                failed.node.to_string().bold(),
                failed.signal
            );
            println!("{}", indent(&failed.evidence));
        }

        let summary = format!(
            "{} ({}/{} checks passed)",
            pass_label(verdict.passed),
            passed_count(verdict),
            verdict.results.len()
        );
        if verdict.passed {
            println!("{} {}", "✓".green().bold(), summary.green().bold());
        } else {
            println!("{} {}", "✗".red().bold(), summary.red().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeName {
        name.parse().unwrap()
    }

    #[test]
    fn test_plain_verdict_lists_every_check() {
        let verdict = VerificationVerdict::from_results(vec![
            ProbeResult::passed(&node("R6"), "listener:179", "ss", "LISTEN 0 0.0.0.0:179"),
            ProbeResult::failed(
                &node("h5-1"),
                "http:11.0.1.1",
                "curl",
                "expected marker \"Attacker web server\" not found; observed:\nDefault web server",
            ),
        ]);

        let text = render_verdict_plain(&verdict);

        assert!(text.contains("[PASS] R6 listener:179 (via ss)"));
        assert!(text.contains("[FAIL] h5-1 http:11.0.1.1 (via curl)"));
        assert!(text.contains("    Default web server"));
        assert!(text.ends_with("RESULT: FAIL (1/2 checks passed)"));
    }

    #[test]
    fn test_plain_nodes() {
        let mut nodes = BTreeMap::new();
        assert_eq!(render_nodes_plain(&nodes), "no running nodes");

        nodes.insert(
            node("R1"),
            ExecutionContext {
                node: node("R1"),
                pid: 42,
            },
        );
        assert_eq!(render_nodes_plain(&nodes), "R1       pid=42");
    }

    #[test]
    fn test_snippet_marks_truncation() {
        assert_eq!(snippet("short"), "short");
        assert_eq!(snippet("first\nsecond"), "first ...");
        let long = "x".repeat(EVIDENCE_SNIPPET_CHARS + 5);
        assert_eq!(snippet(&long).chars().count(), EVIDENCE_SNIPPET_CHARS + 4);
    }
}
