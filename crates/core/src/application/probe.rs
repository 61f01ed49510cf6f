//! State Probe Layer - per-signal observations with fallback strategies
//!
//! Each probe resolves the node, runs one or more bounded capture-mode
//! commands and interprets the text. Fallbacks trigger on empty output
//! only: the introspection tools routinely exit nonzero while still
//! printing something useful.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::executor::RemoteExecutor;
use super::resolver::NamespaceResolver;
use crate::domain::{
    render_template, CommandResult, ExecMode, ExecutionContext, NodeName, ProbeResult, ProbeSettings,
    ProbeSpec,
};
use crate::port::StateProbe;

pub const STRATEGY_RESOLVE: &str = "resolve";
pub const STRATEGY_VTYSH: &str = "vtysh";
pub const STRATEGY_VTY_LF: &str = "vty-lf";
pub const STRATEGY_VTY_CRLF: &str = "vty-crlf";
pub const STRATEGY_LOG_TAIL: &str = "log-tail";

/// Listening sockets; the first tool printing anything is authoritative
const LISTENER_TOOLS: [(&str, &str); 2] = [
    ("ss", "ss -tnl 2>/dev/null"),
    ("netstat", "netstat -tnl 2>/dev/null"),
];

/// Probes backed by the resolver and executor
pub struct NodeProbes {
    resolver: Arc<NamespaceResolver>,
    executor: Arc<RemoteExecutor>,
    settings: ProbeSettings,
}

impl NodeProbes {
    pub fn new(
        resolver: Arc<NamespaceResolver>,
        executor: Arc<RemoteExecutor>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            resolver,
            executor,
            settings,
        }
    }

    async fn run(&self, context: &ExecutionContext, command: &str) -> CommandResult {
        self.executor
            .execute(context, command, ExecMode::Capture)
            .await
    }

    async fn listener(&self, context: &ExecutionContext, signal: String, port: u16) -> ProbeResult {
        for (strategy, command) in LISTENER_TOOLS {
            let output = self.run(context, command).await;
            if output.is_blank() {
                debug!(node = %context.node, strategy, "Listener tool produced nothing, falling back");
                continue;
            }

            let listeners = filter_listeners(&output.stdout, port);
            return if listeners.is_empty() {
                ProbeResult::failed(
                    &context.node,
                    signal,
                    strategy,
                    format!("no listener on port {}", port),
                )
            } else {
                ProbeResult::passed(&context.node, signal, strategy, listeners.join("\n"))
            };
        }

        ProbeResult::failed(
            &context.node,
            signal,
            "netstat",
            "neither ss nor netstat produced output",
        )
    }

    async fn summary(&self, context: &ExecutionContext, signal: String) -> ProbeResult {
        let query = &self.settings.summary_query;

        let primary = self
            .run(context, &format!("vtysh -c '{}' 2>/dev/null", query))
            .await;
        if !primary.is_blank() {
            return ProbeResult::passed(&context.node, signal, STRATEGY_VTYSH, primary.stdout);
        }

        for (strategy, eol) in [(STRATEGY_VTY_LF, "\\n"), (STRATEGY_VTY_CRLF, "\\r\\n")] {
            info!(node = %context.node, strategy, "Summary empty, querying vty socket");
            let output = self.run(context, &self.vty_command(eol)).await;
            if !output.is_blank() {
                return ProbeResult::passed(&context.node, signal, strategy, output.stdout);
            }
        }

        info!(node = %context.node, "Vty socket silent, falling back to daemon log");
        let lines = self.settings.fallback_log_lines;
        let tail = match self.read_log(context, lines).await {
            Ok(text) => text,
            Err(reason) => reason,
        };

        ProbeResult::failed(
            &context.node,
            signal,
            STRATEGY_LOG_TAIL,
            format!(
                "summary unavailable from vtysh and vty socket; last {} log lines:\n{}",
                lines, tail
            ),
        )
    }

    fn vty_command(&self, eol: &str) -> String {
        format!(
            "printf '%s{eol}%s{eol}exit{eol}' '{password}' '{query}' | nc -w 2 {address} {port} 2>/dev/null",
            eol = eol,
            password = self.settings.vty_password,
            query = self.settings.summary_query,
            address = self.settings.vty_address,
            port = self.settings.vty_port,
        )
    }

    async fn reachability(
        &self,
        context: &ExecutionContext,
        signal: String,
        address: &str,
        timeout_secs: u64,
    ) -> ProbeResult {
        let url = format!("http://{}", address);
        let output = self
            .run(
                context,
                &format!("curl -s --max-time {} {} 2>/dev/null", timeout_secs, url),
            )
            .await;

        if output.is_blank() {
            return ProbeResult::failed(
                &context.node,
                signal,
                "curl",
                format!("empty response from {}", url),
            );
        }

        ProbeResult::passed(&context.node, signal, "curl", output.stdout.trim())
    }

    async fn log_tail(&self, context: &ExecutionContext, signal: String, lines: usize) -> ProbeResult {
        match self.read_log(context, lines).await {
            Ok(text) => ProbeResult::passed(&context.node, signal, STRATEGY_LOG_TAIL, text),
            Err(reason) => ProbeResult::failed(&context.node, signal, STRATEGY_LOG_TAIL, reason),
        }
    }

    /// Last `lines` lines of the node's daemon log, or why there are none
    async fn read_log(&self, context: &ExecutionContext, lines: usize) -> Result<String, String> {
        let path = render_template(
            &self.settings.log_path_template,
            &[("node", context.node.as_str())],
        );
        let output = self
            .run(context, &format!("tail -n {} {}", lines, path))
            .await;

        if output.is_blank() {
            let mut reason = format!("log file {} missing or empty", path);
            if !output.stderr.is_empty() {
                reason.push_str(&format!(" ({})", output.stderr));
            }
            return Err(reason);
        }
        Ok(output.stdout)
    }

    async fn process(&self, context: &ExecutionContext, signal: String, pattern: &str) -> ProbeResult {
        let command = format!("ps aux | grep -E '{}'", self_excluding_pattern(pattern));
        let output = self.run(context, &command).await;

        if output.is_blank() {
            ProbeResult::failed(
                &context.node,
                signal,
                "ps",
                format!("no process matching {:?}", pattern),
            )
        } else {
            ProbeResult::passed(&context.node, signal, "ps", output.stdout)
        }
    }
}

#[async_trait]
impl StateProbe for NodeProbes {
    async fn probe(&self, node: &NodeName, spec: &ProbeSpec) -> ProbeResult {
        let signal = spec.signal_name();

        let context = match self.resolver.resolve(node) {
            Ok(context) => context,
            Err(e) => {
                return ProbeResult::failed(
                    node,
                    signal,
                    STRATEGY_RESOLVE,
                    format!("{}: not currently discoverable", e),
                )
            }
        };

        match spec {
            ProbeSpec::Listener { port } => self.listener(&context, signal, *port).await,
            ProbeSpec::ProtocolSummary => self.summary(&context, signal).await,
            ProbeSpec::Reachability {
                address,
                timeout_secs,
            } => {
                self.reachability(&context, signal, address, *timeout_secs)
                    .await
            }
            ProbeSpec::LogTail { lines } => self.log_tail(&context, signal, *lines).await,
            ProbeSpec::Process { pattern } => self.process(&context, signal, pattern).await,
        }
    }
}

/// Lines of a socket listing with a column ending in `:<port>`
pub fn filter_listeners(listing: &str, port: u16) -> Vec<String> {
    let suffix = format!(":{}", port);
    listing
        .lines()
        .filter(|line| line.split_whitespace().any(|col| col.ends_with(&suffix)))
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// Bracket the first character of each alternative (`bgpd` -> `[b]gpd`)
///
/// The grep process itself then never matches its own command line.
pub fn self_excluding_pattern(pattern: &str) -> String {
    pattern
        .split('|')
        .map(|alt| {
            let mut chars = alt.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphanumeric() => {
                    format!("[{}]{}", first, chars.as_str())
                }
                _ => alt.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}
