//! Orchestration Sequencer - start/reset/verify/attack lifecycle
//!
//! Sequences shell invocations on the host and on nodes, inserts settling
//! delays and hands the resulting checks to the verification engine.
//! Every operation is idempotent and safe to re-run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::executor::RemoteExecutor;
use super::probe::self_excluding_pattern;
use super::resolver::NamespaceResolver;
use super::verification::VerificationEngine;
use crate::domain::{
    render_template, CommandResult, ExecMode, ExecutionContext, Expectation, LabConfig, MatchRule,
    NodeName, ProbeResult, ProbeSpec, VerificationVerdict,
};
use crate::error::Result;
use crate::port::{ReportSink, StateProbe, TimeProvider};

/// Lines of the observer router's log shown after an attack
const ATTACK_LOG_LINES: usize = 40;

/// Lines of the observer router's log checked by `check`
const CHECK_LOG_LINES: usize = 30;

/// Options of the `reset` operation
#[derive(Debug, Clone, Copy)]
pub struct ResetOptions {
    pub flush_iptables: bool,
    pub restore_sysctl: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            flush_iptables: true,
            restore_sysctl: true,
        }
    }
}

/// Options of the `start` operation
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Reset before starting; `None` skips the reset
    pub reset: Option<ResetOptions>,
    pub sleep_secs: u64,
    pub rogue: bool,
}

/// Options of the `verify` operation
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub routers: Vec<NodeName>,
    pub port: u16,
    pub tail_lines: usize,
    pub settle: Duration,
    /// Extra verification rounds after a failed one, each after `settle`
    pub retries: u32,
}

/// Options of the `attack` operation
#[derive(Debug, Clone)]
pub struct AttackOptions {
    pub start_attacker: bool,
    pub hard: bool,
    /// Skip the baseline check and go straight to hard mode
    pub only_hard: bool,
    pub wait: Duration,
}

/// Drives the lab lifecycle
pub struct Orchestrator {
    config: LabConfig,
    resolver: Arc<NamespaceResolver>,
    executor: Arc<RemoteExecutor>,
    probe: Arc<dyn StateProbe>,
    engine: VerificationEngine,
    sink: Arc<dyn ReportSink>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Orchestrator {
    pub fn new(
        config: LabConfig,
        resolver: Arc<NamespaceResolver>,
        executor: Arc<RemoteExecutor>,
        probe: Arc<dyn StateProbe>,
        sink: Arc<dyn ReportSink>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let engine =
            VerificationEngine::new(probe.clone()).with_evidence_chars(config.probe.evidence_chars);
        Self {
            config,
            resolver,
            executor,
            engine,
            probe,
            sink,
            time_provider,
        }
    }

    /// Show every resolvable node
    ///
    /// # Errors
    /// - AppError::Scan if the process table cannot be read at all
    pub fn list(&self) -> Result<BTreeMap<NodeName, ExecutionContext>> {
        let nodes = self.resolver.try_list()?;
        self.sink.nodes(&nodes);
        Ok(nodes)
    }

    /// Run one command on a node
    ///
    /// # Errors
    /// - AppError::Resolve if no live context backs `node`
    pub async fn exec(
        &self,
        node: &NodeName,
        command: &str,
        mode: ExecMode,
    ) -> Result<CommandResult> {
        let context = self.resolver.resolve(node)?;
        Ok(self.executor.execute(&context, command, mode).await)
    }

    /// Best-effort teardown of daemons, emulator state and host settings
    pub async fn reset(&self, options: ResetOptions) {
        self.sink.header("Lab reset");

        let steps = self.reset_steps(options);
        let total = steps.len() + 1;
        for (index, (title, commands)) in steps.iter().enumerate() {
            self.sink.step(index + 1, total, title);
            for command in commands {
                let result = self.executor.execute_host(command, ExecMode::Capture).await;
                if !result.stderr.is_empty() {
                    warn!(command = %command, stderr = %result.stderr, "Reset command reported an error");
                }
            }
        }
        self.sink.step(total, total, "Done. System is clean.");
        info!(steps = total, "Reset completed");
    }

    fn reset_steps(&self, options: ResetOptions) -> Vec<(&'static str, Vec<String>)> {
        let quiet = |cmd: &str| format!("{} >/dev/null 2>&1 || true", cmd);
        let webserver = self_excluding_pattern(&self.config.daemons.webserver_pattern);

        let mut steps = vec![
            (
                "Kill FRR daemons (watchfrr/bgpd/zebra) and web servers",
                vec![
                    quiet("pkill -9 watchfrr"),
                    quiet("pkill -9 bgpd"),
                    quiet("pkill -9 zebra"),
                    quiet(&format!("pkill -9 -f '{}'", webserver)),
                ],
            ),
            ("Clean emulator state (mn -c)", vec![quiet("mn -c")]),
            (
                "Remove temp pid/log files and recreate logs/",
                vec![
                    quiet("rm -f /tmp/R*.pid /tmp/R*.log"),
                    quiet("mkdir -p logs && rm -f logs/*"),
                ],
            ),
            (
                "Purge stale vty listeners (TCP 2601-2609)",
                vec![
                    "ss -tanp | grep -E ':260[1-9]\\s' | awk '{print $6}' | cut -d, -f2 | cut -d= -f2 | xargs -r kill -9 >/dev/null 2>&1 || true".to_string(),
                ],
            ),
            (
                "Release stale pid locks",
                vec![quiet("rm -f /tmp/*-R?.pid /tmp/*-R??.pid")],
            ),
        ];

        if options.flush_iptables {
            steps.push((
                "Flush iptables (filter/nat/mangle)",
                vec![
                    quiet("iptables -F"),
                    quiet("iptables -t nat -F"),
                    quiet("iptables -t mangle -F"),
                ],
            ));
        }

        if options.restore_sysctl {
            steps.push((
                "Restore sysctl defaults",
                vec![
                    quiet("sysctl -w net.ipv4.ip_forward=0"),
                    quiet("sysctl -w net.ipv6.conf.all.disable_ipv6=0"),
                ],
            ));
        }

        let routers: Vec<&str> = self.config.topology.routers.iter().map(|r| r.as_str()).collect();
        steps.push((
            "Scaffold FRR vtysh configuration",
            vec![format!(
                "if [ -d /etc/frr ]; then for n in {}; do mkdir -p /etc/frr/$n && : > /etc/frr/$n/vtysh.conf; done; \
                 chown -R frr:frr /etc/frr; find /etc/frr -type f -name vtysh.conf -exec chmod 640 {{}} \\; ; fi 2>/dev/null || true",
                routers.join(" ")
            )],
        ));

        steps
    }

    /// Optionally reset, then hand the terminal to the topology launcher
    pub async fn start(&self, options: StartOptions) -> CommandResult {
        if let Some(reset) = options.reset {
            self.reset(reset).await;
        }

        self.sink.header("Start topology");
        let sleep = options.sleep_secs.to_string();
        let mut command = render_template(
            &self.config.daemons.topology_launcher,
            &[("sleep", sleep.as_str())],
        );
        if options.rogue {
            command.push(' ');
            command.push_str(&self.config.daemons.rogue_flag);
            self.sink.notice("rogue AS enabled");
        }
        self.sink
            .notice("handing over to the emulator console (type 'quit' to exit)");

        let result = self.executor.execute_host(&command, ExecMode::Interactive).await;
        match result.exit_code {
            Some(code) => self.sink.notice(&format!("emulator exited (code={})", code)),
            None => self.sink.notice(&format!(
                "emulator did not exit cleanly: {}",
                if result.stderr.is_empty() {
                    "killed by signal"
                } else {
                    result.stderr.as_str()
                }
            )),
        }
        result
    }

    /// Listener and log checks on every router, after a settling delay
    pub async fn verify(&self, options: VerifyOptions) -> VerificationVerdict {
        self.sink.header("Verify routers");

        let mut expectations: Vec<Expectation> = options
            .routers
            .iter()
            .map(|r| Expectation::listener(r.clone(), options.port))
            .collect();
        expectations.extend(
            options
                .routers
                .iter()
                .map(|r| Expectation::log_tail(r.clone(), options.tail_lines)),
        );

        let mut attempt = 0;
        let verdict = loop {
            self.settle(options.settle).await;
            let verdict = self.engine.verify(&expectations).await;
            if verdict.passed || attempt >= options.retries {
                break verdict;
            }
            attempt += 1;
            self.sink.notice(&format!(
                "not converged yet, retrying ({}/{})",
                attempt, options.retries
            ));
        };

        self.sink.verdict(&verdict);
        verdict
    }

    /// Inject the hijack and measure traffic redirection
    pub async fn attack(&self, options: AttackOptions) -> VerificationVerdict {
        let topology = self.config.topology.clone();
        let mut rounds = Vec::new();

        if options.start_attacker {
            self.start_attacker().await;
        } else {
            self.sink.notice("attacker start skipped");
        }

        self.sink.header(&format!("{}: listener and daemons", topology.attacker_router));
        rounds.push(
            self.engine
                .verify(&[
                    Expectation::listener(topology.attacker_router.clone(), topology.bgp_port),
                    Expectation::process(topology.attacker_router.clone(), "zebra"),
                    Expectation::process(topology.attacker_router.clone(), "bgpd"),
                ])
                .await,
        );

        let summaries = self.show_summaries(&topology.observer_routers).await;
        let sessions: Vec<Expectation> = topology
            .sessions
            .iter()
            .map(|s| Expectation::session(s.router.clone(), s.peer.clone()))
            .collect();
        let mut observed = Vec::with_capacity(sessions.len());
        for session in &sessions {
            observed.push(match summaries.get(&session.node) {
                Some(summary) => summary.clone(),
                None => self.probe.probe(&session.node, &session.probe).await,
            });
        }
        rounds.push(self.engine.judge_observed(&sessions, observed));

        if !options.only_hard {
            self.sink.header("Baseline hijack check");
            self.settle(options.wait).await;
            rounds.push(
                self.engine
                    .verify(&[self.http_expectation(&topology.victim_host, &topology.attacker_marker)])
                    .await,
            );
        }

        if options.hard || options.only_hard {
            self.switch_to_hard().await;
            self.settle(options.wait).await;

            let checks: Vec<Expectation> = topology
                .probe_hosts
                .iter()
                .map(|host| {
                    let marker = if *host == topology.origin_host {
                        &topology.origin_marker
                    } else {
                        &topology.attacker_marker
                    };
                    self.http_expectation(host, marker)
                })
                .collect();
            rounds.push(self.engine.verify(&checks).await);
        } else {
            self.sink.notice("hard mode not requested");
        }

        self.show_log(&topology.log_router, ATTACK_LOG_LINES).await;

        let verdict = VerificationVerdict::merge(rounds);
        self.sink.verdict(&verdict);
        verdict
    }

    /// Presence checks for every attacker-side component
    pub async fn check(&self) -> VerificationVerdict {
        let topology = &self.config.topology;

        self.sink.header("Host FRR processes");
        let host = self
            .executor
            .execute_host(
                &format!("ps aux | grep -E '{}'", self_excluding_pattern("bgpd|zebra")),
                ExecMode::Capture,
            )
            .await;
        self.sink.block("ps aux (host)", &host.stdout);

        let expectations = vec![
            Expectation::process(topology.attacker_router.clone(), "bgpd"),
            Expectation::process(topology.attacker_router.clone(), "zebra"),
            Expectation::listener(topology.attacker_router.clone(), topology.bgp_port),
            Expectation::process(
                topology.attacker_host.clone(),
                self.config.daemons.webserver_pattern.clone(),
            ),
            Expectation::log_tail(topology.log_router.clone(), CHECK_LOG_LINES),
            Expectation::new(
                topology.victim_host.clone(),
                ProbeSpec::Reachability {
                    address: topology.target_address.clone(),
                    timeout_secs: topology.http_timeout_secs,
                },
                MatchRule::NonEmpty,
            ),
        ];

        let verdict = self.engine.verify(&expectations).await;
        self.sink.verdict(&verdict);
        verdict
    }

    async fn start_attacker(&self) {
        let router = &self.config.topology.attacker_router;
        let host = &self.config.topology.attacker_host;
        let daemons = &self.config.daemons;
        self.sink.header(&format!("{}: FRR daemons and {} web server", router, host));

        match self.resolver.resolve(router) {
            Ok(context) => {
                for template in [&daemons.zebra, &daemons.bgpd] {
                    let command = render_template(template, &[("node", router.as_str())]);
                    let result = self
                        .executor
                        .execute(&context, &format!("{} || true", command), ExecMode::Capture)
                        .await;
                    if !result.stderr.is_empty() {
                        self.sink.notice(&format!("daemon start: {}", result.stderr));
                    }
                }
            }
            Err(e) => self.sink.notice(&format!("{}; daemons not started", e)),
        }

        let running = self
            .probe
            .probe(
                host,
                &ProbeSpec::Process {
                    pattern: daemons.webserver_pattern.clone(),
                },
            )
            .await;
        if running.success {
            self.sink.notice(&format!("{}: web server already running", host));
            return;
        }

        match self.resolver.resolve(host) {
            Ok(context) => {
                self.executor
                    .execute(&context, &daemons.webserver, ExecMode::Capture)
                    .await;
                self.sink.notice(&format!("{}: web server started", host));
            }
            Err(e) => self.sink.notice(&format!("{}; web server not started", e)),
        }
    }

    async fn switch_to_hard(&self) {
        let router = &self.config.topology.attacker_router;
        let daemons = &self.config.daemons;
        self.sink.header(&format!("{}: switching to hard attack", router));

        let context = match self.resolver.resolve(router) {
            Ok(context) => context,
            Err(e) => {
                self.sink.notice(&format!("{}; hard mode not applied", e));
                return;
            }
        };

        let vars = [("node", router.as_str())];
        let stop = format!("{} || true", render_template(&daemons.stop_bgpd, &vars));
        self.executor.execute(&context, &stop, ExecMode::Capture).await;

        let start = render_template(&daemons.bgpd_hard, &vars);
        let result = self.executor.execute(&context, &start, ExecMode::Capture).await;
        if !result.stderr.is_empty() {
            self.sink.notice(&result.stderr);
        }
    }

    /// Display each router's summary; the results are kept for judging
    async fn show_summaries(&self, routers: &[NodeName]) -> BTreeMap<NodeName, ProbeResult> {
        let mut summaries = BTreeMap::new();
        for router in routers {
            let result = self.probe.probe(router, &ProbeSpec::ProtocolSummary).await;
            let title = format!(
                "{}: {} (via {})",
                router, self.config.probe.summary_query, result.strategy
            );
            self.sink.block(&title, &result.evidence);
            summaries.insert(router.clone(), result);
        }
        summaries
    }

    async fn show_log(&self, router: &NodeName, lines: usize) {
        let result = self.probe.probe(router, &ProbeSpec::LogTail { lines }).await;
        self.sink
            .block(&format!("{}: bgpd log tail (-{})", router, lines), &result.evidence);
    }

    fn http_expectation(&self, host: &NodeName, marker: &str) -> Expectation {
        Expectation::reachable(
            host.clone(),
            self.config.topology.target_address.clone(),
            self.config.topology.http_timeout_secs,
            marker,
        )
    }

    async fn settle(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        self.sink.notice(&format!(
            "waiting {}s for BGP convergence...",
            delay.as_secs()
        ));
        self.time_provider.sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::probe::NodeProbes;
    use crate::application::resolver::ResolveError;
    use crate::error::AppError;
    use crate::domain::{ProcessRecord, ProcessSnapshot};
    use crate::port::command_runner::mocks::ScriptedRunner;
    use crate::port::process_scanner::mocks::StaticScanner;
    use crate::port::report_sink::mocks::{RecordingSink, ReportEvent};
    use crate::port::terminal::mocks::MockTerminal;
    use crate::port::time_provider::mocks::ManualTimeProvider;

    struct Harness {
        orchestrator: Orchestrator,
        runner: Arc<ScriptedRunner>,
        sink: Arc<RecordingSink>,
        clock: ManualTimeProvider,
    }

    fn harness(runner: ScriptedRunner) -> Harness {
        let config = LabConfig::default();
        let names = [
            "R1", "R2", "R3", "R4", "R5", "R6", "h1-1", "h2-1", "h3-1", "h4-1", "h5-1", "h6-1",
        ];
        let snapshot = ProcessSnapshot::new(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    ProcessRecord::new(
                        200 + i as u32,
                        Some(1),
                        vec!["bash".into(), "-is".into(), format!("mininet:{}", n)],
                    )
                })
                .collect(),
            Some(9999),
        );

        let runner = Arc::new(runner);
        let sink = Arc::new(RecordingSink::new());
        let clock = ManualTimeProvider::new(0);
        let resolver = Arc::new(
            NamespaceResolver::new(Arc::new(StaticScanner::new(snapshot)), &config).unwrap(),
        );
        let executor = Arc::new(RemoteExecutor::new(
            runner.clone(),
            Arc::new(MockTerminal::new()),
            &config,
        ));
        let probes = Arc::new(NodeProbes::new(
            resolver.clone(),
            executor.clone(),
            config.probe.clone(),
        ));
        let orchestrator = Orchestrator::new(
            config,
            resolver,
            executor,
            probes,
            sink.clone(),
            Arc::new(clock.clone()),
        );

        Harness {
            orchestrator,
            runner,
            sink,
            clock,
        }
    }

    fn node(name: &str) -> NodeName {
        NodeName::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_reset_skips_optional_steps() {
        let h = harness(ScriptedRunner::new());

        h.orchestrator
            .reset(ResetOptions {
                flush_iptables: false,
                restore_sysctl: false,
            })
            .await;

        assert!(h.runner.calls_matching("iptables").is_empty());
        assert!(h.runner.calls_matching("sysctl").is_empty());
        assert_eq!(h.runner.calls_matching("mn -c").len(), 1);
        assert_eq!(h.runner.calls_matching("pkill -9 -f '[w]ebserver.py'").len(), 1);
        let steps: Vec<ReportEvent> = h
            .sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, ReportEvent::Step(..)))
            .collect();
        assert_eq!(steps.len(), 7);
        assert_eq!(
            steps.last(),
            Some(&ReportEvent::Step(7, 7, "Done. System is clean.".into()))
        );
    }

    #[tokio::test]
    async fn test_start_hands_over_launcher() {
        let h = harness(ScriptedRunner::new());

        let result = h
            .orchestrator
            .start(StartOptions {
                reset: None,
                sleep_secs: 3,
                rogue: true,
            })
            .await;

        assert_eq!(result.exit_code, Some(0));
        assert_eq!(
            h.runner.calls(),
            vec!["/bin/sh -lc python3 bgp.py --sleep 3 --rogue".to_string()]
        );
    }

    #[tokio::test]
    async fn test_verify_retries_after_settle() {
        // no listeners anywhere: every round fails
        let h = harness(ScriptedRunner::new().respond("tail -n", "log line"));

        let verdict = h
            .orchestrator
            .verify(VerifyOptions {
                routers: vec![node("R1"), node("R2")],
                port: 179,
                tail_lines: 10,
                settle: Duration::from_secs(2),
                retries: 2,
            })
            .await;

        assert!(!verdict.passed);
        assert_eq!(verdict.results.len(), 4);
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2); 3]);
        assert_eq!(h.sink.verdicts().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_passes_without_retry() {
        let h = harness(
            ScriptedRunner::new()
                .respond("ss -tnl", "LISTEN 0 4096 0.0.0.0:179 0.0.0.0:*")
                .respond("tail -n", "bgpd started"),
        );

        let verdict = h
            .orchestrator
            .verify(VerifyOptions {
                routers: vec![node("R1")],
                port: 179,
                tail_lines: 10,
                settle: Duration::ZERO,
                retries: 3,
            })
            .await;

        assert!(verdict.passed);
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_attack_hard_mode_checks_every_host() {
        let h = harness(
            ScriptedRunner::new()
                .respond("[w]ebserver.py", "root 9 python3 webserver.py")
                .respond("ss -tnl", "LISTEN 0 4096 0.0.0.0:179 0.0.0.0:*")
                .respond("grep -E '[z]ebra'", "root 5 zebra")
                .respond("grep -E '[b]gpd'", "root 6 bgpd")
                .respond("vtysh", "9.0.7.2 4 6 10 12 0 0 0 00:01:02 3")
                .respond("curl", "*** Attacker web server (AS6) ***")
                .respond("tail -n", "bgpd log"),
        );

        let verdict = h
            .orchestrator
            .attack(AttackOptions {
                start_attacker: true,
                hard: true,
                only_hard: false,
                wait: Duration::from_secs(10),
            })
            .await;

        // origin host sees the attacker page, so the hard round fails
        assert!(!verdict.passed);
        let failed: Vec<&str> = verdict.failures().map(|r| r.node.as_str()).collect();
        assert_eq!(failed, vec!["h1-1"]);
        assert_eq!(h.runner.calls_matching("[b]gpd-R6").len(), 1);
        assert_eq!(h.runner.calls_matching("bgpd-R6-hard.conf").len(), 1);
        // web server already running: not started again
        assert!(h.runner.calls_matching("--text").is_empty());
        assert_eq!(h.clock.sleeps().len(), 2);
        // one summary per observer router, reused for the session check
        assert_eq!(h.runner.calls_matching("vtysh -c").len(), 3);
    }

    #[tokio::test]
    async fn test_attack_requires_both_daemons() {
        let h = harness(
            ScriptedRunner::new()
                .respond("[w]ebserver.py", "root 9 python3 webserver.py")
                .respond("ss -tnl", "LISTEN 0 4096 0.0.0.0:179 0.0.0.0:*")
                .respond("grep -E '[z]ebra'", "root 5 zebra")
                .respond("vtysh", "9.0.7.2 4 6 10 12 0 0 0 00:01:02 3")
                .respond("curl", "*** Attacker web server (AS6) ***")
                .respond("tail -n", "bgpd log"),
        );

        let verdict = h
            .orchestrator
            .attack(AttackOptions {
                start_attacker: false,
                hard: false,
                only_hard: false,
                wait: Duration::from_secs(1),
            })
            .await;

        assert!(!verdict.passed);
        let failed: Vec<&str> = verdict.failures().map(|r| r.signal.as_str()).collect();
        assert_eq!(failed, vec!["process:bgpd"]);
    }

    #[tokio::test]
    async fn test_exec_unknown_node() {
        let h = harness(ScriptedRunner::new());

        let result = h
            .orchestrator
            .exec(&node("R42"), "true", ExecMode::Capture)
            .await;

        assert_eq!(
            result,
            Err(AppError::Resolve(ResolveError::NotFound(node("R42"))))
        );
    }
}
