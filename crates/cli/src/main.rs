//! hijacklab - BGP hijack testbed control tool
//!
//! Composition root: loads configuration, wires the system adapters into
//! the core services and runs one operation to completion.

mod logging;
mod output;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use hijacklab_core::application::constants::{
    DEFAULT_SETTLE_DELAY, DEFAULT_START_SLEEP_SECS, DEFAULT_TAIL_LINES, INTERRUPTED_EXIT_CODE,
};
use hijacklab_core::application::{
    interrupt_channel, AttackOptions, HandoverFlag, InterruptSender, NamespaceResolver, NodeProbes,
    Orchestrator, RemoteExecutor, ResetOptions, StartOptions, TerminalGuard, VerifyOptions,
};
use hijacklab_core::domain::{ExecMode, LabConfig, NodeName, VerificationVerdict};
use hijacklab_core::port::time_provider::SystemTimeProvider;
use hijacklab_core::port::TerminalControl;
use hijacklab_infra_system::{SysinfoProcessScanner, TokioCommandRunner, TtyTerminal};

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "hijacklab")]
#[command(about = "Control tool for the BGP prefix-hijack testbed", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "HIJACKLAB_CONFIG")]
    config: Option<String>,

    /// Report style
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Rich)]
    format: OutputFormat,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Bound for every capture-mode command, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List running nodes and their pids
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run a command inside a node
    Exec {
        /// Node name (e.g. R6, h5-1)
        #[arg(short, long)]
        node: NodeName,

        /// Hand the terminal over (vtysh, shells)
        #[arg(short, long)]
        interactive: bool,

        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Tear down daemons, emulator state and host settings
    Reset {
        /// Keep iptables rules
        #[arg(long)]
        no_iptables: bool,

        /// Keep current sysctl values
        #[arg(long)]
        no_sysctl: bool,
    },

    /// Reset and launch the topology console
    Start {
        /// Skip the reset
        #[arg(long)]
        no_reset: bool,

        /// Seconds the launcher waits for sysctl changes
        #[arg(long, default_value_t = DEFAULT_START_SLEEP_SECS)]
        sleep: u64,

        /// Start with the rogue AS enabled
        #[arg(long)]
        rogue: bool,
    },

    /// Check listeners and daemon logs on routers
    Verify {
        /// Routers to check (default: all configured routers)
        #[arg(long, value_delimiter = ',')]
        routers: Vec<NodeName>,

        /// Expected listening port (default: configured BGP port)
        #[arg(long)]
        port: Option<u16>,

        /// Log lines to read per router
        #[arg(long, default_value_t = DEFAULT_TAIL_LINES)]
        tail: usize,

        /// Seconds to wait before each verification round
        #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY.as_secs())]
        settle: u64,

        /// Extra rounds when a round fails
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },

    /// Inject the hijack and check where traffic goes
    Attack {
        /// Only check, do not start attacker daemons or web server
        #[arg(long)]
        no_start: bool,

        /// Also run the hard (more specific) attack
        #[arg(long)]
        hard: bool,

        /// Go straight to the hard attack
        #[arg(long)]
        only_hard: bool,

        /// Seconds to wait for BGP convergence
        #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY.as_secs())]
        wait: u64,
    },

    /// Check that every attacker-side component is up
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => return fatal(e),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")
    {
        Ok(runtime) => runtime,
        Err(e) => return fatal(e),
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => fatal(e),
    }
}

fn fatal(error: anyhow::Error) -> ExitCode {
    eprintln!("{} {:#}", "error:".red().bold(), error);
    ExitCode::FAILURE
}

fn verdict_code(verdict: &VerificationVerdict) -> ExitCode {
    if verdict.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Forward Ctrl-C as an interrupt unless a console owns the terminal
fn spawn_interrupt_listener(sender: InterruptSender, handover: HandoverFlag) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if handover.is_active() {
                debug!("Ctrl-C delivered to the attached console");
                continue;
            }
            sender.interrupt();
            return;
        }
    });
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // restored on every way out of this function, interrupts included
    let terminal: Arc<dyn TerminalControl> = Arc::new(TtyTerminal::new());
    let terminal_guard = TerminalGuard::save(terminal.clone());
    if terminal_guard.saved().is_none() {
        debug!("stdin is not a terminal, only defaults will be reset on exit");
    }

    let mut config: LabConfig = settings::load(cli.config.as_deref())?;
    if let Some(timeout) = cli.timeout {
        config.probe.timeout_secs = timeout;
        config.validate().context("Invalid --timeout")?;
    }
    info!(version = hijacklab_core::VERSION, "hijacklab starting");

    // DI wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let resolver = Arc::new(
        NamespaceResolver::new(Arc::new(SysinfoProcessScanner::new()), &config)
            .context("Invalid node tag prefix")?,
    );
    let executor = Arc::new(RemoteExecutor::new(
        Arc::new(TokioCommandRunner::new(time_provider.clone())),
        terminal.clone(),
        &config,
    ));
    let probes = Arc::new(NodeProbes::new(
        resolver.clone(),
        executor.clone(),
        config.probe.clone(),
    ));
    let orchestrator = Orchestrator::new(
        config.clone(),
        resolver.clone(),
        executor.clone(),
        probes,
        cli.format.sink(),
        time_provider,
    );

    let (interrupt_tx, mut interrupt) = interrupt_channel();
    spawn_interrupt_listener(interrupt_tx, executor.handover_flag());

    tokio::select! {
        outcome = dispatch(&orchestrator, &resolver, &config, cli.command) => outcome,
        _ = interrupt.wait() => {
            // the dropped operation has already killed its children
            drop(terminal_guard);
            eprintln!("{}", "interrupted".yellow());
            Ok(ExitCode::from(INTERRUPTED_EXIT_CODE))
        }
    }
}

async fn dispatch(
    orchestrator: &Orchestrator,
    resolver: &NamespaceResolver,
    config: &LabConfig,
    command: Commands,
) -> Result<ExitCode> {
    match command {
        Commands::List { json } => {
            if json {
                let nodes = resolver.try_list().context("Cannot read process table")?;
                let contexts: Vec<_> = nodes.values().collect();
                println!("{}", serde_json::to_string_pretty(&contexts)?);
            } else {
                orchestrator.list().context("Cannot read process table")?;
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Exec {
            node,
            interactive,
            command,
        } => {
            let mode = if interactive {
                ExecMode::Interactive
            } else {
                ExecMode::Capture
            };
            let result = orchestrator.exec(&node, &command.join(" "), mode).await?;

            if mode == ExecMode::Capture {
                if !result.stdout.is_empty() {
                    println!("{}", result.stdout);
                }
                if !result.stderr.is_empty() {
                    eprintln!("{}", result.stderr);
                }
            }
            Ok(match result.exit_code {
                Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
                None => ExitCode::FAILURE,
            })
        }

        Commands::Reset {
            no_iptables,
            no_sysctl,
        } => {
            orchestrator
                .reset(ResetOptions {
                    flush_iptables: !no_iptables,
                    restore_sysctl: !no_sysctl,
                })
                .await;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Start {
            no_reset,
            sleep,
            rogue,
        } => {
            let result = orchestrator
                .start(StartOptions {
                    reset: (!no_reset).then(ResetOptions::default),
                    sleep_secs: sleep,
                    rogue,
                })
                .await;
            Ok(if result.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Verify {
            routers,
            port,
            tail,
            settle,
            retries,
        } => {
            let routers = if routers.is_empty() {
                config.topology.routers.clone()
            } else {
                routers
            };
            let verdict = orchestrator
                .verify(VerifyOptions {
                    routers,
                    port: port.unwrap_or(config.topology.bgp_port),
                    tail_lines: tail,
                    settle: Duration::from_secs(settle),
                    retries,
                })
                .await;
            Ok(verdict_code(&verdict))
        }

        Commands::Attack {
            no_start,
            hard,
            only_hard,
            wait,
        } => {
            let verdict = orchestrator
                .attack(AttackOptions {
                    start_attacker: !no_start,
                    hard,
                    only_hard,
                    wait: Duration::from_secs(wait.max(1)),
                })
                .await;
            Ok(verdict_code(&verdict))
        }

        Commands::Check => {
            let verdict = orchestrator.check().await;
            Ok(verdict_code(&verdict))
        }
    }
}
