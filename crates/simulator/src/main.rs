//! PoS Security Simulator
//!
//! Main entry point for the proof-of-stake security simulator.
//! Validators and users join over TCP; an orchestrator runs one consensus
//! round per time slot under the selected governance and attack model.

use anyhow::{Context, Result};
use clap::Parser;
use pos_consensus::{OrchestratorBuilder, Registry, SimulationConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod report;
mod session;

use config::{AttackArg, GovernanceArg, Population, RunType, SimulatorConfig};
use session::Session;

/// Proof-of-stake security simulator
#[derive(Parser, Debug)]
#[command(name = "pos-sim")]
#[command(about = "Simulate PoS consensus under malicious validators and balance attacks", long_about = None)]
struct Args {
    /// Populate the network automatically or wait for manual connections
    #[arg(long, value_enum, env = "POS_RUN_TYPE", default_value = "auto")]
    run_type: RunType,

    /// TCP port agents connect to
    #[arg(long, env = "PORT", default_value = "9000")]
    port: u16,

    /// Validators created in auto runs
    #[arg(long, env = "POS_VALIDATORS", default_value = "10")]
    validators: usize,

    /// Users created in auto runs
    #[arg(long, env = "POS_USERS", default_value = "3")]
    users: usize,

    /// How many of the auto validators are malicious
    #[arg(long, env = "POS_MALICIOUS", default_value = "7")]
    malicious: usize,

    /// Stake-weighted committee size
    #[arg(long, env = "POS_COMMITTEE_SIZE", default_value = "4")]
    committee_size: usize,

    /// Number of elected delegates (reputation governance)
    #[arg(long, env = "POS_DELEGATE_SIZE", default_value = "3")]
    delegate_size: usize,

    /// Governance variant (pos, slashing, reputation)
    #[arg(long, value_enum, env = "POS_GOVERNANCE", default_value = "pos")]
    governance: GovernanceArg,

    /// Attack model (none, balance, network-partition)
    #[arg(long, value_enum, env = "POS_ATTACK", default_value = "none")]
    attack: AttackArg,

    /// Time slot length in milliseconds
    #[arg(long, env = "POS_SLOT_MS", default_value = "5000")]
    slot_ms: u64,

    /// Rounds between longest-chain reconciliations
    #[arg(long, env = "POS_RECONCILE_INTERVAL", default_value = "5")]
    reconcile_interval: u64,

    /// Give up on a vote after this many milliseconds (waits forever if unset)
    #[arg(long, env = "POS_VOTE_TIMEOUT_MS")]
    vote_timeout_ms: Option<u64>,

    /// Interval between transfers generated by auto users
    #[arg(long, env = "POS_TX_INTERVAL_MS", default_value = "2000")]
    tx_interval_ms: u64,

    /// Seed for reproducible committee and proposer draws
    #[arg(long, env = "POS_SEED")]
    seed: Option<u64>,

    /// Log each round report as JSON
    #[arg(long)]
    json_reports: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> SimulatorConfig {
        SimulatorConfig {
            run_type: self.run_type,
            port: self.port,
            population: Population {
                validators: self.validators,
                users: self.users,
                malicious: self.malicious,
            },
            tx_interval_ms: self.tx_interval_ms,
            json_reports: self.json_reports,
            simulation: SimulationConfig {
                slot_ms: self.slot_ms,
                reconcile_interval: self.reconcile_interval,
                committee_size: self.committee_size,
                delegate_size: self.delegate_size,
                governance: self.governance.into(),
                attack: self.attack.into(),
                vote_timeout_ms: self.vote_timeout_ms,
                seed: self.seed,
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.into_config();
    config.validate()?;
    run(config).await
}

async fn run(config: SimulatorConfig) -> Result<()> {
    let sim = &config.simulation;
    tracing::info!("Starting PoS security simulator");
    tracing::info!("  Run type: {:?}", config.run_type);
    tracing::info!("  Governance: {:?}", sim.governance);
    tracing::info!("  Attack: {:?}", sim.attack);
    tracing::info!(
        "  Committee size: {}, delegate size: {}",
        sim.committee_size,
        sim.delegate_size
    );
    tracing::info!("  Time slot: {}ms", sim.slot_ms);

    let registry = Arc::new(Registry::new());
    let orchestrator = OrchestratorBuilder::new(registry.clone())
        .config(sim.clone())
        .build()?;
    let genesis = orchestrator.chain().chain(0)[..1].to_vec();

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("TCP server listening on port {}", local_addr.port());

    let session = Arc::new(Session::new(
        registry.clone(),
        genesis,
        sim.clone(),
        config.run_type,
        config.tx_interval(),
    ));
    let server = tokio::spawn(session.serve(listener));

    let reporter = tokio::spawn(report::run_reporter(
        orchestrator.subscribe(),
        config.json_reports,
    ));

    if config.run_type == RunType::Auto {
        let loopback = SocketAddr::from(([127, 0, 0, 1], local_addr.port()));
        session::populate(loopback, config.population).await?;
    }

    let rounds = tokio::spawn(orchestrator.run());

    tracing::info!("Simulation running. Press Ctrl+C to stop.");

    tokio::select! {
        result = server => {
            match result {
                Ok(Err(e)) => return Err(e.context("accept loop failed")),
                Err(e) => return Err(e.into()),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        }
    }

    rounds.abort();
    reporter.abort();
    tracing::info!(
        "Simulator stopped with {} validators and {} users",
        registry.validators.len(),
        registry.users.len()
    );

    Ok(())
}
