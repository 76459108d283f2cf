//! Simulator Configuration

use clap::ValueEnum;
use pos_consensus::{AttackMode, GovernanceKind, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the network gets populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunType {
    /// Dial the configured validators and users over loopback at startup
    Auto,
    /// Wait for agents to connect and answer the handshake themselves
    Manual,
}

/// Governance selector accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GovernanceArg {
    /// Stake-weighted committee with slashing
    #[value(alias = "slashing")]
    Pos,
    /// Elected delegates with reputation
    Reputation,
}

impl From<GovernanceArg> for GovernanceKind {
    fn from(arg: GovernanceArg) -> Self {
        match arg {
            GovernanceArg::Pos => GovernanceKind::Pos,
            GovernanceArg::Reputation => GovernanceKind::Reputation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AttackArg {
    None,
    Balance,
    #[value(alias = "network_partition")]
    NetworkPartition,
}

impl From<AttackArg> for AttackMode {
    fn from(arg: AttackArg) -> Self {
        match arg {
            AttackArg::None => AttackMode::None,
            AttackArg::Balance => AttackMode::Balance,
            AttackArg::NetworkPartition => AttackMode::NetworkPartition,
        }
    }
}

/// Agents created in auto runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
    pub validators: usize,
    pub users: usize,
    /// The first `malicious` validators dialed are malicious
    pub malicious: usize,
}

impl Default for Population {
    fn default() -> Self {
        Self {
            validators: 10,
            users: 3,
            malicious: 7,
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub run_type: RunType,
    /// TCP port agents connect to
    pub port: u16,
    pub population: Population,
    /// Interval between generated transfers of auto users
    pub tx_interval_ms: u64,
    /// Log every round report as a JSON line
    pub json_reports: bool,
    pub simulation: SimulationConfig,
}

impl SimulatorConfig {
    pub fn tx_interval(&self) -> Duration {
        Duration::from_millis(self.tx_interval_ms)
    }

    /// Reject configurations the simulation cannot run
    pub fn validate(&self) -> anyhow::Result<()> {
        let population = &self.population;
        if population.malicious > population.validators {
            anyhow::bail!(
                "malicious count {} exceeds validator count {}",
                population.malicious,
                population.validators
            );
        }
        if self.simulation.slot_ms == 0 {
            anyhow::bail!("slot interval must be positive");
        }
        if self.run_type == RunType::Auto && self.tx_interval_ms == 0 {
            anyhow::bail!("transaction interval must be positive");
        }
        if self.simulation.committee_size == 0 || self.simulation.delegate_size == 0 {
            anyhow::bail!("committee and delegate sizes must be positive");
        }
        Ok(())
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            run_type: RunType::Auto,
            port: 9000,
            population: Population::default(),
            tx_interval_ms: 2_000,
            json_reports: false,
            simulation: SimulationConfig::default(),
        }
    }
}
