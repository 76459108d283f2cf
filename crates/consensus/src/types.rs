//! Core types for agent messaging and simulation configuration

use pos_ledger::{Block, PoolSnapshot, Transaction, MAX_TXS_PER_BLOCK};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Fork information handed to committee members in balance-attack runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkContext {
    /// Lengths of fork 0 and fork 1
    pub lengths: [usize; 2],
    /// Fork the proposer is extending
    pub proposer_view: usize,
}

/// Orchestrator asking a committee member to validate a candidate block
#[derive(Debug, Clone)]
pub struct ValidateBlockMessage {
    /// Round the vote belongs to, echoed in the reply
    pub round: u64,
    /// Block under vote
    pub candidate: Block,
    /// Tip of the chain the member currently treats as canonical
    pub reference: Block,
    /// Present only when the chain is forked
    pub forks: Option<ForkContext>,
}

/// A committee member's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationStatusMessage {
    pub round: u64,
    pub is_valid: bool,
}

/// Block accepted by the committee, sent to every validator
#[derive(Debug, Clone)]
pub struct VerifiedBlockMessage {
    pub transactions: Vec<Transaction>,
    pub block: Block,
}

/// Longest-chain reconciliation payload
#[derive(Debug, Clone)]
pub struct ConsensusMessage {
    pub chain: Vec<Block>,
    pub unconfirmed: BTreeMap<u64, Transaction>,
    pub confirmed: BTreeMap<u64, bool>,
}

impl ConsensusMessage {
    pub fn new(chain: Vec<Block>, pool: PoolSnapshot) -> Self {
        Self {
            chain,
            unconfirmed: pool.unconfirmed,
            confirmed: pool.confirmed,
        }
    }

    pub fn pool(&self) -> PoolSnapshot {
        PoolSnapshot {
            unconfirmed: self.unconfirmed.clone(),
            confirmed: self.confirmed.clone(),
        }
    }
}

/// A validator as seen by a delegate voter
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateInfo {
    pub address: String,
    pub reputation: f64,
    pub malicious: bool,
}

/// Request for a delegate ballot
#[derive(Debug, Clone)]
pub struct DelegateVoteRequestMessage {
    /// Election the ballot answers
    pub election: u64,
    /// Number of delegates being elected
    pub delegate_count: usize,
    /// Every registered validator at request time
    pub candidates: Vec<CandidateInfo>,
}

/// Ranked ballot of candidate addresses
#[derive(Debug, Clone, Default)]
pub struct DelegateVoteMessage {
    pub election: u64,
    pub votes: Vec<String>,
}

/// Messages exchanged on a validator's inbound and outbound channels
#[derive(Debug, Clone)]
pub enum AgentMessage {
    /// Orchestrator asking for a vote
    ValidateBlock(ValidateBlockMessage),
    /// Validator's vote
    ValidationStatus(ValidationStatusMessage),
    /// Committee accepted a block
    VerifiedBlock(VerifiedBlockMessage),
    /// Adopt the reconciled chain and pool
    Consensus(ConsensusMessage),
}

impl AgentMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::ValidateBlock(_) => "ValidateBlock",
            AgentMessage::ValidationStatus(_) => "ValidationStatus",
            AgentMessage::VerifiedBlock(_) => "VerifiedBlock",
            AgentMessage::Consensus(_) => "Consensus",
        }
    }
}

/// Governance variant driving selection and economics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GovernanceKind {
    /// Stake-weighted committee and proposer, slashing on dissent
    Pos,
    /// Elected delegates rotate as proposer, reputation-weighted economics
    Reputation,
}

/// Attack model selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttackMode {
    None,
    /// Two parallel forks with split validator views
    Balance,
    /// Accepted but not modelled; runs the canonical chain
    NetworkPartition,
}

/// Configuration for a simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time slot length in milliseconds
    pub slot_ms: u64,
    /// Rounds between longest-chain reconciliations
    pub reconcile_interval: u64,
    /// Stake-weighted committee size
    pub committee_size: usize,
    /// Number of elected delegates
    pub delegate_size: usize,
    pub governance: GovernanceKind,
    pub attack: AttackMode,
    /// Stake given to every new validator
    pub initial_stake: f64,
    /// Reputation given to every new validator
    pub initial_reputation: f64,
    /// Balance given to every new user
    pub initial_balance: f64,
    /// Bound on each vote receive; `None` blocks until the member answers
    pub vote_timeout_ms: Option<u64>,
    pub max_txs_per_block: usize,
    /// Seed for reproducible selection
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn slot_duration(&self) -> Duration {
        Duration::from_millis(self.slot_ms)
    }

    pub fn vote_timeout(&self) -> Option<Duration> {
        self.vote_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            slot_ms: 5_000,
            reconcile_interval: 5,
            committee_size: 4,
            delegate_size: 3,
            governance: GovernanceKind::Pos,
            attack: AttackMode::None,
            initial_stake: 100.0,
            initial_reputation: 5.0,
            initial_balance: 100.0,
            vote_timeout_ms: None,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            seed: None,
        }
    }
}
