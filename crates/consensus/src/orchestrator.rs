//! Round orchestrator - advances time slots and drives consensus rounds
//!
//! The orchestrator owns the `SimulationContext` and is the only writer of
//! the global chain and of validator stake and reputation. Agents only read
//! what they are sent and reply on their own channels.

use crate::agent::Validator;
use crate::economics::{
    apply_dissent_penalties, reward_proposer, settle_transactions, slash_proposer,
};
use crate::error::{ConsensusError, ConsensusResult};
use crate::fork::ChainState;
use crate::governance::{BalanceAttackGovernance, Governance, ReputationGovernance, StakeGovernance};
use crate::reconcile::longest_chain_consensus;
use crate::registry::Registry;
use crate::types::{
    AgentMessage, AttackMode, ForkContext, GovernanceKind, SimulationConfig, ValidateBlockMessage,
    VerifiedBlockMessage,
};
use crate::voting::{broadcast_candidate, collect_votes, is_block_valid};
use pos_ledger::{assemble_block, Block};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// State shared by every step of a round
pub struct SimulationContext {
    pub registry: Arc<Registry>,
    pub chain: ChainState,
    pub config: SimulationConfig,
    pub rng: StdRng,
    /// Rounds started so far
    pub round: u64,
    /// Rounds since the last reconciliation
    pub reconcile_counter: u64,
}

impl SimulationContext {
    pub fn new(registry: Arc<Registry>, chain: ChainState, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            registry,
            chain,
            config,
            rng,
            round: 0,
            reconcile_counter: 0,
        }
    }
}

/// Why a round ended without a vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    EmptyCommittee,
    NoProposer,
    BlockAssembly(String),
}

/// Result of a round that reached a vote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub proposer: String,
    pub block_index: u64,
    /// Fork the block was proposed on
    pub fork: usize,
    pub committee_size: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub is_valid: bool,
    /// Transactions settled when the block was accepted
    pub settled: usize,
    /// Members slashed for voting against the decision
    pub slashed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    Skipped(SkipReason),
    Decided(Decision),
}

/// Read-only view of one validator for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatorSummary {
    pub address: String,
    pub malicious: bool,
    pub stake: f64,
    pub reputation: f64,
    pub view: usize,
    pub committee_count: u64,
    pub proposer_count: u64,
    pub block_success_count: u64,
    pub chain_len: usize,
}

impl ValidatorSummary {
    fn of(validator: &Validator) -> Self {
        let state = validator.snapshot();
        Self {
            address: validator.address().to_string(),
            malicious: validator.is_malicious(),
            stake: state.stake,
            reputation: state.reputation,
            view: state.view,
            committee_count: state.committee_count,
            proposer_count: state.proposer_count,
            block_success_count: state.block_success_count,
            chain_len: validator.chain_len(),
        }
    }
}

/// Counters across the whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsensusStats {
    pub rounds: u64,
    pub blocks_accepted: u64,
    pub blocks_rejected: u64,
    pub rounds_skipped: u64,
    pub reconciliations: u64,
}

/// Snapshot published after every round
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round: u64,
    pub governance: &'static str,
    pub outcome: RoundOutcome,
    /// Transaction ids per block, one entry per fork
    pub chains: Vec<Vec<Vec<u64>>>,
    pub validators: Vec<ValidatorSummary>,
    pub users: Vec<(String, f64)>,
    pub stats: ConsensusStats,
}

/// Drives consensus rounds for one governance variant
pub struct Orchestrator {
    ctx: SimulationContext,
    governance: Box<dyn Governance>,
    reports: broadcast::Sender<RoundReport>,
    stats: ConsensusStats,
}

impl Orchestrator {
    pub fn new(ctx: SimulationContext, governance: Box<dyn Governance>) -> Self {
        let (reports, _) = broadcast::channel(64);
        Self {
            ctx,
            governance,
            reports,
            stats: ConsensusStats::default(),
        }
    }

    /// Subscribe to round reports
    pub fn subscribe(&self) -> broadcast::Receiver<RoundReport> {
        self.reports.subscribe()
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn chain(&self) -> &ChainState {
        &self.ctx.chain
    }

    pub fn stats(&self) -> &ConsensusStats {
        &self.stats
    }

    /// Advance time slots forever
    pub async fn run(mut self) {
        let slot = self.ctx.config.slot_duration();
        let mut interval = tokio::time::interval(slot);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; a round starts after one full slot
        interval.tick().await;

        tracing::info!(
            "Orchestrator started ({} governance, {}ms slots)",
            self.governance.name(),
            slot.as_millis()
        );

        loop {
            interval.tick().await;
            tracing::info!("Time slot {} started", self.ctx.round + 1);
            if let Err(e) = self.run_round().await {
                tracing::error!("Round {} failed: {}", self.ctx.round, e);
            }
        }
    }

    /// Run one full round and publish its report
    pub async fn run_round(&mut self) -> ConsensusResult<RoundReport> {
        self.ctx.round += 1;
        self.stats.rounds += 1;
        self.ctx.reconcile_counter += 1;

        if self.ctx.reconcile_counter >= self.ctx.config.reconcile_interval {
            self.ctx.reconcile_counter = 0;
            let validators = self.ctx.registry.validators.snapshot();
            if longest_chain_consensus(&validators, &mut self.ctx.chain).is_some() {
                self.stats.reconciliations += 1;
            }
        }

        let outcome = self.consensus_round().await?;
        match &outcome {
            RoundOutcome::Skipped(reason) => {
                self.stats.rounds_skipped += 1;
                tracing::debug!("Round {} skipped: {:?}", self.ctx.round, reason);
            }
            RoundOutcome::Decided(decision) if decision.is_valid => self.stats.blocks_accepted += 1,
            RoundOutcome::Decided(_) => self.stats.blocks_rejected += 1,
        }

        let report = self.report(outcome);
        // No subscribers is fine
        let _ = self.reports.send(report.clone());
        Ok(report)
    }

    async fn consensus_round(&mut self) -> ConsensusResult<RoundOutcome> {
        self.governance.prepare_round(&mut self.ctx);

        let committee = self.governance.select_committee(&mut self.ctx).await;
        if committee.is_empty() {
            return Ok(RoundOutcome::Skipped(SkipReason::EmptyCommittee));
        }
        for member in &committee {
            member.state().committee_count += 1;
        }
        tracing::info!("New validation committee chosen ({} members)", committee.len());

        let Some(proposer) = self.governance.select_proposer(&mut self.ctx, &committee) else {
            return Ok(RoundOutcome::Skipped(SkipReason::NoProposer));
        };
        proposer.state().proposer_count += 1;
        tracing::info!("Proposer {} chosen as new block proposer", proposer.short_id());

        let forked = self.ctx.chain.is_forked();
        let fork = if forked {
            self.governance.choose_fork(&self.ctx, &proposer).min(1)
        } else {
            0
        };

        let parent = self.ctx.chain.tip(fork).clone();
        let assembled = {
            let pool = proposer.pool();
            assemble_block(
                &parent,
                proposer.address(),
                &pool,
                self.ctx.config.max_txs_per_block,
            )
        };
        let candidate = match assembled {
            Ok(block) => block,
            Err(e) => {
                tracing::info!("Proposer {} produced no block: {}", proposer.short_id(), e);
                return Ok(RoundOutcome::Skipped(SkipReason::BlockAssembly(e.to_string())));
            }
        };
        tracing::info!("Block {} chosen as new block", candidate.index);

        let lengths = self.ctx.chain.lengths();
        let chain = &self.ctx.chain;
        let round = self.ctx.round;
        let reached = broadcast_candidate(&committee, |member| ValidateBlockMessage {
            round,
            candidate: candidate.clone(),
            reference: chain.tip(if forked { member.view() } else { 0 }).clone(),
            forks: forked.then_some(ForkContext {
                lengths,
                proposer_view: fork,
            }),
        });

        let tally = collect_votes(&reached, round, self.ctx.config.vote_timeout()).await;
        tracing::info!(
            "Voting results: valid {}, invalid {}, committee size {}",
            tally.valid,
            tally.invalid,
            committee.len()
        );
        // An approved block that no longer links counts as rejected
        let is_valid =
            is_block_valid(tally.valid, committee.len()) && self.commit_block(fork, &candidate);

        let policy = self.governance.policy();
        let mut settled = 0;
        if is_valid {
            reward_proposer(&proposer, &policy);

            let verified = VerifiedBlockMessage {
                transactions: candidate.transactions.clone(),
                block: candidate.clone(),
            };
            for validator in self.ctx.registry.validators.snapshot() {
                if let Err(e) = validator.send(AgentMessage::VerifiedBlock(verified.clone())) {
                    tracing::warn!("Verified block not delivered: {}", e);
                }
            }

            settled = settle_transactions(&candidate, &proposer, &self.ctx.registry.users);
            tracing::info!("Valid block {} added to fork {}", candidate.index, fork);
        } else {
            slash_proposer(&proposer, &policy);
            tracing::info!("Committee votes block {} invalid", candidate.index);
        }

        let slashed = apply_dissent_penalties(&committee, &tally.votes, is_valid, &policy);
        for address in &slashed {
            tracing::debug!("Slashed dissenting validator {}", address);
        }

        Ok(RoundOutcome::Decided(Decision {
            proposer: proposer.address().to_string(),
            block_index: candidate.index,
            fork,
            committee_size: committee.len(),
            valid_count: tally.valid,
            invalid_count: tally.invalid,
            is_valid,
            settled,
            slashed,
        }))
    }

    /// Append an approved block to `fork`, returning whether it linked
    pub(crate) fn commit_block(&mut self, fork: usize, block: &Block) -> bool {
        match self.ctx.chain.append(fork, block.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Block {} not added to fork {}: {}", block.index, fork, e);
                false
            }
        }
    }

    fn report(&self, outcome: RoundOutcome) -> RoundReport {
        let forks = if self.ctx.chain.is_forked() { 2 } else { 1 };
        let chains = (0..forks)
            .map(|fork| {
                self.ctx
                    .chain
                    .chain(fork)
                    .iter()
                    .map(|block| block.transaction_ids())
                    .collect()
            })
            .collect();

        RoundReport {
            round: self.ctx.round,
            governance: self.governance.name(),
            outcome,
            chains,
            validators: self
                .ctx
                .registry
                .validators
                .snapshot()
                .iter()
                .map(|v| ValidatorSummary::of(v))
                .collect(),
            users: self.ctx.registry.users.balances(),
            stats: self.stats.clone(),
        }
    }
}

/// Builder for Orchestrator
pub struct OrchestratorBuilder {
    registry: Arc<Registry>,
    config: SimulationConfig,
    chain: Option<ChainState>,
    governance: Option<Box<dyn Governance>>,
}

impl OrchestratorBuilder {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            config: SimulationConfig::default(),
            chain: None,
            governance: None,
        }
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from an existing chain instead of a fresh genesis
    pub fn chain(mut self, chain: ChainState) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Override the governance picked from the configuration
    pub fn governance(mut self, governance: Box<dyn Governance>) -> Self {
        self.governance = Some(governance);
        self
    }

    pub fn build(self) -> ConsensusResult<Orchestrator> {
        validate_config(&self.config)?;

        let chain = self.chain.unwrap_or_else(|| initial_chain(self.config.attack));
        let governance = self
            .governance
            .unwrap_or_else(|| governance_for(&self.config));
        let ctx = SimulationContext::new(self.registry, chain, self.config);
        Ok(Orchestrator::new(ctx, governance))
    }
}

/// Chain representation for an attack mode
pub fn initial_chain(attack: AttackMode) -> ChainState {
    match attack {
        AttackMode::Balance => ChainState::forked(),
        AttackMode::None | AttackMode::NetworkPartition => ChainState::certified(),
    }
}

/// Governance variant for a configuration; the balance attack overrides governance
pub fn governance_for(config: &SimulationConfig) -> Box<dyn Governance> {
    match (config.attack, config.governance) {
        (AttackMode::Balance, _) => Box::new(BalanceAttackGovernance::new()),
        (_, GovernanceKind::Pos) => Box::new(StakeGovernance),
        (_, GovernanceKind::Reputation) => Box::new(ReputationGovernance::new(config.delegate_size)),
    }
}

fn validate_config(config: &SimulationConfig) -> ConsensusResult<()> {
    if config.committee_size == 0 {
        return Err(ConsensusError::InvalidConfig("committee size must be positive".into()));
    }
    if config.delegate_size == 0 {
        return Err(ConsensusError::InvalidConfig("delegate size must be positive".into()));
    }
    if config.reconcile_interval == 0 {
        return Err(ConsensusError::InvalidConfig("reconcile interval must be positive".into()));
    }
    if config.max_txs_per_block == 0 {
        return Err(ConsensusError::InvalidConfig("blocks must hold at least one transaction".into()));
    }
    if config.attack == AttackMode::NetworkPartition {
        tracing::warn!("Network partition attack is not modelled; running the canonical chain");
    }
    Ok(())
}
