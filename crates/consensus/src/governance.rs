//! Governance variants plugged into the round orchestrator
//!
//! Each variant decides who sits on the committee, who proposes, which fork
//! the proposal extends and which economics apply. The round skeleton itself
//! lives in the orchestrator.

use crate::agent::Validator;
use crate::economics::EconomicsPolicy;
use crate::fork::{assign_views, BalancingForkStrategy, ForkStrategy};
use crate::orchestrator::SimulationContext;
use crate::selection::{
    choose_block_proposer, choose_delegates, choose_uniform_committee, choose_validation_committee,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Strategy object driving one governance variant
#[async_trait]
pub trait Governance: Send {
    fn name(&self) -> &'static str;

    /// Economics applied when the round settles
    fn policy(&self) -> EconomicsPolicy;

    /// Hook run before committee selection
    fn prepare_round(&mut self, _ctx: &mut SimulationContext) {}

    /// Validators voting this round; empty skips the round
    async fn select_committee(&mut self, ctx: &mut SimulationContext) -> Vec<Arc<Validator>>;

    /// Proposer for this round; `None` skips the round
    fn select_proposer(
        &mut self,
        ctx: &mut SimulationContext,
        committee: &[Arc<Validator>],
    ) -> Option<Arc<Validator>>;

    /// Fork the proposal extends when the chain is forked
    fn choose_fork(&mut self, _ctx: &SimulationContext, _proposer: &Validator) -> usize {
        0
    }
}

/// Stake-weighted committee, stake-weighted proposer drawn from it
#[derive(Debug, Default)]
pub struct StakeGovernance;

#[async_trait]
impl Governance for StakeGovernance {
    fn name(&self) -> &'static str {
        "pos"
    }

    fn policy(&self) -> EconomicsPolicy {
        EconomicsPolicy::stake_weighted()
    }

    async fn select_committee(&mut self, ctx: &mut SimulationContext) -> Vec<Arc<Validator>> {
        let size = ctx.config.committee_size;
        choose_validation_committee(&ctx.registry.validators, size, &mut ctx.rng)
    }

    fn select_proposer(
        &mut self,
        ctx: &mut SimulationContext,
        committee: &[Arc<Validator>],
    ) -> Option<Arc<Validator>> {
        choose_block_proposer(committee, &mut ctx.rng)
    }
}

/// Elected delegates vote on every block and take turns proposing.
///
/// A new election runs every `2 * delegate_size` rounds, starting with the
/// first round.
#[derive(Debug)]
pub struct ReputationGovernance {
    delegate_size: usize,
    delegates: Vec<Arc<Validator>>,
    counter: usize,
}

impl ReputationGovernance {
    pub fn new(delegate_size: usize) -> Self {
        Self {
            delegate_size,
            delegates: Vec::new(),
            counter: 2 * delegate_size,
        }
    }
}

#[async_trait]
impl Governance for ReputationGovernance {
    fn name(&self) -> &'static str {
        "reputation"
    }

    fn policy(&self) -> EconomicsPolicy {
        EconomicsPolicy::reputation()
    }

    async fn select_committee(&mut self, ctx: &mut SimulationContext) -> Vec<Arc<Validator>> {
        if self.counter >= 2 * self.delegate_size || self.delegates.is_empty() {
            self.counter = 0;
            let timeout = ctx.config.vote_timeout();
            self.delegates =
                choose_delegates(&ctx.registry.validators, self.delegate_size, ctx.round, timeout)
                    .await;
            tracing::info!("New delegates chosen ({} elected)", self.delegates.len());
        }
        self.delegates.clone()
    }

    fn select_proposer(
        &mut self,
        _ctx: &mut SimulationContext,
        committee: &[Arc<Validator>],
    ) -> Option<Arc<Validator>> {
        if committee.is_empty() {
            return None;
        }
        let proposer = committee[self.counter % committee.len()].clone();
        self.counter += 1;
        Some(proposer)
    }
}

/// Two forks with split validator views; proposer drawn over everyone
pub struct BalanceAttackGovernance {
    strategy: Box<dyn ForkStrategy>,
}

impl BalanceAttackGovernance {
    pub fn new() -> Self {
        Self::with_strategy(Box::new(BalancingForkStrategy))
    }

    /// Use a custom fork pick for malicious proposers
    pub fn with_strategy(strategy: Box<dyn ForkStrategy>) -> Self {
        Self { strategy }
    }
}

impl Default for BalanceAttackGovernance {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Governance for BalanceAttackGovernance {
    fn name(&self) -> &'static str {
        "balance-attack"
    }

    fn policy(&self) -> EconomicsPolicy {
        EconomicsPolicy::balance_attack()
    }

    fn prepare_round(&mut self, ctx: &mut SimulationContext) {
        assign_views(&ctx.registry.validators.snapshot());
    }

    async fn select_committee(&mut self, ctx: &mut SimulationContext) -> Vec<Arc<Validator>> {
        let validators = ctx.registry.validators.snapshot();
        choose_uniform_committee(&validators, &mut ctx.rng)
    }

    fn select_proposer(
        &mut self,
        ctx: &mut SimulationContext,
        _committee: &[Arc<Validator>],
    ) -> Option<Arc<Validator>> {
        let validators = ctx.registry.validators.snapshot();
        choose_block_proposer(&validators, &mut ctx.rng)
    }

    fn choose_fork(&mut self, ctx: &SimulationContext, proposer: &Validator) -> usize {
        if proposer.is_malicious() {
            self.strategy.choose_fork(ctx.chain.lengths())
        } else {
            proposer.view()
        }
    }
}
