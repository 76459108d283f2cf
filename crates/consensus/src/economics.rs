//! Economics engine - rewards, slashing and reputation
//!
//! Penalties are multiplicative, so stake and reputation shrink towards zero
//! but are never clamped from below. Reputation is only capped at
//! `MAX_REPUTATION` when it is incremented.

use crate::agent::{Validator, ValidatorState, MAX_REPUTATION};
use crate::registry::UserLedger;
use pos_ledger::Block;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Penalty and reward parameters of a governance variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicsPolicy {
    /// Stake multiplier for a proposer whose block is rejected
    pub proposer_stake_penalty: Option<f64>,
    /// Reputation multiplier for a proposer whose block is rejected
    pub proposer_reputation_penalty: Option<f64>,
    /// Proposer gains a reputation point when its block is accepted
    pub proposer_reputation_bonus: bool,
    /// Stake multiplier for members voting against the decision
    pub dissent_stake_penalty: f64,
    /// Reputation multiplier for members voting against the decision
    pub dissent_reputation_penalty: Option<f64>,
    /// Members voting with the decision gain a reputation point
    pub concurrence_reputation_bonus: bool,
}

impl EconomicsPolicy {
    /// Stake-weighted committee variant
    pub fn stake_weighted() -> Self {
        Self {
            proposer_stake_penalty: Some(0.2),
            proposer_reputation_penalty: None,
            proposer_reputation_bonus: false,
            dissent_stake_penalty: 0.2,
            dissent_reputation_penalty: None,
            concurrence_reputation_bonus: false,
        }
    }

    /// Delegate variant: lighter stake slashing paired with reputation loss
    pub fn reputation() -> Self {
        Self {
            proposer_stake_penalty: Some(0.2),
            proposer_reputation_penalty: Some(0.2),
            proposer_reputation_bonus: true,
            dissent_stake_penalty: 0.8,
            dissent_reputation_penalty: Some(0.2),
            concurrence_reputation_bonus: true,
        }
    }

    /// Balance-attack variant: only dissenters are slashed
    pub fn balance_attack() -> Self {
        Self {
            proposer_stake_penalty: None,
            proposer_reputation_penalty: None,
            proposer_reputation_bonus: false,
            dissent_stake_penalty: 0.2,
            dissent_reputation_penalty: None,
            concurrence_reputation_bonus: false,
        }
    }
}

/// Add one reputation point, capped at `MAX_REPUTATION`
pub fn bump_reputation(state: &mut ValidatorState) {
    state.reputation = (state.reputation + 1.0).min(MAX_REPUTATION);
}

/// Move funds for every transaction in an accepted block and pay the proposer.
///
/// Returns the number of transactions settled. A transaction naming an
/// unknown user is skipped entirely.
pub fn settle_transactions(block: &Block, proposer: &Validator, users: &UserLedger) -> usize {
    let mut settled = 0;
    for tx in &block.transactions {
        if let Err(e) = users.apply_transfer(tx) {
            tracing::warn!("Skipping transaction {} in block {}: {}", tx.id, block.index, e);
            continue;
        }
        proposer.state().stake += tx.reward;
        settled += 1;
    }
    settled
}

/// Credit the proposer of an accepted block
pub fn reward_proposer(proposer: &Validator, policy: &EconomicsPolicy) {
    let mut state = proposer.state();
    state.block_success_count += 1;
    if policy.proposer_reputation_bonus {
        bump_reputation(&mut state);
    }
}

/// Penalise the proposer of a rejected block
pub fn slash_proposer(proposer: &Validator, policy: &EconomicsPolicy) {
    let mut state = proposer.state();
    if let Some(factor) = policy.proposer_stake_penalty {
        state.stake *= factor;
    }
    if let Some(factor) = policy.proposer_reputation_penalty {
        state.reputation *= factor;
    }
}

/// Slash members whose vote disagreed with `decision`.
///
/// Members without a recorded vote are left untouched. Returns the
/// addresses that were slashed.
pub fn apply_dissent_penalties(
    members: &[Arc<Validator>],
    votes: &HashMap<String, bool>,
    decision: bool,
    policy: &EconomicsPolicy,
) -> Vec<String> {
    let mut slashed = Vec::new();
    for member in members {
        let Some(&vote) = votes.get(member.address()) else {
            continue;
        };

        let mut state = member.state();
        if vote != decision {
            state.stake *= policy.dissent_stake_penalty;
            if let Some(factor) = policy.dissent_reputation_penalty {
                state.reputation *= factor;
            }
            slashed.push(member.address().to_string());
        } else if policy.concurrence_reputation_bonus {
            bump_reputation(&mut state);
        }
    }
    slashed
}
