//! Longest-chain reconciliation

use crate::agent::Validator;
use crate::fork::ChainState;
use crate::types::{AgentMessage, ConsensusMessage};
use std::sync::Arc;

/// Result of a reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Validator whose chain was adopted
    pub winner: String,
    /// Length of the adopted chain
    pub length: usize,
    /// Validators the chain was pushed to
    pub notified: usize,
}

/// Adopt the longest local chain as the certified chain.
///
/// Ties go to the validator registered first. Every other validator is sent
/// the winning chain together with a copy of the winner's transaction pool.
/// Does nothing while the chain is forked or no validator is registered.
pub fn longest_chain_consensus(
    validators: &[Arc<Validator>],
    chain_state: &mut ChainState,
) -> Option<Reconciliation> {
    if chain_state.is_forked() {
        tracing::debug!("Skipping longest-chain reconciliation on a forked chain");
        return None;
    }

    let mut longest: Option<(&Arc<Validator>, usize)> = None;
    for validator in validators {
        let len = validator.chain_len();
        if longest.map_or(true, |(_, best)| len > best) {
            longest = Some((validator, len));
        }
    }
    let (winner, length) = longest?;

    let chain = winner.chain();
    if !chain_state.replace_certified(chain.clone()) {
        tracing::warn!("Validator {} has an empty chain, nothing to adopt", winner.short_id());
        return None;
    }

    let pool = winner.pool_snapshot();
    let mut notified = 0;
    for validator in validators {
        if validator.address() == winner.address() {
            continue;
        }
        let msg = ConsensusMessage::new(chain.clone(), pool.clone());
        match validator.send(AgentMessage::Consensus(msg)) {
            Ok(()) => notified += 1,
            Err(e) => tracing::warn!("Consensus message not delivered: {}", e),
        }
    }

    tracing::info!(
        "Longest-chain consensus adopted {} blocks from {}",
        length,
        winner.short_id()
    );

    Some(Reconciliation {
        winner: winner.address().to_string(),
        length,
        notified,
    })
}
