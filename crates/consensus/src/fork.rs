//! Global chain state and the balance-attack fork model

use crate::agent::Validator;
use pos_ledger::{verify_link, Block, LedgerError};
use std::sync::Arc;

/// The orchestrator's chain: one certified chain, or two parallel forks
#[derive(Debug, Clone)]
pub enum ChainState {
    Certified(Vec<Block>),
    Forked([Vec<Block>; 2]),
}

impl ChainState {
    /// Single chain seeded with genesis index 0
    pub fn certified() -> Self {
        ChainState::Certified(vec![Block::genesis(0)])
    }

    /// Two forks; fork `i` is seeded with a genesis block of index `i`
    pub fn forked() -> Self {
        ChainState::Forked([vec![Block::genesis(0)], vec![Block::genesis(1)]])
    }

    pub fn is_forked(&self) -> bool {
        matches!(self, ChainState::Forked(_))
    }

    /// Chain for `fork`; the certified chain answers for every fork index
    pub fn chain(&self, fork: usize) -> &[Block] {
        match self {
            ChainState::Certified(chain) => chain,
            ChainState::Forked(forks) => &forks[fork.min(1)],
        }
    }

    /// Last block of `fork`
    pub fn tip(&self, fork: usize) -> &Block {
        self.chain(fork)
            .last()
            .expect("chains are seeded with a genesis block")
    }

    /// Length of each fork; fork 1 reads 0 on a certified chain
    pub fn lengths(&self) -> [usize; 2] {
        match self {
            ChainState::Certified(chain) => [chain.len(), 0],
            ChainState::Forked(forks) => [forks[0].len(), forks[1].len()],
        }
    }

    /// Append `block` to `fork` after checking it links onto the tip
    pub fn append(&mut self, fork: usize, block: Block) -> Result<(), LedgerError> {
        verify_link(self.tip(fork), &block)?;
        match self {
            ChainState::Certified(chain) => chain.push(block),
            ChainState::Forked(forks) => forks[fork.min(1)].push(block),
        }
        Ok(())
    }

    /// Replace the certified chain; ignored while forked or when `chain` is empty
    pub fn replace_certified(&mut self, chain: Vec<Block>) -> bool {
        match self {
            ChainState::Certified(_) if chain.is_empty() => false,
            ChainState::Certified(current) => {
                *current = chain;
                true
            }
            ChainState::Forked(_) => false,
        }
    }
}

/// Split validators between the forks: first half views fork 0, the rest fork 1
pub fn assign_views(validators: &[Arc<Validator>]) {
    let midpoint = validators.len().div_ceil(2);
    for (i, validator) in validators.iter().enumerate() {
        validator.state().view = if i < midpoint { 0 } else { 1 };
    }
}

/// How a malicious proposer picks the fork to extend
pub trait ForkStrategy: Send + Sync {
    fn choose_fork(&self, lengths: [usize; 2]) -> usize;
}

/// Extend the shorter fork so neither pulls ahead (fork 1 on ties)
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancingForkStrategy;

impl ForkStrategy for BalancingForkStrategy {
    fn choose_fork(&self, lengths: [usize; 2]) -> usize {
        if lengths[1] <= lengths[0] {
            1
        } else {
            0
        }
    }
}
