//! Block assembly and structural checks

use crate::{block::Block, error::LedgerError, pool::TransactionPool};

/// Build a candidate block on top of `parent` from the proposer's pending pool
pub fn assemble_block(
    parent: &Block,
    proposer: &str,
    pool: &TransactionPool,
    max_txs: usize,
) -> Result<Block, LedgerError> {
    let transactions = pool.pending(max_txs);
    if transactions.is_empty() {
        return Err(LedgerError::NoPendingTransactions(proposer.to_string()));
    }

    let block = Block::new(
        parent.index + 1,
        transactions,
        parent.hash.clone(),
        proposer.to_string(),
    );

    tracing::trace!(
        "Assembled block {} with {} txs on {}",
        block.index,
        block.transactions.len(),
        short(&parent.hash)
    );

    Ok(block)
}

/// Check that `block` is correctly hashed and links onto `parent`
pub fn verify_link(parent: &Block, block: &Block) -> Result<(), LedgerError> {
    if !block.is_well_formed() {
        return Err(LedgerError::HashMismatch(block.index));
    }
    if !block.extends(parent) {
        return Err(LedgerError::BrokenLink {
            index: block.index,
            parent_index: parent.index,
        });
    }
    Ok(())
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}
