//! Ledger Errors

use thiserror::Error;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("proposer {0} has no pending transactions")]
    NoPendingTransactions(String),

    #[error("block {index} does not extend block {parent_index}")]
    BrokenLink { index: u64, parent_index: u64 },

    #[error("block {0} hash does not match its content")]
    HashMismatch(u64),
}
