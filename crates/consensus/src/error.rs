//! Consensus Errors

use pos_ledger::LedgerError;
use thiserror::Error;

/// Consensus errors
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("validator {0} channel closed")]
    ChannelClosed(String),

    #[error("validator {0} is already registered")]
    DuplicateValidator(String),

    #[error("user {0} is already registered")]
    DuplicateUser(String),

    #[error("unknown user {0}")]
    UnknownUser(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
