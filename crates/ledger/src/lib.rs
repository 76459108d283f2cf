//! Ledger - blocks, transactions and transaction pools
//!
//! This crate provides the value model shared by every simulator agent:
//! - Blocks linked by content hash
//! - Transactions created by users and consumed once by a block
//! - Per-validator pools of unconfirmed and confirmed transactions
//! - Block assembly from a proposer's pending pool

pub mod assembly;
pub mod block;
pub mod error;
pub mod pool;
pub mod transaction;

pub use assembly::{assemble_block, verify_link};
pub use block::{calculate_hash, Block};
pub use error::LedgerError;
pub use pool::{PoolSnapshot, TransactionPool};
pub use transaction::Transaction;

/// Maximum transactions per block
pub const MAX_TXS_PER_BLOCK: usize = 64;
