//! Blocks and content hashing

use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// A block in a (possibly forked) chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Sequence number
    pub index: u64,
    /// Creation time (RFC 3339)
    pub timestamp: String,
    /// Transactions included in this block
    pub transactions: Vec<Transaction>,
    /// Content hash over every other field
    pub hash: String,
    /// Hash of the block at `index - 1` in the chain this block extends
    pub prev_hash: String,
    /// Address of the validator that proposed it
    pub validator: String,
}

impl Block {
    /// Create a genesis block.
    ///
    /// Balance-attack runs seed each fork with a different `index` so the
    /// two genesis blocks hash differently.
    pub fn genesis(index: u64) -> Self {
        Self::new(index, Vec::new(), String::new(), String::new())
    }

    /// Create a block stamped with the current time and hash it
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        prev_hash: String,
        validator: String,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp: chrono::Utc::now().to_rfc3339(),
            transactions,
            hash: String::new(),
            prev_hash,
            validator,
        };
        block.hash = calculate_hash(&block);
        block
    }

    /// Whether the stored hash matches the block's content
    pub fn is_well_formed(&self) -> bool {
        calculate_hash(self) == self.hash
    }

    /// Whether this block links directly onto `parent`
    pub fn extends(&self, parent: &Block) -> bool {
        self.index == parent.index + 1 && self.prev_hash == parent.hash
    }

    /// Transaction ids in inclusion order
    pub fn transaction_ids(&self) -> Vec<u64> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }
}

/// Compute the content hash of a block (the `hash` field is ignored)
pub fn calculate_hash(block: &Block) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&block.index.to_le_bytes());
    hasher.update(block.timestamp.as_bytes());

    for tx in &block.transactions {
        hasher.update(&tx.id.to_le_bytes());
        hasher.update(tx.sender.as_bytes());
        hasher.update(tx.receiver.as_bytes());
        hasher.update(&tx.amount.to_le_bytes());
        hasher.update(&tx.reward.to_le_bytes());
    }

    hasher.update(block.prev_hash.as_bytes());
    hasher.update(block.validator.as_bytes());

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: u64) -> Transaction {
        Transaction::new(id, "alice", "bob", 10.0, 1.0)
    }

    #[test]
    fn test_hash_ignores_hash_field() {
        let mut block = Block::new(1, vec![tx(1)], "parent".into(), "v1".into());
        let original = block.hash.clone();
        block.hash = "tampered".into();
        assert_eq!(calculate_hash(&block), original);
    }

    #[test]
    fn test_hash_covers_transactions() {
        let mut block = Block::new(1, vec![tx(1)], "parent".into(), "v1".into());
        assert!(block.is_well_formed());

        block.transactions[0].amount = 1000.0;
        assert!(!block.is_well_formed());
    }

    #[test]
    fn test_extends_parent() {
        let genesis = Block::genesis(0);
        let child = Block::new(1, vec![], genesis.hash.clone(), "v1".into());
        assert!(child.extends(&genesis));

        let orphan = Block::new(1, vec![], "elsewhere".into(), "v1".into());
        assert!(!orphan.extends(&genesis));

        let skipped = Block::new(2, vec![], genesis.hash.clone(), "v1".into());
        assert!(!skipped.extends(&genesis));
    }

    #[test]
    fn test_fork_genesis_blocks_differ() {
        let fork0 = Block::genesis(0);
        let fork1 = Block::genesis(1);
        assert_ne!(fork0.hash, fork1.hash);
        assert!(fork0.transactions.is_empty());
        assert!(fork1.prev_hash.is_empty());
    }
}
