//! Per-validator transaction pool
//!
//! Transactions enter as unconfirmed when a user submits them and move to
//! confirmed once a verified block includes them. Ordered maps keep block
//! assembly deterministic (lowest id first).

use crate::transaction::Transaction;
use std::collections::BTreeMap;

/// Copy of a pool's contents, shipped with a consensus message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSnapshot {
    pub unconfirmed: BTreeMap<u64, Transaction>,
    pub confirmed: BTreeMap<u64, bool>,
}

/// Unconfirmed and confirmed transactions known to one validator
#[derive(Debug, Clone, Default)]
pub struct TransactionPool {
    unconfirmed: BTreeMap<u64, Transaction>,
    confirmed: BTreeMap<u64, bool>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction; returns false if it was already confirmed
    pub fn submit(&mut self, tx: Transaction) -> bool {
        if self.confirmed.contains_key(&tx.id) {
            return false;
        }
        self.unconfirmed.insert(tx.id, tx);
        true
    }

    /// Mark the given transactions as confirmed
    pub fn confirm(&mut self, transactions: &[Transaction]) {
        for tx in transactions {
            self.unconfirmed.remove(&tx.id);
            self.confirmed.insert(tx.id, true);
        }
    }

    /// Unconfirmed transactions in id order, at most `limit`
    pub fn pending(&self, limit: usize) -> Vec<Transaction> {
        self.unconfirmed.values().take(limit).cloned().collect()
    }

    pub fn is_confirmed(&self, id: u64) -> bool {
        self.confirmed.get(&id).copied().unwrap_or(false)
    }

    pub fn unconfirmed_len(&self) -> usize {
        self.unconfirmed.len()
    }

    /// Copy the pool contents
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            unconfirmed: self.unconfirmed.clone(),
            confirmed: self.confirmed.clone(),
        }
    }

    /// Replace the pool contents wholesale
    pub fn replace(&mut self, snapshot: PoolSnapshot) {
        self.unconfirmed = snapshot.unconfirmed;
        self.confirmed = snapshot.confirmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: u64) -> Transaction {
        Transaction::new(id, "alice", "bob", 5.0, 0.5)
    }

    #[test]
    fn test_confirm_moves_transactions() {
        let mut pool = TransactionPool::new();
        pool.submit(tx(1));
        pool.submit(tx(2));

        pool.confirm(&[tx(1)]);

        assert_eq!(pool.unconfirmed_len(), 1);
        assert!(pool.is_confirmed(1));
        assert!(!pool.is_confirmed(2));
    }

    #[test]
    fn test_confirmed_transaction_is_not_resubmitted() {
        let mut pool = TransactionPool::new();
        pool.submit(tx(7));
        pool.confirm(&[tx(7)]);

        assert!(!pool.submit(tx(7)));
        assert_eq!(pool.unconfirmed_len(), 0);
    }

    #[test]
    fn test_pending_is_ordered_and_limited() {
        let mut pool = TransactionPool::new();
        for id in [5, 1, 3] {
            pool.submit(tx(id));
        }

        let ids: Vec<u64> = pool.pending(2).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_snapshot_and_replace() {
        let mut source = TransactionPool::new();
        source.submit(tx(1));
        source.submit(tx(2));
        source.confirm(&[tx(2)]);

        let mut target = TransactionPool::new();
        target.submit(tx(9));
        target.replace(source.snapshot());

        assert_eq!(target.snapshot(), source.snapshot());
        assert_eq!(target.unconfirmed_len(), 1);
        assert!(target.is_confirmed(2));
    }
}
