//! Agent registry
//!
//! Validators join and leave from connection tasks while the orchestrator
//! reads snapshots. The registry lock is held only for the mutation or the
//! copy, never across a channel operation.

use crate::agent::{User, Validator};
use crate::error::{ConsensusError, ConsensusResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use pos_ledger::Transaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ordered list of registered validators
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Mutex<Vec<Arc<Validator>>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator at the end of the list
    pub fn add(&self, validator: Arc<Validator>) -> ConsensusResult<()> {
        let mut validators = self.validators.lock();
        if validators.iter().any(|v| v.address() == validator.address()) {
            return Err(ConsensusError::DuplicateValidator(validator.address().to_string()));
        }
        validators.push(validator);
        Ok(())
    }

    /// Remove a validator by address
    pub fn remove(&self, address: &str) -> Option<Arc<Validator>> {
        let mut validators = self.validators.lock();
        let pos = validators.iter().position(|v| v.address() == address)?;
        Some(validators.remove(pos))
    }

    pub fn get(&self, address: &str) -> Option<Arc<Validator>> {
        self.validators
            .lock()
            .iter()
            .find(|v| v.address() == address)
            .cloned()
    }

    /// Copy of the current validator list in registration order
    pub fn snapshot(&self) -> Vec<Arc<Validator>> {
        self.validators.lock().clone()
    }

    /// Validators paired with their stake at call time
    pub fn stake_weights(&self) -> (Vec<Arc<Validator>>, Vec<f64>) {
        let validators = self.validators.lock().clone();
        let weights = validators.iter().map(|v| v.stake()).collect();
        (validators, weights)
    }

    pub fn len(&self) -> usize {
        self.validators.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.lock().is_empty()
    }
}

/// Users keyed by name
#[derive(Default)]
pub struct UserLedger {
    users: DashMap<String, Arc<User>>,
}

impl UserLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user: User) -> ConsensusResult<Arc<User>> {
        let name = user.name().to_string();
        if self.users.contains_key(&name) {
            return Err(ConsensusError::DuplicateUser(name));
        }
        let user = Arc::new(user);
        self.users.insert(name, user.clone());
        Ok(user)
    }

    pub fn get(&self, name: &str) -> Option<Arc<User>> {
        self.users.get(name).map(|r| r.value().clone())
    }

    /// Drop a departed user; its pending transfers fail at settlement
    pub fn remove(&self, name: &str) -> Option<Arc<User>> {
        self.users.remove(name).map(|(_, v)| v)
    }

    /// All user names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.users.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Name and balance of every user, sorted by name
    pub fn balances(&self) -> Vec<(String, f64)> {
        let mut balances: Vec<(String, f64)> = self
            .users
            .iter()
            .map(|r| (r.key().clone(), r.value().balance()))
            .collect();
        balances.sort_by(|a, b| a.0.cmp(&b.0));
        balances
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Debit the sender by amount + reward and credit the receiver by amount.
    ///
    /// Both users must exist; nothing is changed otherwise.
    pub fn apply_transfer(&self, tx: &Transaction) -> ConsensusResult<()> {
        let sender = self
            .get(&tx.sender)
            .ok_or_else(|| ConsensusError::UnknownUser(tx.sender.clone()))?;
        let receiver = self
            .get(&tx.receiver)
            .ok_or_else(|| ConsensusError::UnknownUser(tx.receiver.clone()))?;

        let sender_balance = sender.adjust_balance(-tx.total_debit());
        sender.notify(format!("New balance: {:.6}", sender_balance));

        let receiver_balance = receiver.adjust_balance(tx.amount);
        receiver.notify(format!("New balance: {:.6}", receiver_balance));

        Ok(())
    }
}

/// Every agent known to the simulation
#[derive(Default)]
pub struct Registry {
    pub validators: ValidatorRegistry,
    pub users: UserLedger,
    next_tx_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh transaction id
    pub fn next_transaction_id(&self) -> u64 {
        self.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Hand a transaction to every validator's pool; returns how many accepted it
    pub fn broadcast_transaction(&self, tx: &Transaction) -> usize {
        self.validators
            .snapshot()
            .iter()
            .filter(|v| v.submit_transaction(tx.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_ledger::Block;

    fn validator(address: &str, stake: f64) -> Arc<Validator> {
        Validator::new(address, false, stake, 5.0, vec![Block::genesis(0)]).0
    }

    #[test]
    fn test_add_remove_validators() {
        let registry = ValidatorRegistry::new();
        registry.add(validator("a", 1.0)).unwrap();
        registry.add(validator("b", 2.0)).unwrap();

        assert!(matches!(
            registry.add(validator("a", 3.0)),
            Err(ConsensusError::DuplicateValidator(_))
        ));

        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.address(), "a");
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn test_stake_weights_follow_registration_order() {
        let registry = ValidatorRegistry::new();
        registry.add(validator("a", 1.0)).unwrap();
        registry.add(validator("b", 2.5)).unwrap();

        let (validators, weights) = registry.stake_weights();
        assert_eq!(validators[1].address(), "b");
        assert_eq!(weights, vec![1.0, 2.5]);
    }

    #[test]
    fn test_apply_transfer_conserves_amounts() {
        let users = UserLedger::new();
        users.add(User::new("alice", 100.0)).unwrap();
        users.add(User::new("bob", 100.0)).unwrap();

        users
            .apply_transfer(&Transaction::new(1, "alice", "bob", 10.0, 1.0))
            .unwrap();

        assert_eq!(users.get("alice").unwrap().balance(), 89.0);
        assert_eq!(users.get("bob").unwrap().balance(), 110.0);
    }

    #[test]
    fn test_apply_transfer_unknown_receiver_changes_nothing() {
        let users = UserLedger::new();
        users.add(User::new("alice", 100.0)).unwrap();

        let result = users.apply_transfer(&Transaction::new(1, "alice", "carol", 10.0, 1.0));
        assert!(matches!(result, Err(ConsensusError::UnknownUser(ref n)) if n == "carol"));
        assert_eq!(users.get("alice").unwrap().balance(), 100.0);
    }

    #[test]
    fn test_broadcast_transaction_reaches_every_pool() {
        let registry = Registry::new();
        registry.validators.add(validator("a", 1.0)).unwrap();
        registry.validators.add(validator("b", 1.0)).unwrap();

        let id = registry.next_transaction_id();
        let tx = Transaction::new(id, "alice", "bob", 1.0, 0.1);
        assert_eq!(registry.broadcast_transaction(&tx), 2);
        assert_eq!(registry.validators.get("b").unwrap().pool().unconfirmed_len(), 1);
    }
}
