//! User agents - create transfers and hand them to every validator

use crate::agent::User;
use crate::error::{ConsensusError, ConsensusResult};
use crate::registry::Registry;
use pos_ledger::Transaction;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Reward offered per unit transferred by generated transactions
const GENERATED_REWARD_RATE: f64 = 0.1;
/// Upper bound on a generated transfer
const MAX_GENERATED_AMOUNT: f64 = 10.0;

/// Create a transfer from `sender` and submit it to every validator's pool.
///
/// Both parties must be registered. Balances only move once a block
/// carrying the transaction is accepted.
pub fn submit_transfer(
    registry: &Registry,
    sender: &str,
    receiver: &str,
    amount: f64,
    reward: f64,
) -> ConsensusResult<Transaction> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ConsensusError::InvalidTransaction(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if !reward.is_finite() || reward < 0.0 {
        return Err(ConsensusError::InvalidTransaction(format!(
            "reward must not be negative, got {reward}"
        )));
    }
    if sender == receiver {
        return Err(ConsensusError::InvalidTransaction(format!(
            "{sender} cannot pay itself"
        )));
    }
    for name in [sender, receiver] {
        if registry.users.get(name).is_none() {
            return Err(ConsensusError::UnknownUser(name.to_string()));
        }
    }

    let tx = Transaction::new(registry.next_transaction_id(), sender, receiver, amount, reward);
    let accepted = registry.broadcast_transaction(&tx);
    tracing::info!(
        "Transaction {} from {} to {} for {:.2} (reward {:.2}) sent to {} validators",
        tx.id,
        sender,
        receiver,
        amount,
        reward,
        accepted
    );
    Ok(tx)
}

/// Generates random transfers for one user
pub struct UserNode {
    user: Arc<User>,
    registry: Arc<Registry>,
    tx_interval: Duration,
    rng: StdRng,
}

impl UserNode {
    pub fn new(user: Arc<User>, registry: Arc<Registry>, tx_interval: Duration) -> Self {
        Self {
            user,
            registry,
            tx_interval,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Submit one random transfer; `None` when there is nobody to pay
    pub fn submit_random(&mut self) -> Option<Transaction> {
        let others: Vec<String> = self
            .registry
            .users
            .names()
            .into_iter()
            .filter(|name| name != self.user.name())
            .collect();
        let receiver = others.choose(&mut self.rng)?;

        let amount = (self.rng.gen_range(1.0..=MAX_GENERATED_AMOUNT) * 100.0).round() / 100.0;
        let reward = (amount * GENERATED_REWARD_RATE * 100.0).round() / 100.0;

        match submit_transfer(&self.registry, self.user.name(), receiver, amount, reward) {
            Ok(tx) => Some(tx),
            Err(e) => {
                tracing::warn!("User {} could not submit transfer: {}", self.user.name(), e);
                None
            }
        }
    }

    /// Submit a transfer every `tx_interval` until the user leaves the ledger
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tx_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            if self.registry.users.get(self.user.name()).is_none() {
                tracing::debug!("User {} left, stopping transfers", self.user.name());
                break;
            }
            self.submit_random();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Validator;
    use pos_ledger::Block;

    fn registry_with(users: &[&str], validators: &[&str]) -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        for name in users {
            registry.users.add(User::new(*name, 100.0)).unwrap();
        }
        for address in validators {
            let (validator, _) = Validator::new(*address, false, 100.0, 5.0, vec![Block::genesis(0)]);
            registry.validators.add(validator).unwrap();
        }
        registry
    }

    #[test]
    fn test_transfer_reaches_every_pool() {
        let registry = registry_with(&["alice", "bob"], &["v1", "v2"]);
        let tx = submit_transfer(&registry, "alice", "bob", 10.0, 1.0).unwrap();

        assert_eq!(tx.id, 1);
        for validator in registry.validators.snapshot() {
            assert_eq!(validator.pool().unconfirmed_len(), 1);
        }
        // Balances move only on settlement
        assert_eq!(registry.users.get("alice").unwrap().balance(), 100.0);
    }

    #[test]
    fn test_rejected_transfers() {
        let registry = registry_with(&["alice", "bob"], &["v1"]);

        assert!(matches!(
            submit_transfer(&registry, "alice", "carol", 1.0, 0.1),
            Err(ConsensusError::UnknownUser(name)) if name == "carol"
        ));
        assert!(matches!(
            submit_transfer(&registry, "alice", "bob", 0.0, 0.1),
            Err(ConsensusError::InvalidTransaction(_))
        ));
        assert!(matches!(
            submit_transfer(&registry, "alice", "alice", 1.0, 0.1),
            Err(ConsensusError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_random_transfer_targets_someone_else() {
        let registry = registry_with(&["alice", "bob"], &["v1"]);
        let alice = registry.users.get("alice").unwrap();
        let mut node = UserNode::new(alice, registry.clone(), Duration::from_secs(1)).with_seed(3);

        let tx = node.submit_random().unwrap();
        assert_eq!(tx.sender, "alice");
        assert_eq!(tx.receiver, "bob");
        assert!(tx.amount >= 1.0 && tx.amount <= 10.0);

        let lonely = registry_with(&["solo"], &["v1"]);
        let solo = lonely.users.get("solo").unwrap();
        assert!(UserNode::new(solo, lonely, Duration::from_secs(1)).submit_random().is_none());
    }

    #[tokio::test]
    async fn test_node_stops_once_user_leaves() {
        let registry = registry_with(&["alice", "bob"], &["v1"]);
        let alice = registry.users.get("alice").unwrap();
        let handle = UserNode::new(alice, registry.clone(), Duration::from_millis(5))
            .with_seed(1)
            .spawn();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(registry.validators.get("v1").unwrap().pool().unconfirmed_len() > 0);

        registry.users.remove("alice").unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("user node keeps running after its user left")
            .unwrap();
    }
}
