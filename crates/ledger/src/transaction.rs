//! User transactions

use serde::{Deserialize, Serialize};

/// A transfer between two users, paying a reward to the block proposer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique id
    pub id: u64,
    /// Sending user's name
    pub sender: String,
    /// Receiving user's name
    pub receiver: String,
    /// Amount credited to the receiver
    pub amount: f64,
    /// Amount credited to the proposer's stake
    pub reward: f64,
}

impl Transaction {
    pub fn new(id: u64, sender: &str, receiver: &str, amount: f64, reward: f64) -> Self {
        Self {
            id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            reward,
        }
    }

    /// Total amount taken from the sender
    pub fn total_debit(&self) -> f64 {
        self.amount + self.reward
    }
}
