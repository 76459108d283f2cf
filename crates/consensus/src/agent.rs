//! Validator and user agents as seen by the orchestrator
//!
//! A `Validator` is shared between the orchestrator and the validator's own
//! task. The orchestrator holds the sending half of the inbound channels and
//! the receiving half of the reply channels; the task owns the other ends
//! through `ValidatorEndpoints`.

use crate::error::{ConsensusError, ConsensusResult};
use crate::types::{AgentMessage, CandidateInfo, DelegateVoteMessage, DelegateVoteRequestMessage};
use parking_lot::{Mutex, MutexGuard, RwLock};
use pos_ledger::{Block, PoolSnapshot, Transaction, TransactionPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Upper bound on reputation
pub const MAX_REPUTATION: f64 = 10.0;

/// Mutable economic state and counters of a validator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatorState {
    pub stake: f64,
    pub reputation: f64,
    /// Fork this validator treats as canonical (balance attack only)
    pub view: usize,
    pub committee_count: u64,
    pub proposer_count: u64,
    pub block_success_count: u64,
}

/// Agent-side channel ends of a validator
pub struct ValidatorEndpoints {
    pub inbound: UnboundedReceiver<AgentMessage>,
    pub delegate_requests: UnboundedReceiver<DelegateVoteRequestMessage>,
    pub outbound: UnboundedSender<AgentMessage>,
    pub delegate_votes: UnboundedSender<DelegateVoteMessage>,
}

/// A validator registered with the network
pub struct Validator {
    address: String,
    malicious: bool,
    state: Mutex<ValidatorState>,
    /// Local view of the chain
    chain: RwLock<Vec<Block>>,
    /// Private transaction pool
    pool: Mutex<TransactionPool>,
    inbound: UnboundedSender<AgentMessage>,
    delegate_requests: UnboundedSender<DelegateVoteRequestMessage>,
    outbound: tokio::sync::Mutex<UnboundedReceiver<AgentMessage>>,
    delegate_votes: tokio::sync::Mutex<UnboundedReceiver<DelegateVoteMessage>>,
}

impl Validator {
    /// Create a validator starting from `chain` and return its agent endpoints
    pub fn new(
        address: impl Into<String>,
        malicious: bool,
        stake: f64,
        reputation: f64,
        chain: Vec<Block>,
    ) -> (Arc<Self>, ValidatorEndpoints) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (vote_tx, vote_rx) = mpsc::unbounded_channel();

        let validator = Arc::new(Self {
            address: address.into(),
            malicious,
            state: Mutex::new(ValidatorState {
                stake,
                reputation,
                ..Default::default()
            }),
            chain: RwLock::new(chain),
            pool: Mutex::new(TransactionPool::new()),
            inbound: inbound_tx,
            delegate_requests: request_tx,
            outbound: tokio::sync::Mutex::new(outbound_rx),
            delegate_votes: tokio::sync::Mutex::new(vote_rx),
        });

        let endpoints = ValidatorEndpoints {
            inbound: inbound_rx,
            delegate_requests: request_rx,
            outbound: outbound_tx,
            delegate_votes: vote_tx,
        };

        (validator, endpoints)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// First characters of the address, for logs
    pub fn short_id(&self) -> &str {
        short_id(&self.address)
    }

    pub fn is_malicious(&self) -> bool {
        self.malicious
    }

    /// Lock the economic state
    pub fn state(&self) -> MutexGuard<'_, ValidatorState> {
        self.state.lock()
    }

    /// Copy of the economic state
    pub fn snapshot(&self) -> ValidatorState {
        self.state.lock().clone()
    }

    pub fn stake(&self) -> f64 {
        self.state.lock().stake
    }

    pub fn reputation(&self) -> f64 {
        self.state.lock().reputation
    }

    pub fn view(&self) -> usize {
        self.state.lock().view
    }

    /// How this validator appears on a delegate ballot
    pub fn candidate_info(&self) -> CandidateInfo {
        CandidateInfo {
            address: self.address.clone(),
            reputation: self.reputation(),
            malicious: self.malicious,
        }
    }

    pub fn chain_len(&self) -> usize {
        self.chain.read().len()
    }

    pub fn chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    /// Last block of the local chain
    pub fn tip(&self) -> Option<Block> {
        self.chain.read().last().cloned()
    }

    pub fn append_block(&self, block: Block) {
        self.chain.write().push(block);
    }

    pub fn replace_chain(&self, chain: Vec<Block>) {
        *self.chain.write() = chain;
    }

    /// Lock the transaction pool
    pub fn pool(&self) -> MutexGuard<'_, TransactionPool> {
        self.pool.lock()
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.lock().snapshot()
    }

    pub fn submit_transaction(&self, tx: Transaction) -> bool {
        self.pool.lock().submit(tx)
    }

    /// Send on the inbound channel
    pub fn send(&self, msg: AgentMessage) -> ConsensusResult<()> {
        self.inbound
            .send(msg)
            .map_err(|_| ConsensusError::ChannelClosed(self.address.clone()))
    }

    /// Send on the delegate request channel
    pub fn request_delegate_vote(&self, msg: DelegateVoteRequestMessage) -> ConsensusResult<()> {
        self.delegate_requests
            .send(msg)
            .map_err(|_| ConsensusError::ChannelClosed(self.address.clone()))
    }

    /// Receive the next reply on the outbound channel.
    ///
    /// Returns `None` when the channel is closed or the timeout elapses.
    pub async fn recv_reply(&self, timeout: Option<Duration>) -> Option<AgentMessage> {
        let mut outbound = self.outbound.lock().await;
        recv_within(&mut outbound, timeout).await
    }

    /// Receive the next delegate ballot
    pub async fn recv_delegate_vote(&self, timeout: Option<Duration>) -> Option<DelegateVoteMessage> {
        let mut votes = self.delegate_votes.lock().await;
        recv_within(&mut votes, timeout).await
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("address", &self.address)
            .field("malicious", &self.malicious)
            .field("state", &*self.state.lock())
            .finish()
    }
}

async fn recv_within<T>(rx: &mut UnboundedReceiver<T>, timeout: Option<Duration>) -> Option<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, rx.recv()).await.ok().flatten(),
        None => rx.recv().await,
    }
}

/// A user that creates transactions against its own balance
#[derive(Debug)]
pub struct User {
    name: String,
    balance: Mutex<f64>,
    /// Lines forwarded to the user's connection
    notifier: Option<UnboundedSender<String>>,
}

impl User {
    pub fn new(name: impl Into<String>, balance: f64) -> Self {
        Self {
            name: name.into(),
            balance: Mutex::new(balance),
            notifier: None,
        }
    }

    /// Attach a channel that receives balance notifications
    pub fn with_notifier(mut self, notifier: UnboundedSender<String>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn balance(&self) -> f64 {
        *self.balance.lock()
    }

    /// Add `delta` (possibly negative) and return the new balance
    pub fn adjust_balance(&self, delta: f64) -> f64 {
        let mut balance = self.balance.lock();
        *balance += delta;
        *balance
    }

    /// Push a line to the user's connection, if any
    pub fn notify(&self, line: String) {
        if let Some(ref notifier) = self.notifier {
            let _ = notifier.send(line);
        }
    }
}

/// First three characters of an address
pub fn short_id(address: &str) -> &str {
    let end = address
        .char_indices()
        .nth(3)
        .map(|(i, _)| i)
        .unwrap_or(address.len());
    &address[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationStatusMessage;

    #[tokio::test]
    async fn test_reply_round_trip_through_endpoints() {
        let (validator, endpoints) = Validator::new("abcdef", false, 10.0, 5.0, vec![Block::genesis(0)]);

        endpoints
            .outbound
            .send(AgentMessage::ValidationStatus(ValidationStatusMessage { round: 1, is_valid: true }))
            .unwrap();

        let reply = validator.recv_reply(None).await;
        assert!(matches!(
            reply,
            Some(AgentMessage::ValidationStatus(ValidationStatusMessage { round: 1, is_valid: true }))
        ));
    }

    #[tokio::test]
    async fn test_reply_timeout_returns_none() {
        let (validator, _endpoints) = Validator::new("silent", false, 10.0, 5.0, vec![]);

        let reply = validator.recv_reply(Some(Duration::from_millis(10))).await;
        assert!(reply.is_none());
    }

    #[test]
    fn test_send_fails_once_agent_is_gone() {
        let (validator, endpoints) = Validator::new("gone", false, 10.0, 5.0, vec![]);
        drop(endpoints);

        let result = validator.send(AgentMessage::ValidationStatus(ValidationStatusMessage {
            round: 1,
            is_valid: false,
        }));
        assert!(matches!(result, Err(ConsensusError::ChannelClosed(_))));
    }

    #[test]
    fn test_user_notifications() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let user = User::new("alice", 50.0).with_notifier(tx);

        assert_eq!(user.adjust_balance(-11.0), 39.0);
        user.notify(format!("New balance: {:.6}", user.balance()));

        assert_eq!(rx.try_recv().unwrap(), "New balance: 39.000000");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("abcdef"), "abc");
        assert_eq!(short_id("ab"), "ab");
    }
}
