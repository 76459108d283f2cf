//! Validator node - answers vote requests and keeps a local chain
//!
//! Honest nodes check the candidate against the reference block they were
//! sent. Malicious nodes never report the true verdict: on a single chain
//! they invert it, during a balance attack they vote to keep both forks the
//! same length.

use crate::agent::{Validator, ValidatorEndpoints};
use crate::types::{
    AgentMessage, CandidateInfo, ConsensusMessage, DelegateVoteMessage, DelegateVoteRequestMessage,
    ValidateBlockMessage, ValidationStatusMessage, VerifiedBlockMessage,
};
use pos_ledger::verify_link;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Agent task driving one validator
pub struct ValidatorNode {
    validator: Arc<Validator>,
    endpoints: ValidatorEndpoints,
}

impl ValidatorNode {
    pub fn new(validator: Arc<Validator>, endpoints: ValidatorEndpoints) -> Self {
        Self {
            validator,
            endpoints,
        }
    }

    /// Run the node on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve requests until the orchestrator side goes away
    pub async fn run(mut self) {
        tracing::debug!(
            "Validator {} running (malicious: {})",
            self.validator.short_id(),
            self.validator.is_malicious()
        );

        let mut inbound_open = true;
        let mut requests_open = true;

        while inbound_open || requests_open {
            tokio::select! {
                msg = self.endpoints.inbound.recv(), if inbound_open => match msg {
                    Some(msg) => self.handle_message(msg),
                    None => inbound_open = false,
                },
                request = self.endpoints.delegate_requests.recv(), if requests_open => match request {
                    Some(request) => self.handle_delegate_request(&request),
                    None => requests_open = false,
                },
            }
        }

        tracing::debug!("Validator {} stopped", self.validator.short_id());
    }

    fn handle_message(&self, msg: AgentMessage) {
        match msg {
            AgentMessage::ValidateBlock(request) => {
                let is_valid = evaluate_block(&self.validator, &request);
                let reply = AgentMessage::ValidationStatus(ValidationStatusMessage {
                    round: request.round,
                    is_valid,
                });
                if self.endpoints.outbound.send(reply).is_err() {
                    tracing::warn!("Validator {} vote dropped", self.validator.short_id());
                }
            }
            AgentMessage::VerifiedBlock(verified) => apply_verified_block(&self.validator, verified),
            AgentMessage::Consensus(consensus) => adopt_consensus(&self.validator, consensus),
            AgentMessage::ValidationStatus(_) => {
                tracing::warn!(
                    "Validator {} ignoring ValidationStatus on its inbound channel",
                    self.validator.short_id()
                );
            }
        }
    }

    fn handle_delegate_request(&self, request: &DelegateVoteRequestMessage) {
        let ballot = DelegateVoteMessage {
            election: request.election,
            votes: rank_candidates(self.validator.is_malicious(), request),
        };
        if self.endpoints.delegate_votes.send(ballot).is_err() {
            tracing::warn!("Validator {} ballot dropped", self.validator.short_id());
        }
    }
}

/// Structural verdict: the candidate links onto the reference block and
/// carries no transaction this validator already saw confirmed.
pub fn honest_verdict(validator: &Validator, request: &ValidateBlockMessage) -> bool {
    if let Err(e) = verify_link(&request.reference, &request.candidate) {
        tracing::debug!("Validator {} rejects block: {}", validator.short_id(), e);
        return false;
    }
    let pool = validator.pool();
    !request
        .candidate
        .transactions
        .iter()
        .any(|tx| pool.is_confirmed(tx.id))
}

/// The vote a validator casts for a candidate block
pub fn evaluate_block(validator: &Validator, request: &ValidateBlockMessage) -> bool {
    if !validator.is_malicious() {
        return honest_verdict(validator, request);
    }

    match request.forks {
        // Approve only blocks that do not pull the proposer's fork ahead
        Some(ref forks) => {
            let target = forks.proposer_view.min(1);
            forks.lengths[target] <= forks.lengths[1 - target]
        }
        None => !honest_verdict(validator, request),
    }
}

/// Extend the local chain with an accepted block and confirm its transactions
pub fn apply_verified_block(validator: &Validator, verified: VerifiedBlockMessage) {
    validator.pool().confirm(&verified.transactions);
    tracing::debug!(
        "Validator {} appended block {}",
        validator.short_id(),
        verified.block.index
    );
    validator.append_block(verified.block);
}

/// Replace the local chain and pool with the reconciled ones
pub fn adopt_consensus(validator: &Validator, consensus: ConsensusMessage) {
    let pool = consensus.pool();
    validator.pool().replace(pool);
    tracing::debug!(
        "Validator {} adopted chain of {} blocks",
        validator.short_id(),
        consensus.chain.len()
    );
    validator.replace_chain(consensus.chain);
}

/// Ballot for a delegate election.
///
/// Honest voters pick the most reputable candidates. Malicious voters put
/// their own kind first.
pub fn rank_candidates(malicious: bool, request: &DelegateVoteRequestMessage) -> Vec<String> {
    let mut candidates: Vec<&CandidateInfo> = request.candidates.iter().collect();
    candidates.sort_by(|a, b| {
        let collusion = if malicious {
            b.malicious.cmp(&a.malicious)
        } else {
            Ordering::Equal
        };
        collusion
            .then_with(|| b.reputation.total_cmp(&a.reputation))
            .then_with(|| a.address.cmp(&b.address))
    });
    candidates
        .into_iter()
        .take(request.delegate_count)
        .map(|c| c.address.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ForkContext;
    use pos_ledger::{Block, Transaction};

    fn request_for(parent: &Block) -> ValidateBlockMessage {
        let tx = Transaction::new(1, "alice", "bob", 10.0, 1.0);
        ValidateBlockMessage {
            round: 7,
            candidate: Block::new(parent.index + 1, vec![tx], parent.hash.clone(), "p".into()),
            reference: parent.clone(),
            forks: None,
        }
    }

    fn candidate(address: &str, reputation: f64, malicious: bool) -> CandidateInfo {
        CandidateInfo {
            address: address.into(),
            reputation,
            malicious,
        }
    }

    #[test]
    fn test_honest_and_malicious_verdicts() {
        let genesis = Block::genesis(0);
        let (honest, _h) = Validator::new("h", false, 1.0, 5.0, vec![genesis.clone()]);
        let (liar, _l) = Validator::new("m", true, 1.0, 5.0, vec![genesis.clone()]);

        let good = request_for(&genesis);
        assert!(evaluate_block(&honest, &good));
        assert!(!evaluate_block(&liar, &good));

        let mut bad = request_for(&genesis);
        bad.reference = Block::genesis(1);
        assert!(!evaluate_block(&honest, &bad));
        assert!(evaluate_block(&liar, &bad));
    }

    #[test]
    fn test_confirmed_transaction_is_rejected() {
        let genesis = Block::genesis(0);
        let (honest, _h) = Validator::new("h", false, 1.0, 5.0, vec![genesis.clone()]);
        let request = request_for(&genesis);
        honest.pool().confirm(&request.candidate.transactions);

        assert!(!evaluate_block(&honest, &request));
    }

    #[test]
    fn test_malicious_balances_forks() {
        let genesis = Block::genesis(0);
        let (liar, _l) = Validator::new("m", true, 1.0, 5.0, vec![genesis.clone()]);
        let mut request = request_for(&genesis);

        request.forks = Some(ForkContext {
            lengths: [3, 2],
            proposer_view: 1,
        });
        assert!(evaluate_block(&liar, &request));

        request.forks = Some(ForkContext {
            lengths: [3, 2],
            proposer_view: 0,
        });
        assert!(!evaluate_block(&liar, &request));
    }

    #[test]
    fn test_ballots() {
        let request = DelegateVoteRequestMessage {
            election: 1,
            delegate_count: 2,
            candidates: vec![
                candidate("a", 9.0, false),
                candidate("b", 2.0, true),
                candidate("c", 7.0, false),
                candidate("d", 1.0, true),
            ],
        };

        assert_eq!(rank_candidates(false, &request), vec!["a", "c"]);
        assert_eq!(rank_candidates(true, &request), vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_node_applies_verified_block_and_votes() {
        let genesis = Block::genesis(0);
        let (validator, endpoints) = Validator::new("v", false, 1.0, 5.0, vec![genesis.clone()]);
        let handle = ValidatorNode::new(validator.clone(), endpoints).spawn();

        let request = request_for(&genesis);
        validator
            .send(AgentMessage::VerifiedBlock(VerifiedBlockMessage {
                transactions: request.candidate.transactions.clone(),
                block: request.candidate.clone(),
            }))
            .unwrap();
        // Same transactions again: already confirmed, so rejected
        validator.send(AgentMessage::ValidateBlock(request)).unwrap();

        match validator.recv_reply(None).await {
            Some(AgentMessage::ValidationStatus(status)) => {
                assert_eq!(status.round, 7);
                assert!(!status.is_valid);
            }
            other => panic!("unexpected reply {:?}", other.map(|m| m.kind())),
        }
        assert_eq!(validator.chain_len(), 2);
        assert!(validator.pool().is_confirmed(1));

        handle.abort();
    }
}
