//! Voting protocol - broadcast a candidate, collect one vote per member

use crate::agent::Validator;
use crate::types::{AgentMessage, ValidateBlockMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Votes collected from a committee
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub valid: usize,
    pub invalid: usize,
    /// Each answering member's vote by address
    pub votes: HashMap<String, bool>,
}

impl Tally {
    /// Members that did not return a well-typed vote
    pub fn abstained(&self, committee_size: usize) -> usize {
        committee_size.saturating_sub(self.valid + self.invalid)
    }
}

/// A block is valid when at least half the committee (rounded down) says so.
///
/// This is not a strict majority: 2 of 4 is enough.
pub fn is_block_valid(valid_count: usize, committee_size: usize) -> bool {
    valid_count >= committee_size / 2
}

/// Send each member the validation request built for it.
///
/// Returns the members the request reached.
pub fn broadcast_candidate<F>(committee: &[Arc<Validator>], mut message_for: F) -> Vec<Arc<Validator>>
where
    F: FnMut(&Validator) -> ValidateBlockMessage,
{
    let mut reached = Vec::with_capacity(committee.len());
    for member in committee {
        let msg = message_for(member);
        match member.send(AgentMessage::ValidateBlock(msg)) {
            Ok(()) => reached.push(member.clone()),
            Err(e) => tracing::warn!("Validation request not delivered: {}", e),
        }
    }
    reached
}

/// Receive one reply from each member, in committee order.
///
/// Replies that are not a validation status are logged and left out of the
/// tally, as are members that time out or hang up. A status tagged with an
/// earlier round arrived after that round gave up on it; it is dropped and
/// the member's wait continues.
pub async fn collect_votes(
    committee: &[Arc<Validator>],
    round: u64,
    timeout: Option<Duration>,
) -> Tally {
    let mut tally = Tally::default();

    for member in committee {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let vote = loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match member.recv_reply(remaining).await {
                Some(AgentMessage::ValidationStatus(status)) if status.round == round => {
                    break Some(status.is_valid);
                }
                Some(AgentMessage::ValidationStatus(status)) => {
                    tracing::debug!(
                        "Validator {} late vote for round {} discarded",
                        member.short_id(),
                        status.round
                    );
                }
                Some(other) => {
                    tracing::warn!(
                        "Validator {} replied with unexpected {} message",
                        member.short_id(),
                        other.kind()
                    );
                    break None;
                }
                None => {
                    tracing::warn!("Validator {} abstained", member.short_id());
                    break None;
                }
            }
        };

        let Some(is_valid) = vote else { continue };
        tracing::debug!(
            "Validator {} voted {}",
            member.short_id(),
            if is_valid { "valid" } else { "invalid" }
        );
        tally.votes.insert(member.address().to_string(), is_valid);
        if is_valid {
            tally.valid += 1;
        } else {
            tally.invalid += 1;
        }
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationStatusMessage;
    use pos_ledger::Block;

    #[test]
    fn test_decision_boundary() {
        assert!(is_block_valid(2, 4));
        assert!(!is_block_valid(1, 4));
        assert!(is_block_valid(2, 5));
        assert!(!is_block_valid(1, 5));
        assert!(is_block_valid(0, 1));
        assert!(is_block_valid(0, 0));
    }

    #[tokio::test]
    async fn test_collect_skips_unexpected_shapes() {
        let genesis = Block::genesis(0);
        let (a, a_end) = Validator::new("a", false, 1.0, 5.0, vec![genesis.clone()]);
        let (b, b_end) = Validator::new("b", false, 1.0, 5.0, vec![genesis.clone()]);
        let (c, c_end) = Validator::new("c", false, 1.0, 5.0, vec![genesis.clone()]);

        a_end
            .outbound
            .send(AgentMessage::ValidationStatus(ValidationStatusMessage { round: 1, is_valid: true }))
            .unwrap();
        b_end
            .outbound
            .send(AgentMessage::ValidateBlock(ValidateBlockMessage {
                round: 1,
                candidate: genesis.clone(),
                reference: genesis.clone(),
                forks: None,
            }))
            .unwrap();
        c_end
            .outbound
            .send(AgentMessage::ValidationStatus(ValidationStatusMessage {
                round: 1,
                is_valid: false,
            }))
            .unwrap();

        let tally = collect_votes(&[a, b, c], 1, None).await;
        assert_eq!(tally.valid, 1);
        assert_eq!(tally.invalid, 1);
        assert_eq!(tally.abstained(3), 1);
        assert!(!tally.votes.contains_key("b"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_live_members() {
        let genesis = Block::genesis(0);
        let (a, mut a_end) = Validator::new("a", false, 1.0, 5.0, vec![genesis.clone()]);
        let (b, b_end) = Validator::new("b", false, 1.0, 5.0, vec![genesis.clone()]);
        drop(b_end);

        let reached = broadcast_candidate(&[a, b], |_| ValidateBlockMessage {
            round: 1,
            candidate: genesis.clone(),
            reference: genesis.clone(),
            forks: None,
        });

        assert_eq!(reached.len(), 1);
        assert!(matches!(a_end.inbound.try_recv(), Ok(AgentMessage::ValidateBlock(_))));
    }

    #[tokio::test]
    async fn test_late_vote_is_not_counted_in_the_next_round() {
        let genesis = Block::genesis(0);
        let (a, a_end) = Validator::new("a", false, 1.0, 5.0, vec![genesis]);
        let timeout = Some(Duration::from_millis(10));

        let first = collect_votes(&[a.clone()], 1, timeout).await;
        assert_eq!(first.abstained(1), 1);

        // Round 1 answer shows up after its round gave up, then round 2's
        a_end
            .outbound
            .send(AgentMessage::ValidationStatus(ValidationStatusMessage {
                round: 1,
                is_valid: false,
            }))
            .unwrap();
        a_end
            .outbound
            .send(AgentMessage::ValidationStatus(ValidationStatusMessage {
                round: 2,
                is_valid: true,
            }))
            .unwrap();

        let second = collect_votes(&[a], 2, timeout).await;
        assert_eq!(second.votes.get("a"), Some(&true));
        assert_eq!(second.valid, 1);
        assert_eq!(second.invalid, 0);
    }
}
