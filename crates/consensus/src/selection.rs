//! Selection engine - committees, proposers and delegates

use crate::agent::Validator;
use crate::economics::bump_reputation;
use crate::registry::ValidatorRegistry;
use crate::types::DelegateVoteRequestMessage;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Weighted sampling without replacement.
///
/// Each draw is proportional to the remaining weights; a drawn index drops
/// to zero weight. The sampler is exhausted once no positive weight is left.
pub struct WeightedSampler {
    weights: Vec<f64>,
    dist: Option<WeightedIndex<f64>>,
}

impl WeightedSampler {
    pub fn new(weights: &[f64]) -> Self {
        // Negative or non-finite stake never wins a draw
        let weights: Vec<f64> = weights
            .iter()
            .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
            .collect();
        let dist = WeightedIndex::new(&weights).ok();
        Self { weights, dist }
    }

    /// Whether any index can still be drawn
    pub fn is_exhausted(&self) -> bool {
        self.dist.is_none() || !self.weights.iter().any(|w| *w > 0.0)
    }

    /// Draw one index, or `None` once exhausted
    pub fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.is_exhausted() {
            return None;
        }
        let dist = self.dist.as_mut()?;
        let index = dist.sample(rng);
        if self.weights[index] <= 0.0 {
            self.dist = None;
            return None;
        }

        self.weights[index] = 0.0;
        if !self.weights.iter().any(|w| *w > 0.0) || dist.update_weights(&[(index, &0.0)]).is_err() {
            self.dist = None;
        }
        Some(index)
    }
}

/// Draw up to `size` distinct validators weighted by stake.
///
/// The registry lock is held only while the weight vector is copied.
pub fn choose_validation_committee<R: Rng + ?Sized>(
    registry: &ValidatorRegistry,
    size: usize,
    rng: &mut R,
) -> Vec<Arc<Validator>> {
    let (validators, weights) = registry.stake_weights();
    let mut sampler = WeightedSampler::new(&weights);

    let mut committee = Vec::with_capacity(size.min(validators.len()));
    for _ in 0..size {
        match sampler.take(rng) {
            Some(index) => committee.push(validators[index].clone()),
            None => break,
        }
    }
    committee
}

/// Index of the first weight whose running sum reaches `target`
pub fn cumulative_pick(weights: &[f64], target: f64) -> Option<usize> {
    let mut sum = 0.0;
    for (i, weight) in weights.iter().enumerate() {
        sum += weight;
        if sum >= target {
            return Some(i);
        }
    }
    None
}

/// Single stake-weighted draw by cumulative-weight inversion
pub fn choose_block_proposer<R: Rng + ?Sized>(
    candidates: &[Arc<Validator>],
    rng: &mut R,
) -> Option<Arc<Validator>> {
    if candidates.is_empty() {
        return None;
    }

    let weights: Vec<f64> = candidates.iter().map(|v| v.stake()).collect();
    let total: f64 = weights.iter().sum();
    let target = rng.gen::<f64>() * total;

    cumulative_pick(&weights, target).map(|i| candidates[i].clone())
}

/// Uniform committee of a third of `validators` (at least one member)
pub fn choose_uniform_committee<R: Rng + ?Sized>(
    validators: &[Arc<Validator>],
    rng: &mut R,
) -> Vec<Arc<Validator>> {
    if validators.is_empty() {
        return Vec::new();
    }
    let mut shuffled = validators.to_vec();
    shuffled.shuffle(rng);
    shuffled.truncate((validators.len() / 3).max(1));
    shuffled
}

/// Rank candidates by descending endorsements, address order breaking ties
pub fn tally_delegate_votes(tally: &HashMap<String, usize>) -> Vec<String> {
    let mut ranked: Vec<(&String, &usize)> = tally.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().map(|(address, _)| address.clone()).collect()
}

/// Elect `size` delegates by polling every validator.
///
/// Every validator that answers gains one reputation point, whoever it
/// voted for. Without a timeout a silent validator stalls the election.
/// Ballots left over from an earlier election are skipped.
pub async fn choose_delegates(
    registry: &ValidatorRegistry,
    size: usize,
    election: u64,
    timeout: Option<Duration>,
) -> Vec<Arc<Validator>> {
    let validators = registry.snapshot();
    let candidates: Vec<_> = validators.iter().map(|v| v.candidate_info()).collect();

    let mut polled = Vec::with_capacity(validators.len());
    for validator in &validators {
        let request = DelegateVoteRequestMessage {
            election,
            delegate_count: size,
            candidates: candidates.clone(),
        };
        match validator.request_delegate_vote(request) {
            Ok(()) => polled.push(validator.clone()),
            Err(e) => tracing::warn!("Delegate request not delivered: {}", e),
        }
    }

    let mut tally: HashMap<String, usize> = HashMap::new();
    for validator in &polled {
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let ballot = loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match validator.recv_delegate_vote(remaining).await {
                Some(ballot) if ballot.election == election => break Some(ballot),
                Some(stale) => tracing::debug!(
                    "Validator {} ballot for election {} discarded",
                    validator.short_id(),
                    stale.election
                ),
                None => break None,
            }
        };
        let Some(ballot) = ballot else {
            tracing::warn!("Validator {} did not return a delegate ballot", validator.short_id());
            continue;
        };

        bump_reputation(&mut validator.state());

        for address in ballot.votes {
            *tally.entry(address).or_insert(0) += 1;
        }
    }

    let by_address: HashMap<&str, &Arc<Validator>> =
        validators.iter().map(|v| (v.address(), v)).collect();

    tally_delegate_votes(&tally)
        .iter()
        .filter_map(|address| by_address.get(address.as_str()).map(|v| (*v).clone()))
        .take(size)
        .collect()
}
