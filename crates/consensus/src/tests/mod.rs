//! End-to-end round scenarios with live validator tasks

mod governance_scenarios;

use crate::agent::{User, Validator};
use crate::orchestrator::{Decision, Orchestrator, OrchestratorBuilder, RoundOutcome};
use crate::registry::Registry;
use crate::types::SimulationConfig;
use crate::validator::ValidatorNode;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> SimulationConfig {
    SimulationConfig {
        slot_ms: 10,
        reconcile_interval: 100,
        vote_timeout_ms: Some(1_000),
        seed: Some(42),
        ..Default::default()
    }
}

fn orchestrator(registry: &Arc<Registry>, config: SimulationConfig) -> Orchestrator {
    OrchestratorBuilder::new(registry.clone())
        .config(config)
        .build()
        .unwrap()
}

/// Register a validator on the orchestrator's genesis and start its task
fn join_validator(
    orchestrator: &Orchestrator,
    address: &str,
    malicious: bool,
    stake: f64,
    reputation: f64,
) -> Arc<Validator> {
    let genesis = orchestrator.chain().chain(0)[..1].to_vec();
    let (validator, endpoints) = Validator::new(address, malicious, stake, reputation, genesis);
    orchestrator
        .context()
        .registry
        .validators
        .add(validator.clone())
        .unwrap();
    ValidatorNode::new(validator.clone(), endpoints).spawn();
    validator
}

fn join_user(registry: &Registry, name: &str, balance: f64) -> Arc<User> {
    registry.users.add(User::new(name, balance)).unwrap()
}

/// Let validator tasks drain their inboxes between rounds
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn decided(outcome: &RoundOutcome) -> &Decision {
    match outcome {
        RoundOutcome::Decided(decision) => decision,
        RoundOutcome::Skipped(reason) => panic!("round skipped: {:?}", reason),
    }
}
