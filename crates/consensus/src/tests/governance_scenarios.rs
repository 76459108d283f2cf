use super::*;
use crate::orchestrator::SkipReason;
use crate::types::{AttackMode, GovernanceKind};
use crate::user::submit_transfer;

fn balance_config() -> SimulationConfig {
    SimulationConfig {
        attack: AttackMode::Balance,
        ..test_config()
    }
}

#[tokio::test]
async fn test_honest_proposer_extends_its_own_view() {
    let registry = Arc::new(Registry::new());
    let mut orchestrator = orchestrator(&registry, balance_config());
    let a = join_validator(&orchestrator, "a", false, 100.0, 5.0);
    let b = join_validator(&orchestrator, "b", false, 100.0, 5.0);
    join_user(&registry, "alice", 100.0);
    join_user(&registry, "bob", 100.0);
    assert_eq!(orchestrator.chain().lengths(), [1, 1]);

    submit_transfer(&registry, "alice", "bob", 10.0, 1.0).unwrap();
    let report = orchestrator.run_round().await.unwrap();
    let decision = decided(&report.outcome);

    assert_eq!(a.view(), 0);
    assert_eq!(b.view(), 1);
    assert_eq!(report.governance, "balance-attack");
    assert_eq!(decision.committee_size, 1);

    let proposer = registry.validators.get(&decision.proposer).unwrap();
    assert_eq!(decision.fork, proposer.view());

    let lengths = orchestrator.chain().lengths();
    assert_eq!(lengths[decision.fork], 2);
    assert_eq!(lengths[1 - decision.fork], 1);
    assert_eq!(report.chains.len(), 2);
}

#[tokio::test]
async fn test_malicious_proposers_keep_forks_balanced() {
    let registry = Arc::new(Registry::new());
    let mut orchestrator = orchestrator(&registry, balance_config());
    join_validator(&orchestrator, "m0", true, 100.0, 5.0);
    join_validator(&orchestrator, "m1", true, 100.0, 5.0);
    join_user(&registry, "alice", 100.0);
    join_user(&registry, "bob", 100.0);

    submit_transfer(&registry, "alice", "bob", 1.0, 0.1).unwrap();
    let first = orchestrator.run_round().await.unwrap();
    assert_eq!(decided(&first.outcome).fork, 1);
    assert_eq!(orchestrator.chain().lengths(), [1, 2]);
    settle().await;

    submit_transfer(&registry, "alice", "bob", 1.0, 0.1).unwrap();
    let second = orchestrator.run_round().await.unwrap();
    assert_eq!(decided(&second.outcome).fork, 0);
    assert_eq!(orchestrator.chain().lengths(), [2, 2]);
}

#[tokio::test]
async fn test_forked_chain_is_never_reconciled() {
    let registry = Arc::new(Registry::new());
    let config = SimulationConfig {
        reconcile_interval: 1,
        ..balance_config()
    };
    let mut orchestrator = orchestrator(&registry, config);
    join_validator(&orchestrator, "a", false, 100.0, 5.0);

    orchestrator.run_round().await.unwrap();
    assert!(orchestrator.chain().is_forked());
    assert_eq!(orchestrator.stats().reconciliations, 0);
}

#[tokio::test]
async fn test_delegates_rotate_and_are_re_elected() {
    let registry = Arc::new(Registry::new());
    let config = SimulationConfig {
        governance: GovernanceKind::Reputation,
        delegate_size: 2,
        ..test_config()
    };
    let mut orchestrator = orchestrator(&registry, config);
    let a = join_validator(&orchestrator, "a", false, 100.0, 9.0);
    let b = join_validator(&orchestrator, "b", false, 100.0, 8.0);
    let c = join_validator(&orchestrator, "c", false, 100.0, 1.0);
    join_validator(&orchestrator, "d", false, 100.0, 1.0);
    join_user(&registry, "alice", 100.0);
    join_user(&registry, "bob", 100.0);

    submit_transfer(&registry, "alice", "bob", 10.0, 1.0).unwrap();
    let report = orchestrator.run_round().await.unwrap();
    let decision = decided(&report.outcome);
    assert_eq!(report.governance, "reputation");
    assert_eq!(decision.proposer, "a");
    assert_eq!(decision.committee_size, 2);
    assert!(decision.is_valid);
    // Every ballot earns one point
    assert_eq!(c.reputation(), 2.0);
    assert_eq!(a.reputation(), 10.0);
    settle().await;

    for _ in 2..=4 {
        let report = orchestrator.run_round().await.unwrap();
        assert!(matches!(
            report.outcome,
            RoundOutcome::Skipped(SkipReason::BlockAssembly(_))
        ));
        settle().await;
    }
    assert_eq!(a.snapshot().proposer_count, 2);
    assert_eq!(b.snapshot().proposer_count, 2);
    assert_eq!(c.reputation(), 2.0);
    assert_eq!(c.snapshot().committee_count, 0);

    orchestrator.run_round().await.unwrap();
    assert_eq!(c.reputation(), 3.0);
    assert_eq!(a.snapshot().proposer_count, 3);
}
