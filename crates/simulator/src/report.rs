//! Round reporting

use pos_consensus::{RoundOutcome, RoundReport};
use tokio::sync::broadcast::{self, error::RecvError};

/// Render a chain as `->[1,2]->[3]`, skipping the genesis block
pub fn render_chain(blocks: &[Vec<u64>]) -> String {
    blocks
        .iter()
        .skip(1)
        .map(|ids| {
            let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
            format!("->[{}]", ids.join(","))
        })
        .collect()
}

/// One-line summary of a round outcome
pub fn summarize(report: &RoundReport) -> String {
    match &report.outcome {
        RoundOutcome::Skipped(reason) => format!("round {} skipped ({:?})", report.round, reason),
        RoundOutcome::Decided(decision) => format!(
            "round {}: block {} from {} on fork {} {} ({} valid / {} invalid)",
            report.round,
            decision.block_index,
            pos_consensus::agent::short_id(&decision.proposer),
            decision.fork,
            if decision.is_valid { "accepted" } else { "rejected" },
            decision.valid_count,
            decision.invalid_count
        ),
    }
}

fn log_report(report: &RoundReport, json: bool) {
    tracing::info!("{}", summarize(report));

    for (fork, chain) in report.chains.iter().enumerate() {
        if report.chains.len() > 1 {
            tracing::info!("Fork {}: {}", fork, render_chain(chain));
        } else {
            tracing::info!("Chain: {}", render_chain(chain));
        }
    }

    for (name, balance) in &report.users {
        tracing::debug!("{}: {:.6}", name, balance);
    }
    for v in &report.validators {
        tracing::debug!(
            "{}: stake {:.6}, reputation {:.6}, committee {}",
            pos_consensus::agent::short_id(&v.address),
            v.stake,
            v.reputation,
            v.committee_count
        );
    }

    if json {
        match serde_json::to_string(report) {
            Ok(line) => tracing::info!(target: "pos_sim::report", "{}", line),
            Err(e) => tracing::warn!("Failed to encode round report: {}", e),
        }
    }
}

/// Log every published round until the orchestrator goes away
pub async fn run_reporter(mut reports: broadcast::Receiver<RoundReport>, json: bool) {
    loop {
        match reports.recv().await {
            Ok(report) => log_report(&report, json),
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!("Reporter fell behind, {} rounds not shown", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
