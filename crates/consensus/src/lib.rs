//! PoS consensus - committee voting, slashing and fork modelling
//!
//! Architecture:
//! - One orchestrator advances time slots and runs a consensus round per slot
//! - Validator and user agents run as their own tasks and talk to the
//!   orchestrator over typed channels only
//! - Governance variants (stake, reputation, balance attack) plug into the
//!   round through the `Governance` trait
//! - Every few rounds the longest local chain is adopted network-wide

pub mod agent;
pub mod economics;
pub mod error;
pub mod fork;
pub mod governance;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod selection;
pub mod types;
pub mod user;
pub mod validator;
pub mod voting;

#[cfg(test)]
mod tests;

pub use agent::{User, Validator, ValidatorEndpoints, ValidatorState, MAX_REPUTATION};
pub use economics::EconomicsPolicy;
pub use error::{ConsensusError, ConsensusResult};
pub use fork::{BalancingForkStrategy, ChainState, ForkStrategy};
pub use governance::{BalanceAttackGovernance, Governance, ReputationGovernance, StakeGovernance};
pub use orchestrator::{
    ConsensusStats, Decision, Orchestrator, OrchestratorBuilder, RoundOutcome, RoundReport, SimulationContext,
    SkipReason, ValidatorSummary,
};
pub use registry::{Registry, UserLedger, ValidatorRegistry};
pub use types::*;
pub use user::{submit_transfer, UserNode};
pub use validator::ValidatorNode;
