//! Evolution Orchestrator
//!
//! Glues discovery, auditing, scheduling, and the ledger into the
//! per-cycle upgrade flow: backup, apply, verify, commit or roll back.

pub mod backup;
pub mod optimizer;
pub mod orchestrator;

pub use optimizer::{NoopOptimizer, Optimizer};
pub use orchestrator::{should_upgrade, EvolutionOrchestrator};
