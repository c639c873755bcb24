//! Optimization Backend
//!
//! The pluggable operation that actually rewrites a skill. The core
//! treats it as opaque: it only inspects the boolean result plus the
//! fingerprint delta, and it is always invoked between a snapshot and a
//! verify step, so a misbehaving backend cannot leave a skill
//! half-applied.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Optimizer: Send + Sync {
    /// Apply the optimization to the skill tree at `skill_path`.
    ///
    /// Returns `Ok(true)` when the backend reports success. Errors and
    /// `Ok(false)` are both treated as failure by the caller, which
    /// restores the pre-upgrade snapshot.
    async fn apply(&self, skill_path: &Path, recommendations: &[String]) -> Result<bool>;
}

/// Placeholder backend that reports success without touching the tree.
/// Every upgrade run against it resolves as a no-change failure, leaving
/// skills untouched.
// TODO: replace with a patch-generation backend once one is wired up.
pub struct NoopOptimizer;

#[async_trait]
impl Optimizer for NoopOptimizer {
    async fn apply(&self, _skill_path: &Path, _recommendations: &[String]) -> Result<bool> {
        Ok(true)
    }
}
