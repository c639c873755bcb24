//! Skill Auditor
//!
//! Deterministic static checks over a skill's file tree producing a
//! scored, itemized verdict. The check batteries live in `rules`; the
//! auditor itself gathers content, applies the batteries, scores the
//! result, and decides whether the skill is safe to upgrade.

pub mod auditor;
pub mod rules;

pub use auditor::{AuditPolicy, SkillAuditor};
