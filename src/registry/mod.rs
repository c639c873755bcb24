//! Skill Registry
//!
//! Discovers skill directories under the configured roots, parses their
//! metadata headers, and classifies each skill by category, complexity,
//! and risk.

pub mod classify;
pub mod discover;
pub mod metadata;

pub use discover::discover;
pub use metadata::{parse_metadata, SkillMetadata, METADATA_FILENAME};
