//! Skill Discovery
//!
//! Walks the configured skill roots in order and builds the registry of
//! `SkillRecord`s. Discovery is a pure read of the filesystem: records
//! are re-derived from raw metadata every pass, so running it twice over
//! an unchanged tree yields an identical registry.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::registry::classify;
use crate::registry::metadata::{parse_metadata, METADATA_FILENAME};
use crate::types::SkillRecord;

/// Discover all skills under `roots`, in root order.
///
/// A skill is an immediate subdirectory containing a `SKILL.md` with a
/// parseable `name`. Subdirectories without one are skipped, unreadable
/// metadata is logged and skipped, and duplicate names are shadowed:
/// the first discovered root wins, later duplicates are dropped.
pub fn discover(roots: &[String]) -> BTreeMap<String, SkillRecord> {
    let mut skills: BTreeMap<String, SkillRecord> = BTreeMap::new();

    for root in roots {
        let root_path = Path::new(root);
        if !root_path.is_dir() {
            debug!("Skill root {} does not exist, skipping", root);
            continue;
        }

        let entries = match fs::read_dir(root_path) {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot read skill root {}: {}", root, e);
                continue;
            }
        };

        // Sort entries so discovery order (and shadowing within a root)
        // is deterministic across platforms.
        let mut dirs: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            match load_record(&dir) {
                Some(record) => {
                    if skills.contains_key(&record.name) {
                        debug!(
                            "Skill '{}' at {} shadowed by an earlier root",
                            record.name,
                            dir.display()
                        );
                        continue;
                    }
                    skills.insert(record.name.clone(), record);
                }
                None => {
                    debug!("No usable skill metadata in {}", dir.display());
                }
            }
        }
    }

    skills
}

/// Build a single `SkillRecord` from a skill directory, or `None` when
/// the directory has no parseable metadata.
fn load_record(dir: &Path) -> Option<SkillRecord> {
    let metadata_path = dir.join(METADATA_FILENAME);
    if !metadata_path.exists() {
        return None;
    }

    let content = match fs::read_to_string(&metadata_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Cannot read {}: {}", metadata_path.display(), e);
            return None;
        }
    };

    let meta = parse_metadata(&content)?;

    let (category, subcategory) = classify::categorize(&meta.name, &meta.description);
    let complexity = classify::assess_complexity(&meta.name, &meta.description);
    let risk = classify::assess_risk(&meta.name, &meta.description);

    Some(SkillRecord {
        name: meta.name,
        description: meta.description,
        path: dir.to_string_lossy().to_string(),
        category,
        subcategory,
        complexity,
        risk,
    })
}
