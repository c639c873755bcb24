//! Scheduler Persistence
//!
//! The scheduler's on-disk state file: the current execution cycle plus
//! the full task list, as one JSON document. The file is the
//! serialization point for the whole subsystem -- a cycle holds implicit
//! ownership of it for its duration -- and must round-trip exactly.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::EvolutionTask;

/// The full persisted scheduler state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    pub current_execution_cycle: String,
    pub tasks: Vec<EvolutionTask>,
}

/// Load scheduler state from `path`.
///
/// Returns `Ok(None)` when the file does not exist or the document as a
/// whole is unreadable (the caller re-initializes). Individual task
/// records that fail validation are dropped with a warning -- malformed
/// records fail closed, they never produce partially populated tasks.
pub fn load_state(path: &Path) -> Result<Option<SchedulerState>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scheduler state from {}", path.display()))?;

    let doc: serde_json::Value = match serde_json::from_str(&contents) {
        Ok(v) => v,
        Err(e) => {
            warn!(
                "Scheduler state at {} is not valid JSON ({}); starting fresh",
                path.display(),
                e
            );
            return Ok(None);
        }
    };

    let current_execution_cycle = doc
        .get("currentExecutionCycle")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let mut tasks = Vec::new();
    if let Some(raw_tasks) = doc.get("tasks").and_then(|v| v.as_array()) {
        for raw in raw_tasks {
            match serde_json::from_value::<EvolutionTask>(raw.clone()) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!("Dropping malformed task record: {}", e);
                }
            }
        }
    }

    Ok(Some(SchedulerState {
        current_execution_cycle,
        tasks,
    }))
}

/// Persist scheduler state to `path`.
///
/// A write failure here is fatal to the running cycle: state integrity
/// cannot be guaranteed once memory and disk diverge.
pub fn save_state(path: &Path, state: &SchedulerState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create state directory {}", parent.display())
        })?;
    }

    let json = serde_json::to_string_pretty(state).context("Failed to serialize scheduler state")?;

    fs::write(path, &json)
        .with_context(|| format!("Failed to write scheduler state to {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;
    use tempfile::TempDir;

    fn sample_task(id: &str) -> EvolutionTask {
        EvolutionTask {
            task_id: id.to_string(),
            skill_name: "sample".to_string(),
            category: "general".to_string(),
            priority: 5,
            status: TaskStatus::Pending,
            execution_cycle: "2026-08-06".to_string(),
            created_at: "2026-08-06T00:00:00+00:00".to_string(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_round_trip_preserves_logical_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evolution_scheduler.json");

        let state = SchedulerState {
            current_execution_cycle: "2026-08-06".to_string(),
            tasks: vec![sample_task("t1"), sample_task("t2")],
        };

        save_state(&path, &state).unwrap();
        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded, state);

        // Load -> save -> load again must be stable.
        save_state(&path, &loaded).unwrap();
        let again = load_state(&path).unwrap().unwrap();
        assert_eq!(again, state);
    }

    #[test]
    fn test_missing_file_yields_none() {
        let dir = TempDir::new().unwrap();
        let loaded = load_state(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_unparseable_document_yields_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evolution_scheduler.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_state(&path).unwrap().is_none());
    }

    #[test]
    fn test_malformed_task_records_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evolution_scheduler.json");

        let good = serde_json::to_value(sample_task("good")).unwrap();
        let doc = serde_json::json!({
            "currentExecutionCycle": "2026-08-06",
            "tasks": [good, {"taskId": "broken", "status": "sideways"}],
        });
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].task_id, "good");
        assert_eq!(loaded.current_execution_cycle, "2026-08-06");
    }
}
