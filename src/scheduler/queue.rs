//! Evolution Task Queue
//!
//! An explicitly constructed scheduler instance owning its persistence
//! path. Every mutation is written to disk before the call returns, so
//! in-memory and on-disk state never diverge past a single transition.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Local, Utc};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::scheduler::state::{load_state, save_state, SchedulerState};
use crate::types::{AuditVerdict, EvolutionTask, ExecutionStats, Severity, TaskStatus};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Consistency violations callers must be able to distinguish from I/O
/// failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("illegal task transition {from:?} -> {to:?} for task {task_id}")]
    IllegalTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("unknown task id {0}")]
    UnknownTask(String),
}

// ---------------------------------------------------------------------------
// Foreground priority
// ---------------------------------------------------------------------------

/// Source of the host's current foreground priority: whatever task the
/// surrounding system is presently serving.
pub trait ForegroundProbe: Send + Sync {
    /// Current foreground priority, 0-10.
    fn current_priority(&self) -> u8;
}

/// A fixed foreground priority, for the CLI and for tests.
pub struct FixedForeground(pub u8);

impl ForegroundProbe for FixedForeground {
    fn current_priority(&self) -> u8 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Legal task transitions: `pending -> running -> {completed | failed}`,
/// with `paused` reachable from `running` and returning to `pending`.
/// No skipped or reversed transitions.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    matches!(
        (from, to),
        (TaskStatus::Pending, TaskStatus::Running)
            | (TaskStatus::Running, TaskStatus::Completed)
            | (TaskStatus::Running, TaskStatus::Failed)
            | (TaskStatus::Running, TaskStatus::Paused)
            | (TaskStatus::Paused, TaskStatus::Pending)
    )
}

/// Current execution cycle identifier: the local calendar date.
pub fn current_cycle_id() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Map a verdict's worst severity to a task priority (0-10, 10 highest).
pub fn derive_priority(verdict: &AuditVerdict) -> u8 {
    match verdict.max_severity() {
        Some(Severity::Critical) => 7,
        Some(Severity::High) => 5,
        Some(Severity::Medium) => 3,
        Some(Severity::Low) => 2,
        None => 1,
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct EvolutionScheduler {
    state_path: PathBuf,
    tasks: Vec<EvolutionTask>,
    current_cycle: String,
}

impl EvolutionScheduler {
    /// Open (or initialize) the scheduler backed by the state file at
    /// `state_path`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let mut scheduler = match load_state(state_path)? {
            Some(state) => Self {
                state_path: state_path.to_path_buf(),
                tasks: state.tasks,
                current_cycle: state.current_execution_cycle,
            },
            None => Self {
                state_path: state_path.to_path_buf(),
                tasks: Vec::new(),
                current_cycle: String::new(),
            },
        };

        if scheduler.current_cycle.is_empty() {
            scheduler.current_cycle = current_cycle_id();
            scheduler.save()?;
        }

        Ok(scheduler)
    }

    pub fn current_cycle(&self) -> &str {
        &self.current_cycle
    }

    pub fn tasks(&self) -> &[EvolutionTask] {
        &self.tasks
    }

    pub fn get_task(&self, task_id: &str) -> Option<&EvolutionTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Whether the stored cycle id no longer matches the calendar date.
    pub fn should_start_new_cycle(&self) -> bool {
        current_cycle_id() != self.current_cycle
    }

    /// Roll over to the current calendar date.
    ///
    /// Terminal tasks from prior cycles are purged (their history lives
    /// in the permanent ledger, not here) and paused tasks re-enter the
    /// normal decision path as pending. Returns `true` when a rollover
    /// actually happened.
    pub fn start_new_cycle(&mut self) -> Result<bool> {
        if !self.should_start_new_cycle() {
            return Ok(false);
        }

        let cycle = current_cycle_id();
        info!("Starting new evolution cycle: {}", cycle);

        let before = self.tasks.len();
        self.tasks.retain(|t| !t.status.is_terminal());
        let purged = before - self.tasks.len();
        if purged > 0 {
            debug!("Purged {} terminal task(s) from prior cycles", purged);
        }

        for task in self.tasks.iter_mut() {
            if task.status == TaskStatus::Paused {
                task.status = TaskStatus::Pending;
            }
        }

        self.current_cycle = cycle;
        self.save()?;
        Ok(true)
    }

    /// Create a pending task for the current cycle and persist it.
    pub fn create_task(
        &mut self,
        skill_name: &str,
        category: &str,
        priority: u8,
    ) -> Result<EvolutionTask> {
        let task = EvolutionTask {
            task_id: Uuid::new_v4().to_string(),
            skill_name: skill_name.to_string(),
            category: category.to_string(),
            priority: priority.min(10),
            status: TaskStatus::Pending,
            execution_cycle: self.current_cycle.clone(),
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
        };

        self.tasks.push(task.clone());
        self.save()?;
        Ok(task)
    }

    /// Whether a task of `task_priority` may begin execution while the
    /// host foreground runs at `foreground_priority`.
    ///
    /// The comparison direction is a fixed contract: evolution work is
    /// admitted only when it would not be privileged over current
    /// foreground work, i.e. `task_priority <= foreground_priority`.
    /// Do not "fix" this to the conventional higher-priority-wins rule.
    pub fn can_execute(task_priority: u8, foreground_priority: u8) -> bool {
        task_priority <= foreground_priority
    }

    /// Move a task through the state machine and persist the change
    /// before returning. Illegal transitions are rejected without
    /// touching any state.
    pub fn update_status(&mut self, task_id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id)
            .ok_or_else(|| SchedulerError::UnknownTask(task_id.to_string()))?;

        if !can_transition(task.status, status) {
            return Err(SchedulerError::IllegalTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: status,
            }
            .into());
        }

        task.status = status;
        let now = Utc::now().to_rfc3339();
        match status {
            TaskStatus::Running => task.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed => task.completed_at = Some(now),
            _ => {}
        }

        self.save()
    }

    /// Coarse-grained cancellation: move every running task to paused.
    /// Partially applied work is never resumed mid-operation, only
    /// retried from scratch after the task returns to pending.
    pub fn pause_all(&mut self) -> Result<usize> {
        let mut paused = 0;
        for task in self.tasks.iter_mut() {
            if task.status == TaskStatus::Running {
                task.status = TaskStatus::Paused;
                paused += 1;
            }
        }
        self.save()?;
        info!("Paused {} running task(s)", paused);
        Ok(paused)
    }

    /// Return all paused tasks to pending.
    pub fn resume_all(&mut self) -> Result<usize> {
        let mut resumed = 0;
        for task in self.tasks.iter_mut() {
            if task.status == TaskStatus::Paused {
                task.status = TaskStatus::Pending;
                resumed += 1;
            }
        }
        self.save()?;
        info!("Resumed {} paused task(s)", resumed);
        Ok(resumed)
    }

    pub fn stats(&self) -> ExecutionStats {
        let count = |s: TaskStatus| self.tasks.iter().filter(|t| t.status == s).count();
        let total = self.tasks.len();
        let completed = count(TaskStatus::Completed);

        ExecutionStats {
            current_cycle: self.current_cycle.clone(),
            total_tasks: total,
            pending: count(TaskStatus::Pending),
            running: count(TaskStatus::Running),
            paused: count(TaskStatus::Paused),
            completed,
            failed: count(TaskStatus::Failed),
            success_rate: completed as f64 / total.max(1) as f64,
        }
    }

    /// Persist current state. A failure here aborts the cycle.
    fn save(&self) -> Result<()> {
        let state = SchedulerState {
            current_execution_cycle: self.current_cycle.clone(),
            tasks: self.tasks.clone(),
        };
        save_state(&self.state_path, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuditVerdict, Issue, IssueKind};
    use tempfile::TempDir;

    fn open_scheduler(dir: &TempDir) -> EvolutionScheduler {
        EvolutionScheduler::open(&dir.path().join("evolution_scheduler.json")).unwrap()
    }

    fn verdict_with_severity(severity: Option<Severity>) -> AuditVerdict {
        let issues = severity
            .map(|s| {
                vec![Issue {
                    kind: IssueKind::ForbiddenPattern,
                    severity: s,
                    message: "x".to_string(),
                    location: None,
                }]
            })
            .unwrap_or_default();
        AuditVerdict {
            skill_name: "sample".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            issues,
            security_score: 90,
            logic_score: 100,
            recommendations: vec![],
            safe_to_upgrade: false,
            fingerprint_before: String::new(),
        }
    }

    #[test]
    fn test_admission_direction_is_leq() {
        // The deliberately inverted contract: background evolution work
        // is admitted only when it does NOT outrank the foreground.
        assert!(!EvolutionScheduler::can_execute(7, 0));
        assert!(!EvolutionScheduler::can_execute(5, 3));
        assert!(EvolutionScheduler::can_execute(3, 5));
        assert!(EvolutionScheduler::can_execute(5, 5));
        assert!(EvolutionScheduler::can_execute(0, 0));
    }

    #[test]
    fn test_priority_derivation() {
        assert_eq!(derive_priority(&verdict_with_severity(Some(Severity::Critical))), 7);
        assert_eq!(derive_priority(&verdict_with_severity(Some(Severity::High))), 5);
        assert_eq!(derive_priority(&verdict_with_severity(Some(Severity::Medium))), 3);
        assert_eq!(derive_priority(&verdict_with_severity(Some(Severity::Low))), 2);
        assert_eq!(derive_priority(&verdict_with_severity(None)), 1);
    }

    #[test]
    fn test_pending_cannot_jump_to_completed() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = open_scheduler(&dir);
        let task = scheduler.create_task("sample", "general", 5).unwrap();

        let err = scheduler
            .update_status(&task.task_id, TaskStatus::Completed)
            .unwrap_err();
        assert!(err.downcast_ref::<SchedulerError>().is_some());

        // Task state is untouched after the rejected transition.
        assert_eq!(
            scheduler.get_task(&task.task_id).unwrap().status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn test_legal_lifecycle_records_timestamps() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = open_scheduler(&dir);
        let task = scheduler.create_task("sample", "general", 5).unwrap();

        scheduler.update_status(&task.task_id, TaskStatus::Running).unwrap();
        assert!(scheduler.get_task(&task.task_id).unwrap().started_at.is_some());

        scheduler.update_status(&task.task_id, TaskStatus::Completed).unwrap();
        let done = scheduler.get_task(&task.task_id).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_pause_and_resume_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = open_scheduler(&dir);
        let task = scheduler.create_task("sample", "general", 5).unwrap();
        scheduler.update_status(&task.task_id, TaskStatus::Running).unwrap();

        assert_eq!(scheduler.pause_all().unwrap(), 1);
        assert_eq!(
            scheduler.get_task(&task.task_id).unwrap().status,
            TaskStatus::Paused
        );

        assert_eq!(scheduler.resume_all().unwrap(), 1);
        assert_eq!(
            scheduler.get_task(&task.task_id).unwrap().status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evolution_scheduler.json");

        let task_id = {
            let mut scheduler = EvolutionScheduler::open(&path).unwrap();
            let task = scheduler.create_task("sample", "general", 5).unwrap();
            scheduler.update_status(&task.task_id, TaskStatus::Running).unwrap();
            task.task_id
        };

        let reopened = EvolutionScheduler::open(&path).unwrap();
        assert_eq!(
            reopened.get_task(&task_id).unwrap().status,
            TaskStatus::Running
        );
        assert_eq!(reopened.current_cycle(), current_cycle_id());
    }

    #[test]
    fn test_new_cycle_purges_terminal_tasks_only() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = open_scheduler(&dir);

        let done = scheduler.create_task("done", "general", 5).unwrap();
        scheduler.update_status(&done.task_id, TaskStatus::Running).unwrap();
        scheduler.update_status(&done.task_id, TaskStatus::Completed).unwrap();

        let failed = scheduler.create_task("failed", "general", 5).unwrap();
        scheduler.update_status(&failed.task_id, TaskStatus::Running).unwrap();
        scheduler.update_status(&failed.task_id, TaskStatus::Failed).unwrap();

        let waiting = scheduler.create_task("waiting", "general", 5).unwrap();

        // Simulate a stored cycle from yesterday, then roll over.
        scheduler.current_cycle = "1999-01-01".to_string();
        assert!(scheduler.should_start_new_cycle());
        assert!(scheduler.start_new_cycle().unwrap());

        assert!(scheduler.get_task(&done.task_id).is_none());
        assert!(scheduler.get_task(&failed.task_id).is_none());
        assert!(scheduler.get_task(&waiting.task_id).is_some());
        assert_eq!(scheduler.current_cycle(), current_cycle_id());
    }

    #[test]
    fn test_new_cycle_unpauses_tasks() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = open_scheduler(&dir);
        let task = scheduler.create_task("sample", "general", 5).unwrap();
        scheduler.update_status(&task.task_id, TaskStatus::Running).unwrap();
        scheduler.pause_all().unwrap();

        scheduler.current_cycle = "1999-01-01".to_string();
        scheduler.start_new_cycle().unwrap();

        assert_eq!(
            scheduler.get_task(&task.task_id).unwrap().status,
            TaskStatus::Pending
        );
    }

    #[test]
    fn test_stats_success_rate() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = open_scheduler(&dir);

        let empty = scheduler.stats();
        assert_eq!(empty.total_tasks, 0);
        assert_eq!(empty.success_rate, 0.0);

        let a = scheduler.create_task("a", "general", 5).unwrap();
        scheduler.update_status(&a.task_id, TaskStatus::Running).unwrap();
        scheduler.update_status(&a.task_id, TaskStatus::Completed).unwrap();
        scheduler.create_task("b", "general", 5).unwrap();

        let stats = scheduler.stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }
}
