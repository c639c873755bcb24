//! Molt - Type Definitions
//!
//! All shared types for the skill evolution manager.

use serde::{Deserialize, Serialize};

// ─── Skills ──────────────────────────────────────────────────────

/// A discovered skill: an independently versioned directory of
/// functionality owned by this manager.
///
/// Records are re-derived from raw metadata on every discovery pass;
/// classification never reads prior derived fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    pub name: String,
    pub description: String,
    /// On-disk location of the skill directory. Owned, not shared.
    pub path: String,
    pub category: String,
    pub subcategory: String,
    pub complexity: ComplexityTier,
    pub risk: RiskTier,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Medium,
    Complex,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Standard,
    High,
    Critical,
}

// ─── Audit ───────────────────────────────────────────────────────

/// The immutable output of one audit pass over one skill.
///
/// A verdict belongs to exactly one execution cycle and is never
/// mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditVerdict {
    pub skill_name: String,
    pub timestamp: String,
    pub issues: Vec<Issue>,
    pub security_score: u8,
    pub logic_score: u8,
    pub recommendations: Vec<String>,
    pub safe_to_upgrade: bool,
    /// Tree fingerprint measured during the audit, before any mutation
    /// is attempted.
    pub fingerprint_before: String,
}

impl AuditVerdict {
    /// Worst severity present in the verdict, if any issue was found.
    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Returns `true` when any issue of the given family is present.
    pub fn has_family(&self, family: IssueFamily) -> bool {
        self.issues.iter().any(|i| i.kind.family() == family)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// Best-effort `file:line` hint for issues tied to a location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ForbiddenPattern,
    MissingRequiredMarker,
    SensitiveOperation,
    UnreadableFile,
    MissingDescription,
    IncompleteUsageGuide,
    MissingExamples,
    OversizedSkill,
}

impl IssueKind {
    /// Which family an issue belongs to. The family drives the upgrade
    /// decision: performance findings are advisory only.
    pub fn family(self) -> IssueFamily {
        match self {
            IssueKind::ForbiddenPattern
            | IssueKind::MissingRequiredMarker
            | IssueKind::SensitiveOperation
            | IssueKind::UnreadableFile => IssueFamily::Security,
            IssueKind::MissingDescription
            | IssueKind::IncompleteUsageGuide
            | IssueKind::MissingExamples => IssueFamily::Logic,
            IssueKind::OversizedSkill => IssueFamily::Performance,
        }
    }

    /// Whether this issue kind carries weight in the security score.
    /// Documentation-marker and sensitive-operation findings are
    /// reported but unscored.
    pub fn scores_security(self) -> bool {
        matches!(self, IssueKind::ForbiddenPattern | IssueKind::UnreadableFile)
    }

    /// Whether this issue kind carries weight in the logic score.
    pub fn scores_logic(self) -> bool {
        matches!(
            self,
            IssueKind::MissingDescription
                | IssueKind::IncompleteUsageGuide
                | IssueKind::MissingExamples
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueFamily {
    Security,
    Logic,
    Performance,
}

/// Issue severity, ordered from least to most severe.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

// ─── Scheduling ──────────────────────────────────────────────────

/// A scheduled evolution task. Owned exclusively by the scheduler;
/// other components reference tasks by id only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionTask {
    pub task_id: String,
    pub skill_name: String,
    pub category: String,
    /// 0-10, 10 = highest.
    pub priority: u8,
    pub status: TaskStatus,
    /// The execution cycle (calendar date) the task was created in.
    pub execution_cycle: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states are purged at the start of the next cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Scheduler counters surfaced by `--status` and the cycle report.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub current_cycle: String,
    pub total_tasks: usize,
    pub pending: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

// ─── History ─────────────────────────────────────────────────────

/// Permanent record of one applied upgrade. Append-only, never deleted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub skill_name: String,
    pub timestamp: String,
    pub fingerprint_before: String,
    pub fingerprint_after: String,
    pub applied_recommendations: Vec<String>,
}

/// Aggregates for one completed evolution cycle.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle: String,
    pub skills_discovered: usize,
    pub audits_run: usize,
    pub upgrades_attempted: usize,
    pub upgrades_succeeded: usize,
    pub upgrades_failed: usize,
    pub success_rate: f64,
}

// ─── Configuration ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoltConfig {
    /// Skill roots scanned in order; on duplicate names the first root wins.
    pub skill_roots: Vec<String>,
    pub workspace_dir: String,
    pub scheduler_state_path: String,
    pub ledger_db_path: String,
    pub log_level: LogLevel,
    /// Minimum security score for a skill to be considered upgrade-safe.
    pub security_score_floor: u8,
    /// Minimum logic score for a skill to be considered upgrade-safe.
    pub logic_score_floor: u8,
    pub max_concurrent_audits: usize,
    /// Bound on a single optimization run; elapsed means failed + rollback.
    pub optimizer_timeout_secs: u64,
    pub daemon_tick_secs: u64,
    /// Tree size above which a skill gets an advisory oversize finding.
    pub max_skill_bytes: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Returns the default `MoltConfig`. Callers override paths as needed.
pub fn default_config() -> MoltConfig {
    MoltConfig {
        skill_roots: vec!["~/.molt/skills".to_string()],
        workspace_dir: "~/.molt".to_string(),
        scheduler_state_path: "~/.molt/evolution_scheduler.json".to_string(),
        ledger_db_path: "~/.molt/ledger.db".to_string(),
        log_level: LogLevel::Info,
        security_score_floor: 80,
        logic_score_floor: 70,
        max_concurrent_audits: 4,
        optimizer_timeout_secs: 300,
        daemon_tick_secs: 300,
        max_skill_bytes: 10 * 1024 * 1024,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_issue_families() {
        assert_eq!(IssueKind::ForbiddenPattern.family(), IssueFamily::Security);
        assert_eq!(IssueKind::MissingDescription.family(), IssueFamily::Logic);
        assert_eq!(IssueKind::OversizedSkill.family(), IssueFamily::Performance);
    }

    #[test]
    fn test_unscored_kinds() {
        assert!(!IssueKind::MissingRequiredMarker.scores_security());
        assert!(!IssueKind::SensitiveOperation.scores_security());
        assert!(IssueKind::ForbiddenPattern.scores_security());
        assert!(IssueKind::MissingExamples.scores_logic());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
