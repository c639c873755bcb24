//! Skill Audit Pass
//!
//! Runs the rule batteries against a skill's file tree and produces an
//! `AuditVerdict`. One verdict per skill per cycle; verdicts are never
//! mutated after creation.

use std::fs;
use std::path::Path;

use chrono::Utc;
use walkdir::WalkDir;

use crate::audit::rules::{FORBIDDEN_PATTERNS, REQUIRED_MARKERS, SENSITIVE_OPERATIONS};
use crate::fingerprint::fingerprint_tree;
use crate::types::{AuditVerdict, Issue, IssueKind, MoltConfig, Severity, SkillRecord};

/// Tunable audit thresholds. Defaults match the shipped decision rule;
/// override them through `MoltConfig`, not by editing literals.
#[derive(Clone, Copy, Debug)]
pub struct AuditPolicy {
    pub security_score_floor: u8,
    pub logic_score_floor: u8,
    pub max_tree_bytes: u64,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            security_score_floor: 80,
            logic_score_floor: 70,
            max_tree_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AuditPolicy {
    pub fn from_config(config: &MoltConfig) -> Self {
        Self {
            security_score_floor: config.security_score_floor,
            logic_score_floor: config.logic_score_floor,
            max_tree_bytes: config.max_skill_bytes,
        }
    }
}

/// One readable text file under the skill directory.
struct SkillFile {
    rel_path: String,
    text: String,
}

#[derive(Clone, Debug, Default)]
pub struct SkillAuditor {
    policy: AuditPolicy,
}

impl SkillAuditor {
    pub fn new(policy: AuditPolicy) -> Self {
        Self { policy }
    }

    /// Audit one skill directory.
    ///
    /// The fingerprint recorded in the verdict is measured here, before
    /// any mutation can be attempted; the orchestrator re-checks it
    /// immediately before upgrading to guard against racing edits.
    pub fn audit(&self, skill: &SkillRecord) -> AuditVerdict {
        let path = Path::new(&skill.path);
        let mut issues: Vec<Issue> = Vec::new();

        let fingerprint_before = match fingerprint_tree(path) {
            Ok(digest) => digest,
            Err(e) => {
                issues.push(Issue {
                    kind: IssueKind::UnreadableFile,
                    severity: Severity::Critical,
                    message: format!("cannot fingerprint skill tree: {}", e),
                    location: None,
                });
                String::new()
            }
        };

        let (files, total_bytes) = gather_contents(path, &mut issues);

        check_forbidden_patterns(&files, &mut issues);
        check_required_markers(&files, &mut issues);
        check_structure(&files, &mut issues);
        check_sensitive_operations(&files, &mut issues);

        if total_bytes > self.policy.max_tree_bytes {
            issues.push(Issue {
                kind: IssueKind::OversizedSkill,
                severity: Severity::Low,
                message: format!(
                    "skill tree is {:.2} MiB (limit {:.2} MiB)",
                    total_bytes as f64 / (1024.0 * 1024.0),
                    self.policy.max_tree_bytes as f64 / (1024.0 * 1024.0),
                ),
                location: None,
            });
        }

        let security_score = score(issues.iter().filter(|i| i.kind.scores_security()).count());
        let logic_score = score(issues.iter().filter(|i| i.kind.scores_logic()).count());

        let has_critical = issues.iter().any(|i| i.severity == Severity::Critical);
        let safe_to_upgrade = security_score >= self.policy.security_score_floor
            && logic_score >= self.policy.logic_score_floor
            && !has_critical;

        let recommendations = recommendations_for(&issues);

        AuditVerdict {
            skill_name: skill.name.clone(),
            timestamp: Utc::now().to_rfc3339(),
            issues,
            security_score,
            logic_score,
            recommendations,
            safe_to_upgrade,
            fingerprint_before,
        }
    }
}

/// 100 minus 10 per scored issue, floored at zero.
fn score(count: usize) -> u8 {
    100u8.saturating_sub((count as u64).saturating_mul(10).min(100) as u8)
}

/// Read every non-binary file under `path`. Unreadable files become
/// critical findings; binary files (NUL-byte sniff) are skipped.
fn gather_contents(path: &Path, issues: &mut Vec<Issue>) -> (Vec<SkillFile>, u64) {
    let mut files = Vec::new();
    let mut total_bytes: u64 = 0;

    let mut entries: Vec<_> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    entries.sort();

    for file in entries {
        let rel_path = file
            .strip_prefix(path)
            .unwrap_or(&file)
            .to_string_lossy()
            .to_string();

        let bytes = match fs::read(&file) {
            Ok(b) => b,
            Err(e) => {
                issues.push(Issue {
                    kind: IssueKind::UnreadableFile,
                    severity: Severity::Critical,
                    message: format!("cannot read skill file: {}", e),
                    location: Some(rel_path),
                });
                continue;
            }
        };

        total_bytes += bytes.len() as u64;

        if bytes.contains(&0) {
            continue;
        }

        files.push(SkillFile {
            rel_path,
            text: String::from_utf8_lossy(&bytes).to_string(),
        });
    }

    (files, total_bytes)
}

fn check_forbidden_patterns(files: &[SkillFile], issues: &mut Vec<Issue>) {
    for file in files {
        for pattern in FORBIDDEN_PATTERNS.iter() {
            for m in pattern.regex.find_iter(&file.text) {
                let line = file.text[..m.start()].matches('\n').count() + 1;
                issues.push(Issue {
                    kind: IssueKind::ForbiddenPattern,
                    severity: pattern.severity,
                    message: format!(
                        "forbidden pattern ({}): '{}'",
                        pattern.label,
                        m.as_str().trim()
                    ),
                    location: Some(format!("{}:{}", file.rel_path, line)),
                });
            }
        }
    }
}

fn check_required_markers(files: &[SkillFile], issues: &mut Vec<Issue>) {
    let haystack: String = files
        .iter()
        .map(|f| f.text.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    for (marker, label) in REQUIRED_MARKERS {
        if !haystack.contains(marker) {
            issues.push(Issue {
                kind: IssueKind::MissingRequiredMarker,
                severity: Severity::Medium,
                message: format!("missing required documentation marker: {}", label),
                location: None,
            });
        }
    }
}

/// Structural checks: description field, usage-guide sections, and at
/// least one fenced example block.
fn check_structure(files: &[SkillFile], issues: &mut Vec<Issue>) {
    let haystack: String = files
        .iter()
        .map(|f| f.text.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    if !haystack.contains("description:") {
        issues.push(Issue {
            kind: IssueKind::MissingDescription,
            severity: Severity::High,
            message: "skill has no description field".to_string(),
            location: None,
        });
    }

    if !haystack.contains("## when to use") || !haystack.contains("## when not to use") {
        issues.push(Issue {
            kind: IssueKind::IncompleteUsageGuide,
            severity: Severity::Medium,
            message: "usage guide is incomplete: when-to-use or when-not-to-use section missing"
                .to_string(),
            location: None,
        });
    }

    if !haystack.contains("```") {
        issues.push(Issue {
            kind: IssueKind::MissingExamples,
            severity: Severity::Low,
            message: "no example block found".to_string(),
            location: None,
        });
    }
}

/// One finding per detected operation category, regardless of how many
/// files or lines matched.
fn check_sensitive_operations(files: &[SkillFile], issues: &mut Vec<Issue>) {
    for op in SENSITIVE_OPERATIONS.iter() {
        let detected = files.iter().any(|f| op.regex.is_match(&f.text));
        if detected {
            issues.push(Issue {
                kind: IssueKind::SensitiveOperation,
                severity: Severity::Medium,
                message: format!(
                    "sensitive operation detected: {}; requires explicit confirmation before automated changes",
                    op.label
                ),
                location: None,
            });
        }
    }
}

/// Deterministic recommendations from which severities and families are
/// present. Never free-form.
fn recommendations_for(issues: &[Issue]) -> Vec<String> {
    let mut recs = Vec::new();

    if issues.iter().any(|i| i.severity == Severity::Critical) {
        recs.push(
            "Fix critical findings immediately; destructive command patterns must be removed."
                .to_string(),
        );
    }
    if issues.iter().any(|i| i.severity == Severity::High) {
        recs.push("Resolve high-severity findings before the next evolution cycle.".to_string());
    }
    if issues.iter().any(|i| i.kind.scores_logic()) {
        recs.push(
            "Complete the skill documentation: description, usage guide, and examples."
                .to_string(),
        );
    }
    if issues.iter().any(|i| i.kind == IssueKind::SensitiveOperation) {
        recs.push(
            "Gate flagged sensitive operations behind explicit confirmation.".to_string(),
        );
    }
    if issues.iter().any(|i| i.kind == IssueKind::OversizedSkill) {
        recs.push("Reduce the skill's on-disk footprint.".to_string());
    }
    if recs.is_empty() {
        recs.push("No findings; candidate for feature enhancement.".to_string());
    }

    recs
}
