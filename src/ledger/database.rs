//! Ledger Database
//!
//! rusqlite-backed storage for audit verdicts and evolution history.
//! Synchronous, single-process access: the orchestrator is the only
//! writer during a cycle.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{AuditVerdict, HistoryEntry, Severity};

use super::schema::{CREATE_TABLES, SCHEMA_VERSION};

pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create ledger directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open ledger: {db_path}"))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create ledger tables")?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            params![SCHEMA_VERSION],
        )
        .context("failed to record schema version")?;

        Ok(Self { conn })
    }

    /// Open an in-memory ledger (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create ledger tables")?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            params![SCHEMA_VERSION],
        )?;
        Ok(Self { conn })
    }

    // ─── Audit log ───────────────────────────────────────────────

    /// Record a verdict for `cycle`. Returns `false` when the skill
    /// already has a verdict in this cycle -- the existing row is left
    /// untouched, never overwritten.
    pub fn record_verdict(&self, cycle: &str, verdict: &AuditVerdict) -> Result<bool> {
        let max_severity = verdict.max_severity().map(severity_str);
        let payload =
            serde_json::to_string(verdict).context("failed to serialize verdict")?;

        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO audit_log
                 (skill_name, cycle, timestamp, security_score, logic_score,
                  safe_to_upgrade, max_severity, fingerprint_before, verdict)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    verdict.skill_name,
                    cycle,
                    verdict.timestamp,
                    verdict.security_score as i64,
                    verdict.logic_score as i64,
                    verdict.safe_to_upgrade as i64,
                    max_severity,
                    verdict.fingerprint_before,
                    payload,
                ],
            )
            .context("failed to insert audit verdict")?;

        Ok(inserted == 1)
    }

    /// Fetch the verdict recorded for a skill in a given cycle.
    pub fn verdict_for(&self, skill_name: &str, cycle: &str) -> Result<Option<AuditVerdict>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT verdict FROM audit_log WHERE skill_name = ?1 AND cycle = ?2",
                params![skill_name, cycle],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => {
                let verdict = serde_json::from_str(&json)
                    .context("failed to deserialize stored verdict")?;
                Ok(Some(verdict))
            }
            None => Ok(None),
        }
    }

    /// Delete cycle-scoped audit rows from earlier cycles.
    ///
    /// Rows whose worst finding is critical or high are retained
    /// indefinitely; everything else lives only as long as its cycle.
    /// History rows are never touched.
    pub fn prune_cycle_scoped(&self, current_cycle: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM audit_log
                 WHERE cycle != ?1
                   AND (max_severity IS NULL OR max_severity NOT IN ('high', 'critical'))",
                params![current_cycle],
            )
            .context("failed to prune audit log")?;
        Ok(deleted)
    }

    // ─── Evolution history ───────────────────────────────────────

    /// Append a permanent history entry.
    pub fn append_history(&self, entry: &HistoryEntry) -> Result<()> {
        let recommendations = serde_json::to_string(&entry.applied_recommendations)
            .context("failed to serialize recommendations")?;

        self.conn
            .execute(
                "INSERT INTO evolution_history
                 (skill_name, timestamp, fingerprint_before, fingerprint_after,
                  applied_recommendations)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.skill_name,
                    entry.timestamp,
                    entry.fingerprint_before,
                    entry.fingerprint_after,
                    recommendations,
                ],
            )
            .context("failed to insert history entry")?;

        Ok(())
    }

    /// All history entries for one skill, oldest first.
    pub fn history_for(&self, skill_name: &str) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT skill_name, timestamp, fingerprint_before, fingerprint_after,
                    applied_recommendations
             FROM evolution_history WHERE skill_name = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![skill_name], row_to_history)?;
        collect_history(rows)
    }

    /// The most recent `limit` history entries, newest first.
    pub fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT skill_name, timestamp, fingerprint_before, fingerprint_after,
                    applied_recommendations
             FROM evolution_history ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_history)?;
        collect_history(rows)
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let recommendations: String = row.get(4)?;
    Ok(HistoryEntry {
        skill_name: row.get(0)?,
        timestamp: row.get(1)?,
        fingerprint_before: row.get(2)?,
        fingerprint_after: row.get(3)?,
        applied_recommendations: serde_json::from_str(&recommendations).unwrap_or_default(),
    })
}

fn collect_history<F>(rows: rusqlite::MappedRows<'_, F>) -> Result<Vec<HistoryEntry>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry>,
{
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Issue, IssueKind};
    use chrono::Utc;

    fn verdict(name: &str, severity: Option<Severity>) -> AuditVerdict {
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
            skill_name: name.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            issues,
            security_score: 90,
            logic_score: 100,
            recommendations: vec!["do a thing".to_string()],
            safe_to_upgrade: false,
            fingerprint_before: "abc".to_string(),
        }
    }

    fn history(name: &str) -> HistoryEntry {
        HistoryEntry {
            skill_name: name.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            fingerprint_before: "before".to_string(),
            fingerprint_after: "after".to_string(),
            applied_recommendations: vec!["do a thing".to_string()],
        }
    }

    #[test]
    fn test_one_verdict_per_skill_per_cycle() {
        let ledger = Ledger::open_in_memory().unwrap();
        let first = verdict("sample", Some(Severity::Critical));

        assert!(ledger.record_verdict("2026-08-06", &first).unwrap());
        assert!(!ledger.record_verdict("2026-08-06", &first).unwrap());

        // A different cycle is a different row.
        assert!(ledger.record_verdict("2026-08-07", &first).unwrap());
    }

    #[test]
    fn test_verdict_round_trip() {
        let ledger = Ledger::open_in_memory().unwrap();
        let original = verdict("sample", Some(Severity::High));
        ledger.record_verdict("2026-08-06", &original).unwrap();

        let loaded = ledger.verdict_for("sample", "2026-08-06").unwrap().unwrap();
        assert_eq!(loaded.skill_name, original.skill_name);
        assert_eq!(loaded.security_score, original.security_score);
        assert_eq!(loaded.issues.len(), 1);
        assert_eq!(loaded.fingerprint_before, "abc");
    }

    #[test]
    fn test_prune_keeps_high_severity_rows() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .record_verdict("2026-08-05", &verdict("critical-skill", Some(Severity::Critical)))
            .unwrap();
        ledger
            .record_verdict("2026-08-05", &verdict("clean-skill", None))
            .unwrap();
        ledger
            .record_verdict("2026-08-06", &verdict("fresh-skill", None))
            .unwrap();

        let pruned = ledger.prune_cycle_scoped("2026-08-06").unwrap();
        assert_eq!(pruned, 1);

        assert!(ledger.verdict_for("critical-skill", "2026-08-05").unwrap().is_some());
        assert!(ledger.verdict_for("clean-skill", "2026-08-05").unwrap().is_none());
        assert!(ledger.verdict_for("fresh-skill", "2026-08-06").unwrap().is_some());
    }

    #[test]
    fn test_history_survives_pruning() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.append_history(&history("sample")).unwrap();
        ledger.prune_cycle_scoped("2026-08-06").unwrap();

        let entries = ledger.history_for("sample").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fingerprint_after, "after");
        assert_eq!(entries[0].applied_recommendations, vec!["do a thing"]);
    }

    #[test]
    fn test_recent_history_is_newest_first() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.append_history(&history("first")).unwrap();
        ledger.append_history(&history("second")).unwrap();

        let entries = ledger.recent_history(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].skill_name, "second");
        assert_eq!(entries[1].skill_name, "first");
    }
}
