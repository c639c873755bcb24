//! Ledger Schema

pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

-- One verdict per skill per cycle; the UNIQUE constraint is the
-- invariant, not an optimization.
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    skill_name TEXT NOT NULL,
    cycle TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    security_score INTEGER NOT NULL,
    logic_score INTEGER NOT NULL,
    safe_to_upgrade INTEGER NOT NULL,
    max_severity TEXT,
    fingerprint_before TEXT NOT NULL,
    verdict TEXT NOT NULL,
    UNIQUE(skill_name, cycle)
);

-- Permanent record of applied upgrades. Append-only, never deleted.
CREATE TABLE IF NOT EXISTS evolution_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    skill_name TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    fingerprint_before TEXT NOT NULL,
    fingerprint_after TEXT NOT NULL,
    applied_recommendations TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_log_cycle ON audit_log(cycle);
CREATE INDEX IF NOT EXISTS idx_history_skill ON evolution_history(skill_name);
"#;
