//! Audit Rule Batteries
//!
//! Fixed pattern tables backing the auditor's check families. The
//! tables are the contract: auditing the same content always yields the
//! same findings.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::Severity;

/// A compiled forbidden pattern with its severity and label.
pub struct ForbiddenPattern {
    pub regex: Regex,
    pub severity: Severity,
    pub label: &'static str,
}

/// Dangerous textual patterns a skill must never contain. Destructive
/// delete invocations are critical; the rest are high.
pub static FORBIDDEN_PATTERNS: LazyLock<Vec<ForbiddenPattern>> = LazyLock::new(|| {
    [
        (r"(?i)rm\s+-rf", Severity::Critical, "recursive force delete"),
        (r"(?i)sudo\s+", Severity::High, "privilege escalation"),
        (r"(?i)chmod\s+777", Severity::High, "world-writable permissions"),
        (r"(?i)eval\s*\(", Severity::High, "dynamic code evaluation"),
        (r"(?i)exec\s*\(", Severity::High, "dynamic code execution"),
        (r"(?i)os\.system\s*\(", Severity::High, "unchecked shell execution"),
    ]
    .into_iter()
    .map(|(pattern, severity, label)| ForbiddenPattern {
        regex: Regex::new(pattern).expect("forbidden pattern must compile"),
        severity,
        label,
    })
    .collect()
});

/// Documentation markers every skill must carry, matched
/// case-insensitively as substrings.
pub const REQUIRED_MARKERS: &[(&str, &str)] = &[
    ("# security:", "security rationale section"),
    ("## when to use", "when-to-use section"),
    ("## when not to use", "when-not-to-use section"),
];

/// A sensitive-operation vocabulary detector.
pub struct SensitiveOperation {
    pub regex: Regex,
    pub label: &'static str,
}

/// Operation vocabulary that requires explicit confirmation before any
/// automated change touches the skill. One finding per detected
/// category, regardless of match count.
pub static SENSITIVE_OPERATIONS: LazyLock<Vec<SensitiveOperation>> = LazyLock::new(|| {
    [
        (r"(?i)(write|create|overwrite)\w*\s+\S*file", "file_write"),
        (r"(?i)\b(curl|wget|http|fetch|request)", "network_request"),
        (r"(?i)\b(bash|sh|shell|exec)\b", "shell_invocation"),
        (r"(?i)\b(password|token|secret|credential)\b", "credential_reference"),
        (r"(?i)\b(edit|modify|delete|remove|update)s?\b", "data_mutation"),
    ]
    .into_iter()
    .map(|(pattern, label)| SensitiveOperation {
        regex: Regex::new(pattern).expect("sensitive pattern must compile"),
        label,
    })
    .collect()
});
