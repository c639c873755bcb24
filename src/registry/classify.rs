//! Skill Classification
//!
//! Pure, table-driven scorers mapping a skill's name + description to a
//! category, subcategory, complexity tier, and risk tier. Each scorer
//! counts keyword substring hits against a fixed table; ties resolve to
//! the earliest declared entry, and zero hits fall back to the default
//! bucket. No I/O happens here.

use crate::types::{ComplexityTier, RiskTier};

/// The bucket for skills matching no category keywords at all.
pub const GENERAL_CATEGORY: &str = "general";

/// Category keyword table, in declaration order.
const CATEGORY_TABLE: &[(&str, &[&str])] = &[
    (
        "security-audit",
        &[
            "security", "audit", "hardening", "firewall", "ssh", "encryption",
            "authentication", "authorization", "compliance", "vulnerability", "risk",
        ],
    ),
    (
        "file-management",
        &[
            "file", "backup", "restore", "compress", "archive", "sync", "transfer",
            "storage", "disk", "filesystem",
        ],
    ),
    (
        "dev-tools",
        &[
            "coding", "code", "development", "programming", "build", "compile",
            "debug", "test", "lint", "refactor", "review", "git", "github",
        ],
    ),
    (
        "system-ops",
        &[
            "system", "os", "linux", "macos", "update", "package", "install",
            "configure", "monitor", "performance",
        ],
    ),
    (
        "networking",
        &[
            "network", "http", "api", "web", "browser", "fetch", "download",
            "upload", "websocket", "proxy", "dns",
        ],
    ),
    (
        "data-processing",
        &[
            "data", "json", "xml", "csv", "database", "query", "transform",
            "parse", "extract", "analyze", "process",
        ],
    ),
    (
        "media",
        &[
            "media", "image", "audio", "video", "canvas", "tts", "speech",
            "graphics", "render", "convert",
        ],
    ),
    (
        "assistant",
        &[
            "agent", "skill", "memory", "workflow", "automation", "assistant",
            "chat", "conversation", "reasoning", "planning",
        ],
    ),
    (
        "integrations",
        &[
            "discord", "telegram", "whatsapp", "slack", "email", "calendar",
            "weather", "sonos",
        ],
    ),
];

/// First entry per category is the fallback subcategory.
const SUBCATEGORY_TABLE: &[(&str, &[&str])] = &[
    ("security-audit", &["system-security", "network-security", "data-security", "compliance"]),
    ("file-management", &["backup-restore", "file-operations", "storage-sync", "archiving"]),
    ("dev-tools", &["code-generation", "code-review", "testing", "build-deploy"]),
    ("system-ops", &["monitoring", "configuration", "maintenance", "performance"]),
    ("networking", &["http-clients", "browser-control", "api-integration", "network-tools"]),
    ("data-processing", &["parsing", "transformation", "database", "analysis"]),
    ("media", &["image", "audio", "video", "text-to-speech"]),
    ("assistant", &["skill-management", "memory", "workflow", "automation"]),
    ("integrations", &["github-integration", "messaging", "iot-devices", "third-party-api"]),
];

/// Name-keyword refinements checked before the category fallback.
const SUBCATEGORY_REFINEMENTS: &[(&str, &str)] = &[
    ("github", "github-integration"),
    ("backup", "backup-restore"),
    ("coding", "code-generation"),
    ("health", "system-security"),
    ("weather", "third-party-api"),
    ("sonos", "iot-devices"),
];

/// Complexity keyword table; ties resolve toward the earlier (higher) tier.
const COMPLEXITY_TABLE: &[(ComplexityTier, &[&str])] = &[
    (ComplexityTier::Complex, &["agent", "orchestration", "workflow", "automation", "ai"]),
    (ComplexityTier::Medium, &["api", "integration", "processing", "management"]),
    (ComplexityTier::Simple, &["read", "write", "fetch", "simple", "basic"]),
];

/// Risk keyword table; ties resolve toward the earlier (higher) tier.
const RISK_TABLE: &[(RiskTier, &[&str])] = &[
    (RiskTier::Critical, &["security", "audit", "encryption", "authentication", "system"]),
    (RiskTier::High, &["file", "network", "data", "external", "access"]),
    (RiskTier::Standard, &["media", "weather", "simple", "read", "display"]),
];

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Count how many keywords occur as substrings of `text`.
fn keyword_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| text.contains(*k)).count()
}

fn combined_text(name: &str, description: &str) -> String {
    format!("{} {}", name, description).to_lowercase()
}

/// Classify a skill into a (category, subcategory) pair.
pub fn categorize(name: &str, description: &str) -> (String, String) {
    let text = combined_text(name, description);

    let mut best: Option<(&str, usize)> = None;
    for (category, keywords) in CATEGORY_TABLE {
        let hits = keyword_hits(&text, keywords);
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((category, hits));
        }
    }

    match best {
        Some((category, _)) => {
            let sub = subcategory_for(name, category);
            (category.to_string(), sub.to_string())
        }
        None => (GENERAL_CATEGORY.to_string(), GENERAL_CATEGORY.to_string()),
    }
}

/// Refine a subcategory from the skill name, falling back to the
/// category's first declared subcategory. Name refinements take
/// precedence over the category's own list.
fn subcategory_for(name: &str, category: &str) -> &'static str {
    let name_lower = name.to_lowercase();

    for (keyword, sub) in SUBCATEGORY_REFINEMENTS {
        if name_lower.contains(keyword) {
            return sub;
        }
    }

    SUBCATEGORY_TABLE
        .iter()
        .find(|(c, _)| *c == category)
        .and_then(|(_, subs)| subs.first().copied())
        .unwrap_or(GENERAL_CATEGORY)
}

/// Assess a skill's complexity tier. Defaults to the lowest tier when no
/// keyword matches.
pub fn assess_complexity(name: &str, description: &str) -> ComplexityTier {
    let text = combined_text(name, description);

    let mut best: Option<(ComplexityTier, usize)> = None;
    for (tier, keywords) in COMPLEXITY_TABLE {
        let hits = keyword_hits(&text, keywords);
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((*tier, hits));
        }
    }

    best.map(|(tier, _)| tier).unwrap_or(ComplexityTier::Simple)
}

/// Assess a skill's risk tier. Defaults to the lowest tier when no
/// keyword matches.
pub fn assess_risk(name: &str, description: &str) -> RiskTier {
    let text = combined_text(name, description);

    let mut best: Option<(RiskTier, usize)> = None;
    for (tier, keywords) in RISK_TABLE {
        let hits = keyword_hits(&text, keywords);
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((*tier, hits));
        }
    }

    best.map(|(tier, _)| tier).unwrap_or(RiskTier::Standard)
}
