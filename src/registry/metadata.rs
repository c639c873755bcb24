//! Skill Metadata Parser
//!
//! Parses the `SKILL.md` metadata file that identifies a skill directory.
//! Metadata is a leading header of `key: value` lines fenced by `---`
//! delimiters:
//!
//! ```text
//! ---
//! name: my-skill
//! description: Does something useful
//! ---
//!
//! Usage notes go here in Markdown...
//! ```
//!
//! Files without a fenced header fall back to bare `key: value` lines
//! anywhere in the content. A file with no parseable `name` yields no
//! metadata at all -- partially populated records are never produced.

use serde::{Deserialize, Serialize};

/// The metadata file every skill directory must contain.
pub const METADATA_FILENAME: &str = "SKILL.md";

/// Identity fields parsed from a skill's metadata file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
}

/// Raw header fields before validation. Deserialized from the
/// intermediate JSON value so unknown keys are tolerated and missing
/// ones surface as `None`.
#[derive(Debug, Clone, Deserialize)]
struct RawHeader {
    name: Option<String>,
    description: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse skill metadata from raw file content.
///
/// Tries the fenced header first, then the bare-lines fallback. Returns
/// `None` when no non-empty `name` can be recovered.
pub fn parse_metadata(content: &str) -> Option<SkillMetadata> {
    let raw = parse_fenced_header(content).or_else(|| parse_bare_lines(content))?;

    let name = raw.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
    let description = raw
        .description
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    Some(SkillMetadata { name, description })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Extract and parse the `---`-fenced header block, if present.
fn parse_fenced_header(raw: &str) -> Option<RawHeader> {
    let trimmed = raw.trim_start();

    if !trimmed.starts_with("---") {
        return None;
    }

    // Find the closing `---` after the opening one.
    let after_open = &trimmed[3..];
    let close_idx = after_open.find("\n---")?;
    let block = after_open[..close_idx].trim();

    // Convert the key/value lines to a JSON value, then deserialize
    // through serde so malformed headers fail closed instead of
    // producing partially populated structures.
    let json_value = header_to_json(block);
    serde_json::from_value::<RawHeader>(json_value).ok()
}

/// Fallback: scan the whole file for bare `name:` / `description:` lines.
fn parse_bare_lines(raw: &str) -> Option<RawHeader> {
    let mut name = None;
    let mut description = None;

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("name:") {
            name.get_or_insert_with(|| unquote(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("description:") {
            description.get_or_insert_with(|| unquote(rest).to_string());
        }
    }

    if name.is_none() && description.is_none() {
        return None;
    }

    Some(RawHeader { name, description })
}

/// Convert simple `key: value` header lines into a JSON object.
///
/// Supports scalar values only; blank lines and `#` comments are skipped.
fn header_to_json(block: &str) -> serde_json::Value {
    use serde_json::{Map, Value};

    let mut map = Map::new();

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(colon) = line.find(':') else {
            continue;
        };
        let key = line[..colon].trim().to_string();
        let raw_value = unquote(&line[colon + 1..]);

        let value = if raw_value == "true" {
            Value::Bool(true)
        } else if raw_value == "false" {
            Value::Bool(false)
        } else if let Ok(n) = raw_value.parse::<i64>() {
            Value::Number(n.into())
        } else {
            Value::String(raw_value.to_string())
        };

        map.insert(key, value);
    }

    Value::Object(map)
}

/// Trim whitespace and surrounding single/double quotes from a value.
fn unquote(v: &str) -> &str {
    v.trim().trim_matches(|c| c == '"' || c == '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_header() {
        let raw = "---\nname: backup-helper\ndescription: Snapshots files\n---\n\nBody";
        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.name, "backup-helper");
        assert_eq!(meta.description, "Snapshots files");
    }

    #[test]
    fn test_parse_bare_lines_fallback() {
        let raw = "# Some Skill\n\nname: bare-skill\n\ndescription: no fences here\n";
        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.name, "bare-skill");
        assert_eq!(meta.description, "no fences here");
    }

    #[test]
    fn test_missing_name_yields_none() {
        let raw = "---\ndescription: nameless\n---\n";
        assert!(parse_metadata(raw).is_none());

        let raw = "Just some markdown without metadata.";
        assert!(parse_metadata(raw).is_none());
    }

    #[test]
    fn test_quoted_values_are_unquoted() {
        let raw = "---\nname: \"quoted\"\ndescription: 'single quoted'\n---\n";
        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.name, "quoted");
        assert_eq!(meta.description, "single quoted");
    }

    #[test]
    fn test_missing_description_defaults_empty() {
        let raw = "---\nname: terse\n---\n";
        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.name, "terse");
        assert_eq!(meta.description, "");
    }

    #[test]
    fn test_unknown_header_keys_tolerated() {
        let raw = "---\nname: extra\nversion: 3\nenabled: true\n---\n";
        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.name, "extra");
    }
}
