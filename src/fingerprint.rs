//! Change Fingerprint
//!
//! Content-addressed digest over a skill's full file tree. The digest is
//! the sole mechanism for detecting whether an upgrade actually changed
//! anything and for verifying that a rollback restored exact prior state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use sha3::{Digest, Sha3_256};
use walkdir::WalkDir;

/// Compute the fingerprint of the file tree rooted at `path`.
///
/// Every readable file's bytes are streamed through a single SHA3-256
/// accumulator in sorted relative-path order. Unreadable files are
/// skipped silently: a partially readable tree still yields a
/// deterministic digest for its readable subset. Two fingerprints of an
/// unchanged tree are byte-identical.
pub fn fingerprint_tree(path: &Path) -> Result<String> {
    if !path.is_dir() {
        bail!("not a directory: {}", path.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut hasher = Sha3_256::new();
    for file in files {
        let bytes = match fs::read(&file) {
            Ok(b) => b,
            Err(_) => continue,
        };
        hasher.update(&bytes);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.sh"), "beta").unwrap();

        let first = fingerprint_tree(dir.path()).unwrap();
        let second = fingerprint_tree(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fingerprint_changes_with_any_byte() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        let before = fingerprint_tree(dir.path()).unwrap();

        fs::write(dir.path().join("a.md"), "alphA").unwrap();
        let after = fingerprint_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_changes_with_new_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "alpha").unwrap();
        let before = fingerprint_tree(dir.path()).unwrap();

        fs::write(dir.path().join("b.md"), "beta").unwrap();
        let after = fingerprint_tree(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_empty_tree_has_a_digest() {
        let dir = TempDir::new().unwrap();
        let digest = fingerprint_tree(dir.path()).unwrap();
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(fingerprint_tree(Path::new("/nonexistent/tree")).is_err());
    }
}
