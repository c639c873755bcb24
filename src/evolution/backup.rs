//! Skill Snapshots
//!
//! Timestamped directory backups used by the upgrade path. A snapshot
//! lives next to the skill at `<path>.backup.<timestamp>`; restore wipes
//! the skill directory and moves the snapshot back, so a failed upgrade
//! always lands on exact prior state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;

/// Copy the skill tree to a timestamped sibling backup directory and
/// return the backup path.
pub fn snapshot(skill_path: &Path) -> Result<PathBuf> {
    if !skill_path.is_dir() {
        bail!("cannot snapshot {}: not a directory", skill_path.display());
    }

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let file_name = skill_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "skill".to_string());
    let backup_path = skill_path.with_file_name(format!("{}.backup.{}", file_name, stamp));

    if backup_path.exists() {
        bail!("backup path already exists: {}", backup_path.display());
    }

    copy_dir_recursive(skill_path, &backup_path).with_context(|| {
        format!(
            "failed to snapshot {} to {}",
            skill_path.display(),
            backup_path.display()
        )
    })?;

    Ok(backup_path)
}

/// Replace the skill tree with the snapshot. The snapshot directory is
/// consumed by the move.
pub fn restore(skill_path: &Path, backup_path: &Path) -> Result<()> {
    if skill_path.exists() {
        fs::remove_dir_all(skill_path)
            .with_context(|| format!("failed to clear {}", skill_path.display()))?;
    }

    fs::rename(backup_path, skill_path).with_context(|| {
        format!(
            "failed to restore {} from {}",
            skill_path.display(),
            backup_path.display()
        )
    })?;

    Ok(())
}

/// Delete a snapshot after a committed upgrade.
pub fn discard(backup_path: &Path) -> Result<()> {
    fs::remove_dir_all(backup_path)
        .with_context(|| format!("failed to discard backup {}", backup_path.display()))?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}
