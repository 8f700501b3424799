use std::path::{Path, PathBuf};

use crate::types::MemoryItem;

/// Read a memory log written by [`save`]. A missing file is an empty log.
pub fn load(path: &Path) -> anyhow::Result<Vec<MemoryItem>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("invalid memory log at {}: {e}", path.display()))
}

/// Write the whole log as pretty JSON.
///
/// Writes to a sibling temp file and renames it into place so a crash
/// mid-write never leaves a truncated log behind.
pub fn save(path: &Path, items: &[MemoryItem]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(items)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| anyhow::anyhow!("failed to replace {}: {e}", path.display()))?;
    Ok(())
}

/// Move an unreadable log out of the way so the next save cannot clobber it.
///
/// The file lands next to the original as `<name>.bak`, or `<name>.bak.N`
/// when earlier backups exist. Returns the new location.
pub fn set_aside(path: &Path) -> anyhow::Result<PathBuf> {
    let mut target = backup_path(path, 0);
    let mut n = 1;
    while target.exists() {
        target = backup_path(path, n);
        n += 1;
    }
    std::fs::rename(path, &target).map_err(|e| {
        anyhow::anyhow!(
            "failed to move {} to {}: {e}",
            path.display(),
            target.display()
        )
    })?;
    Ok(target)
}

fn backup_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    if n > 0 {
        name.push(format!(".{n}"));
    }
    PathBuf::from(name)
}
