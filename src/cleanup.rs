//! Disk-space cleanup
//!
//! Lists content that can be removed to free space, least recently updated
//! and least viewed first.

use crate::archive::Archive;
use crate::config::Config;
use crate::downloads::remove_from_archive;
use crate::error::Result;
use crate::metadata::ContentRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Free-space query for the volume holding a path
pub trait SpaceProbe {
    fn available(&self, path: &Path) -> Result<u64>;
}

/// [`SpaceProbe`] backed by the filesystem
///
/// Paths that do not exist yet are measured at their nearest existing ancestor.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available(&self, path: &Path) -> Result<u64> {
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("."));
        Ok(fs2::available_space(existing)?)
    }
}

/// Free bytes on the spool and content volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpace {
    pub spool: u64,
    pub content: u64,
    /// The smaller of the two
    pub total: u64,
}

pub fn free_space(probe: &dyn SpaceProbe, config: &Config) -> Result<FreeSpace> {
    let spool = probe.available(&config.spool_dir())?;
    let content = probe.available(&config.content_dir())?;
    Ok(FreeSpace {
        spool,
        content,
        total: spool.min(content),
    })
}

/// Bytes that must be freed to get back to `min_free`
pub fn needed_space(free: u64, min_free: u64) -> u64 {
    min_free.saturating_sub(free)
}

/// Human-readable byte count
pub fn hsize(bytes: u64) -> String {
    const UNITS: &[&str] = &["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Removal candidates, least recently updated and least viewed first
pub async fn cleanup_list(archive: &Archive) -> Result<Vec<ContentRecord>> {
    archive.get_stalest().await
}

/// Selected candidates and the space their removal would free
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupCheck {
    pub selected: Vec<ContentRecord>,
    pub freed: u64,
}

fn select(candidates: Vec<ContentRecord>, selection: &[String]) -> Vec<ContentRecord> {
    candidates
        .into_iter()
        .filter(|r| selection.contains(&r.md5))
        .collect()
}

/// Preview a cleanup; unknown md5s in the selection are ignored
pub async fn check(archive: &Archive, selection: &[String]) -> Result<CleanupCheck> {
    let selected = select(cleanup_list(archive).await?, selection);
    let freed = selected.iter().map(|r| r.size.max(0) as u64).sum();
    Ok(CleanupCheck { selected, freed })
}

/// Result of a cleanup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupResult {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Remove the selected content from disk and from the index
pub async fn delete(archive: &Archive, config: &Config, selection: &[String]) -> Result<CleanupResult> {
    let md5s: Vec<String> = select(cleanup_list(archive).await?, selection)
        .into_iter()
        .map(|r| r.md5)
        .collect();
    if md5s.is_empty() {
        return Ok(CleanupResult::default());
    }

    let (removed, failed) = remove_from_archive(archive, config, &md5s).await?;
    info!(removed = removed.len(), failed = failed.len(), "Cleanup finished");
    Ok(CleanupResult { removed, failed })
}
