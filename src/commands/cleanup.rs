//! Cleanup commands

use crate::archive::Archive;
use crate::cleanup::{self, free_space, hsize, needed_space, CleanupResult, SpaceProbe};
use crate::config::Config;
use crate::error::Result;
use crate::metadata::ContentRecord;
use serde::{Deserialize, Serialize};

/// Removal candidates and the space still needed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupListing {
    pub candidates: Vec<ContentRecord>,
    pub needed: u64,
}

/// Outcome of a cleanup preview or run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub message: String,
    pub freed: u64,
    pub result: Option<CleanupResult>,
    pub needed: u64,
}

fn current_need(probe: &dyn SpaceProbe, config: &Config) -> Result<u64> {
    let free = free_space(probe, config)?;
    Ok(needed_space(free.total, config.cleanup.min_free_bytes))
}

pub async fn cmd_cleanup_list(
    config: &Config,
    archive: &Archive,
    probe: &dyn SpaceProbe,
) -> Result<CleanupListing> {
    Ok(CleanupListing {
        candidates: cleanup::cleanup_list(archive).await?,
        needed: current_need(probe, config)?,
    })
}

/// Report how much space removing the selection would free
pub async fn cmd_cleanup_check(
    config: &Config,
    archive: &Archive,
    probe: &dyn SpaceProbe,
    selection: &[String],
) -> Result<CleanupReport> {
    let preview = cleanup::check(archive, selection).await?;
    let message = if preview.selected.is_empty() {
        "No content selected".to_string()
    } else {
        format!("{} can be freed by removing selected content", hsize(preview.freed))
    };

    Ok(CleanupReport {
        message,
        freed: preview.freed,
        result: None,
        needed: current_need(probe, config)?,
    })
}

pub async fn cmd_cleanup_delete(
    config: &Config,
    archive: &Archive,
    probe: &dyn SpaceProbe,
    selection: &[String],
) -> Result<CleanupReport> {
    let preview = cleanup::check(archive, selection).await?;
    let result = cleanup::delete(archive, config, selection).await?;

    let message = if !result.failed.is_empty() {
        "Some files could not be removed".to_string()
    } else if result.removed.is_empty() {
        "Nothing to delete".to_string()
    } else {
        format!("Removed {} item(s)", result.removed.len())
    };

    Ok(CleanupReport {
        message,
        freed: preview.freed,
        result: Some(result),
        needed: current_need(probe, config)?,
    })
}

pub fn print_cleanup_listing(listing: &CleanupListing) {
    if listing.needed > 0 {
        println!("⚠ {} more free space is needed", hsize(listing.needed));
    }

    if listing.candidates.is_empty() {
        println!("Nothing can be removed.");
        return;
    }

    println!("\n🧹 Removable content (oldest and least viewed first)\n");
    for record in &listing.candidates {
        println!(
            "  {}  {:>10}  {:>5} views  {}  {}",
            record.md5,
            hsize(record.size.max(0) as u64),
            record.views,
            record.updated,
            record.title
        );
    }
}

pub fn print_cleanup_report(report: &CleanupReport) {
    println!("{}", report.message);
    if let Some(result) = &report.result {
        for md5 in &result.failed {
            println!("  ✗ {}", md5);
        }
    }
    if report.needed > 0 {
        println!("⚠ {} more free space is needed", hsize(report.needed));
    }
}
