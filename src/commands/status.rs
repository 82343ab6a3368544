//! Status, reload and resolve commands

use crate::archive::Archive;
use crate::cleanup::{free_space, hsize, needed_space, FreeSpace, SpaceProbe};
use crate::config::Config;
use crate::error::Result;
use crate::resolver::ContentResolver;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::info;

/// Library statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStatus {
    pub config_path: String,
    pub db_path: String,
    pub content_dir: String,
    pub spool_dir: String,
    pub zipball_count: i64,
    pub last_update: Option<String>,
    pub space_used: u64,
    pub free: FreeSpace,
    pub needed: u64,
}

pub async fn cmd_status(config: &Config, archive: &Archive, probe: &dyn SpaceProbe) -> Result<LibraryStatus> {
    info!("Getting status");

    let free = free_space(probe, config)?;
    Ok(LibraryStatus {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        content_dir: config.content_dir().display().to_string(),
        spool_dir: config.spool_dir().display().to_string(),
        zipball_count: archive.zipball_count().await?,
        last_update: archive
            .last_update()
            .await?
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string()),
        space_used: archive.archive_space_used().await?,
        needed: needed_space(free.total, config.cleanup.min_free_bytes),
        free,
    })
}

/// Rebuild the index from the content directory
pub async fn cmd_reload(config: &Config, archive: &Archive) -> Result<u64> {
    archive
        .clear_and_reload(&config.content_dir(), &config.content.metadata)
        .await
}

/// Where a request from `client` for `host` would be redirected
pub async fn cmd_resolve(
    config: &Config,
    archive: &Archive,
    client: IpAddr,
    host: &str,
    path: &str,
) -> Result<Option<String>> {
    let resolver = ContentResolver::from_config(&config.resolver)?;
    let target = resolver.resolve(archive, client, host, path).await?;
    Ok(target.map(String::from))
}

pub fn print_status(status: &LibraryStatus) {
    println!("\n📊 librarian Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Content: {}", status.content_dir);
    println!("Spool: {}", status.spool_dir);

    println!("\nLibrary:");
    println!("  Items: {}", status.zipball_count);
    println!(
        "  Last update: {}",
        status.last_update.as_deref().unwrap_or("never")
    );
    println!("  Space used: {}", hsize(status.space_used));

    println!("\nFree space:");
    println!("  Spool: {}", hsize(status.free.spool));
    println!("  Content: {}", hsize(status.free.content));
    if status.needed > 0 {
        println!(
            "\n⚠ {} more free space is needed; run 'librarian cleanup list'",
            hsize(status.needed)
        );
    }
}
