//! Download management commands

use crate::archive::Archive;
use crate::config::Config;
use crate::downloads::{
    add_to_archive, decrypt_all, get_decryptable, list_downloads, remove_downloads, AddReport,
    Decryptor, Download,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Spooled downloads, after decrypting whatever was pending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadListing {
    pub downloads: Vec<Download>,
    /// Files that failed to decrypt, with the reason
    pub errors: Vec<(String, String)>,
}

pub async fn cmd_list_downloads(config: &Config, decryptor: &dyn Decryptor) -> Result<DownloadListing> {
    let spool = config.spool_dir();
    let pending = get_decryptable(decryptor, &spool)?;
    let (extracted, failed) = decrypt_all(decryptor, &pending);
    if !extracted.is_empty() {
        info!(count = extracted.len(), "Decrypted downloads");
    }

    let errors = failed
        .into_iter()
        .map(|(path, e)| (path.display().to_string(), e.to_string()))
        .collect();

    Ok(DownloadListing {
        downloads: list_downloads(&spool, &config.content.metadata)?,
        errors,
    })
}

pub async fn cmd_add_downloads(config: &Config, archive: &Archive, md5s: &[String]) -> Result<AddReport> {
    add_to_archive(archive, config, md5s).await
}

/// Delete spooled downloads; returns the number removed
pub async fn cmd_delete_downloads(config: &Config, md5s: &[String]) -> Result<usize> {
    let removed = remove_downloads(&config.spool_dir(), md5s);
    if removed < md5s.len() {
        warn!(
            requested = md5s.len(),
            removed, "Some downloads could not be removed"
        );
    }
    Ok(removed)
}

pub fn print_download_listing(listing: &DownloadListing) {
    for (file, error) in &listing.errors {
        println!("✗ {}: {}", file, error);
    }

    if listing.downloads.is_empty() {
        println!("No downloads waiting in the spool.");
        return;
    }

    println!("\n📥 Downloads\n");
    for download in &listing.downloads {
        let title = download
            .metadata
            .as_ref()
            .and_then(|m| m.get("title"))
            .and_then(|t| t.as_str());
        match (title, &download.error) {
            (Some(title), _) => println!("  {}  {}", download.md5, title),
            (None, Some(error)) => println!("  {}  ⚠ {}", download.md5, error),
            (None, None) => println!("  {}", download.md5),
        }
    }
}

pub fn print_add_report(report: &AddReport) {
    println!("✓ Added {} download(s) to the library", report.added.len());
    for (md5, reason) in &report.failed {
        println!("  ✗ {}: {}", md5, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloads::NoDecryptor;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_and_delete_downloads() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.content.spool_dir = "spool".to_string();

        let spool = config.spool_dir();
        std::fs::create_dir_all(&spool).unwrap();
        std::fs::write(spool.join("abc.zip"), b"not a zip").unwrap();

        let listing = cmd_list_downloads(&config, &NoDecryptor).await.unwrap();
        assert_eq!(listing.downloads.len(), 1);
        assert!(listing.downloads[0].error.is_some());
        assert!(listing.errors.is_empty());

        let removed = cmd_delete_downloads(&config, &["abc".to_string(), "gone".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cmd_list_downloads(&config, &NoDecryptor)
            .await
            .unwrap()
            .downloads
            .is_empty());
    }
}
