//! Download ingestion
//!
//! Downloads land in the spool directory as `<md5>.zip`. Adding them moves the
//! zipball into the content directory and indexes its metadata.

use crate::archive::Archive;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metadata::{convert_json, ContentRecord, MetaMap};
use crate::progress::add_progress_bar;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound on the size of a metadata file read from a zipball
const MAX_METADATA_BYTES: u64 = 1024 * 1024;

/// External decryption of signed downloads
pub trait Decryptor {
    /// Files in `spool` that are waiting to be decrypted
    fn decryptable(&self, spool: &Path) -> Result<Vec<PathBuf>>;

    /// Decrypt one file, returning the path of the extracted zipball
    fn decrypt(&self, path: &Path) -> Result<PathBuf>;
}

/// Decryptor for spools that only ever receive plain zipballs
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecryptor;

impl Decryptor for NoDecryptor {
    fn decryptable(&self, _spool: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn decrypt(&self, path: &Path) -> Result<PathBuf> {
        Err(Error::Other(format!(
            "no decryptor configured for {}",
            path.display()
        )))
    }
}

/// A spooled download with its metadata, or the reason it could not be read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
    pub md5: String,
    pub path: PathBuf,
    pub size: u64,
    pub metadata: Option<MetaMap>,
    pub error: Option<String>,
}

/// Outcome of adding downloads to the archive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddReport {
    pub added: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Content hash of a zipball, taken from its file name
pub fn get_md5_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// Path of an indexed zipball, if it exists
pub fn get_zip_path(md5: &str, content_dir: &Path) -> Option<PathBuf> {
    let path = content_dir.join(format!("{}.zip", md5));
    path.is_file().then_some(path)
}

pub fn get_decryptable(decryptor: &dyn Decryptor, spool: &Path) -> Result<Vec<PathBuf>> {
    decryptor.decryptable(spool)
}

/// Decrypt every file, collecting failures instead of stopping at the first one
pub fn decrypt_all(
    decryptor: &dyn Decryptor,
    files: &[PathBuf],
) -> (Vec<PathBuf>, Vec<(PathBuf, Error)>) {
    let mut extracted = Vec::new();
    let mut errors = Vec::new();

    for file in files {
        match decryptor.decrypt(file) {
            Ok(path) => {
                debug!(file = %file.display(), "Decrypted download");
                extracted.push(path);
            }
            Err(e) => {
                warn!(file = %file.display(), "Failed to decrypt download: {}", e);
                errors.push((file.clone(), e));
            }
        }
    }

    (extracted, errors)
}

/// Zip files directly inside `dir`, sorted by path
pub fn get_zipballs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut zipballs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| Error::Other(format!("Failed to scan {}: {}", dir.display(), e)))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "zip") {
            zipballs.push(path.to_path_buf());
        }
    }

    zipballs.sort();
    Ok(zipballs)
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<Vec<u8>>> {
    let member = match archive.by_name(name) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = Vec::new();
    member.take(MAX_METADATA_BYTES).read_to_end(&mut content)?;
    Ok(Some(content))
}

/// Read and normalize the metadata of a zipball
///
/// Looks for `<md5>/<meta_filename>` first, then for `<meta_filename>` at the
/// top level.
pub fn get_metadata(zip_path: &Path, meta_filename: &str) -> Result<MetaMap> {
    let md5 = get_md5_from_path(zip_path).unwrap_or_default();
    let mut archive = ZipArchive::new(File::open(zip_path)?)?;

    for name in [format!("{}/{}", md5, meta_filename), meta_filename.to_string()] {
        if let Some(raw) = read_member(&mut archive, &name)? {
            return convert_json(&raw);
        }
    }

    Err(Error::Format(format!(
        "No '{}' in {}",
        meta_filename,
        zip_path.display()
    )))
}

/// Spooled downloads with their metadata
pub fn list_downloads(spool: &Path, meta_filename: &str) -> Result<Vec<Download>> {
    let mut downloads = Vec::new();
    for path in get_zipballs(spool)? {
        let Some(md5) = get_md5_from_path(&path) else {
            continue;
        };
        let size = fs::metadata(&path)?.len();
        let (metadata, error) = match get_metadata(&path, meta_filename) {
            Ok(meta) => (Some(meta), None),
            Err(e) => (None, Some(e.to_string())),
        };
        downloads.push(Download {
            md5,
            path,
            size,
            metadata,
            error,
        });
    }
    Ok(downloads)
}

/// Move a file, copying across filesystems when a rename is not possible
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}

fn build_record(path: &Path, md5: &str, meta_filename: &str, updated: NaiveDateTime) -> Result<ContentRecord> {
    let meta = get_metadata(path, meta_filename)?;
    let size = fs::metadata(path)?.len();
    ContentRecord::from_metadata(meta, md5, size, updated)
}

/// Index spooled downloads and move them into the content directory
///
/// Downloads that are missing or carry bad metadata are left in the spool and
/// reported as failed. Nothing is moved unless indexing succeeds, and a
/// download that cannot be moved is dropped from the index again.
pub async fn add_to_archive(archive: &Archive, config: &Config, md5s: &[String]) -> Result<AddReport> {
    let spool = config.spool_dir();
    let content_dir = config.content_dir();
    fs::create_dir_all(&content_dir)?;

    let now = Utc::now().naive_utc();
    let mut report = AddReport::default();
    let mut pending = Vec::with_capacity(md5s.len());
    let mut records = Vec::with_capacity(md5s.len());

    for md5 in md5s {
        let source = spool.join(format!("{}.zip", md5));
        if !source.is_file() {
            warn!(md5 = %md5, "Download not found in spool");
            report.failed.push((md5.clone(), "not found in spool".to_string()));
            continue;
        }

        match build_record(&source, md5, &config.content.metadata, now) {
            Ok(record) => {
                pending.push((md5.clone(), source));
                records.push(record);
            }
            Err(e) => {
                warn!(md5 = %md5, "Skipping download with bad metadata: {}", e);
                report.failed.push((md5.clone(), e.to_string()));
            }
        }
    }

    if records.is_empty() {
        return Ok(report);
    }
    archive.add_meta_to_db(&records, &[]).await?;

    let pb = add_progress_bar(pending.len() as u64, "Adding downloads");
    let mut unmoved = Vec::new();
    for (md5, source) in pending {
        pb.inc(1);
        match move_file(&source, &content_dir.join(format!("{}.zip", md5))) {
            Ok(()) => report.added.push(md5),
            Err(e) => {
                warn!(md5 = %md5, "Could not move download into content directory: {}", e);
                report.failed.push((md5.clone(), e.to_string()));
                unmoved.push(md5);
            }
        }
    }
    pb.finish_and_clear();

    if !unmoved.is_empty() {
        archive.remove_meta_from_db(&unmoved).await?;
    }
    info!(
        added = report.added.len(),
        failed = report.failed.len(),
        "Added downloads to archive"
    );
    Ok(report)
}

/// Delete spooled downloads; returns the number of files removed
pub fn remove_downloads(spool: &Path, md5s: &[String]) -> usize {
    let mut removed = 0;
    for md5 in md5s {
        let path = spool.join(format!("{}.zip", md5));
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), "Could not remove download: {}", e),
        }
    }
    removed
}

/// Delete content files and their index rows
///
/// Returns the md5s that were removed and those whose file could not be
/// deleted. Content without a zipball is dropped from the index.
pub async fn remove_from_archive(
    archive: &Archive,
    config: &Config,
    md5s: &[String],
) -> Result<(Vec<String>, Vec<String>)> {
    let content_dir = config.content_dir();
    let mut removed = Vec::new();
    let mut failed = Vec::new();

    for md5 in md5s {
        match get_zip_path(md5, &content_dir) {
            Some(path) => match fs::remove_file(&path) {
                Ok(()) => removed.push(md5.clone()),
                Err(e) => {
                    warn!(md5 = %md5, "Could not remove zipball: {}", e);
                    failed.push(md5.clone());
                }
            },
            None => {
                debug!(md5 = %md5, "No zipball on disk, removing index entry only");
                removed.push(md5.clone());
            }
        }
    }

    archive.remove_meta_from_db(&removed).await?;
    Ok((removed, failed))
}

fn modified_at(path: &Path) -> NaiveDateTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t).naive_utc())
        .unwrap_or_else(|_| Utc::now().naive_utc())
}

/// Read the metadata of every zipball in the content directory
///
/// Zipballs with bad metadata are skipped. `updated` is the file's
/// modification time.
pub fn reload_data(content_dir: &Path, meta_filename: &str) -> Result<Vec<ContentRecord>> {
    let mut records = Vec::new();
    for path in get_zipballs(content_dir)? {
        let Some(md5) = get_md5_from_path(&path) else {
            continue;
        };
        match build_record(&path, &md5, meta_filename, modified_at(&path)) {
            Ok(record) => records.push(record),
            Err(e) => warn!(md5 = %md5, "Skipping zipball with bad metadata: {}", e),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Meta;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn metadata_json(title: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "url": "http://example.com/",
            "title": title,
            "timestamp": "2014-08-10 19:59:19 UTC",
            "license": "CC-BY",
        }))
        .unwrap()
    }

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_bundle(dir: &Path, md5: &str, title: &str) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(format!("{}.zip", md5));
        let meta = metadata_json(title);
        let meta_name = format!("{}/info.json", md5);
        let index_name = format!("{}/index.html", md5);
        write_zip(
            &path,
            &[
                (meta_name.as_str(), meta.as_slice()),
                (index_name.as_str(), b"<html></html>".as_slice()),
            ],
        );
        path
    }

    async fn setup() -> (Archive, Config, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.content.spool_dir = "spool".to_string();
        let archive = Archive::connect(&config).await.unwrap();
        (archive, config, tmp)
    }

    struct FailingDecryptor;

    impl Decryptor for FailingDecryptor {
        fn decryptable(&self, spool: &Path) -> Result<Vec<PathBuf>> {
            Ok(vec![spool.join("a.sig"), spool.join("b.sig")])
        }

        fn decrypt(&self, path: &Path) -> Result<PathBuf> {
            if path.ends_with("a.sig") {
                Ok(path.with_extension("zip"))
            } else {
                Err(Error::Other("bad signature".to_string()))
            }
        }
    }

    #[test]
    fn test_md5_and_zip_path() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            get_md5_from_path(Path::new("/spool/abc123.zip")).as_deref(),
            Some("abc123")
        );
        assert!(get_zip_path("abc123", tmp.path()).is_none());

        write_bundle(tmp.path(), "abc123", "Title");
        assert_eq!(
            get_zip_path("abc123", tmp.path()),
            Some(tmp.path().join("abc123.zip"))
        );
    }

    #[test]
    fn test_decrypt_all_collects_errors() {
        let spool = Path::new("/spool");
        let files = get_decryptable(&FailingDecryptor, spool).unwrap();
        let (extracted, errors) = decrypt_all(&FailingDecryptor, &files);
        assert_eq!(extracted, vec![PathBuf::from("/spool/a.zip")]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, PathBuf::from("/spool/b.sig"));

        assert!(get_decryptable(&NoDecryptor, spool).unwrap().is_empty());
    }

    #[test]
    fn test_get_zipballs() {
        let tmp = TempDir::new().unwrap();
        assert!(get_zipballs(&tmp.path().join("missing")).unwrap().is_empty());

        write_bundle(tmp.path(), "b", "B");
        write_bundle(tmp.path(), "a", "A");
        fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(tmp.path().join("nested.zip")).unwrap();

        let found = get_zipballs(tmp.path()).unwrap();
        assert_eq!(found, vec![tmp.path().join("a.zip"), tmp.path().join("b.zip")]);
    }

    #[test]
    fn test_get_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = write_bundle(tmp.path(), "abc", "Nested");
        let meta = get_metadata(&path, "info.json").unwrap();
        assert_eq!(meta["title"], json!("Nested"));

        let top = tmp.path().join("top.zip");
        let top_meta = metadata_json("Top");
        write_zip(&top, &[("info.json", top_meta.as_slice())]);
        assert_eq!(get_metadata(&top, "info.json").unwrap()["title"], json!("Top"));

        let empty = tmp.path().join("empty.zip");
        write_zip(&empty, &[("readme.txt", b"hi".as_slice())]);
        assert!(matches!(get_metadata(&empty, "info.json"), Err(Error::Format(_))));

        let broken = tmp.path().join("broken.zip");
        write_zip(&broken, &[("info.json", b"{not json".as_slice())]);
        assert!(matches!(get_metadata(&broken, "info.json"), Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_add_to_archive() {
        let (archive, config, _tmp) = setup().await;
        let spool = config.spool_dir();
        write_bundle(&spool, "good", "Good");
        fs::write(spool.join("bad.zip"), b"not a zip").unwrap();

        let listed = list_downloads(&spool, "info.json").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].error.is_some());
        assert!(listed[1].metadata.is_some());

        let md5s = vec!["good".to_string(), "bad".to_string(), "missing".to_string()];
        let report = add_to_archive(&archive, &config, &md5s).await.unwrap();
        assert_eq!(report.added, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 2);

        assert!(!spool.join("good.zip").exists());
        assert!(spool.join("bad.zip").exists());
        assert!(get_zip_path("good", &config.content_dir()).is_some());

        let record = archive.get_single("good").await.unwrap().unwrap();
        assert_eq!(record.title, "Good");
        assert!(record.size > 0);
    }

    #[tokio::test]
    async fn test_remove_from_archive_and_reload() {
        let (archive, config, _tmp) = setup().await;
        let content_dir = config.content_dir();
        write_bundle(&content_dir, "a", "Alpha");
        write_bundle(&content_dir, "b", "Beta");

        let rows = archive
            .clear_and_reload(&content_dir, &config.content.metadata)
            .await
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(archive.zipball_count().await.unwrap(), 2);

        let (removed, failed) = remove_from_archive(&archive, &config, &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec!["a".to_string()]);
        assert!(failed.is_empty());
        assert!(!content_dir.join("a.zip").exists());
        assert!(archive.get_single("a").await.unwrap().is_none());
        assert_eq!(archive.zipball_count().await.unwrap(), 1);
    }

    async fn fail_inserts(archive: &Archive) {
        sqlx::query(
            "CREATE TRIGGER no_insert BEFORE INSERT ON zipballs BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .execute(archive.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_add_to_archive_keeps_spool_when_indexing_fails() {
        let (archive, config, _tmp) = setup().await;
        let spool = config.spool_dir();
        write_bundle(&spool, "a", "Alpha");
        fail_inserts(&archive).await;

        let result = add_to_archive(&archive, &config, &["a".to_string()]).await;
        assert!(matches!(result, Err(Error::Database(_))));

        assert!(spool.join("a.zip").exists());
        assert!(get_zip_path("a", &config.content_dir()).is_none());
        assert!(archive.get_single("a").await.unwrap().is_none());
        assert_eq!(list_downloads(&spool, "info.json").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_drops_taggings_with_records() {
        let (archive, config, _tmp) = setup().await;
        let content_dir = config.content_dir();
        write_bundle(&content_dir, "a", "Alpha");
        archive
            .clear_and_reload(&content_dir, &config.content.metadata)
            .await
            .unwrap();

        let mut meta = Meta::new(archive.get_single("a").await.unwrap().unwrap(), "covers", None);
        archive.add_tags(&mut meta, &["news".to_string()]).await.unwrap();
        assert_eq!(archive.get_tag_cloud().await.unwrap().len(), 1);

        archive
            .clear_and_reload(&content_dir, &config.content.metadata)
            .await
            .unwrap();
        let mut meta = Meta::new(archive.get_single("a").await.unwrap().unwrap(), "covers", None);
        assert!(meta.tags.is_empty());
        assert!(archive.get_tag_cloud().await.unwrap().is_empty());

        // Tags can be attached again and removed cleanly
        archive.add_tags(&mut meta, &["news".to_string()]).await.unwrap();
        archive.remove_tags(&mut meta, &["news".to_string()]).await.unwrap();
        assert!(meta.tags.is_empty());
        assert!(archive.get_tag_cloud().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_index() {
        let (archive, config, _tmp) = setup().await;
        let content_dir = config.content_dir();
        write_bundle(&content_dir, "a", "Alpha");
        archive
            .clear_and_reload(&content_dir, &config.content.metadata)
            .await
            .unwrap();
        let mut meta = Meta::new(archive.get_single("a").await.unwrap().unwrap(), "covers", None);
        archive.add_tags(&mut meta, &["news".to_string()]).await.unwrap();
        archive.add_view("a").await.unwrap();

        write_bundle(&content_dir, "b", "Beta");
        fail_inserts(&archive).await;
        assert!(archive
            .clear_and_reload(&content_dir, &config.content.metadata)
            .await
            .is_err());

        assert_eq!(archive.zipball_count().await.unwrap(), 1);
        let stored = archive.get_single("a").await.unwrap().unwrap();
        assert_eq!(stored.views, 1);
        assert_eq!(Meta::new(stored, "covers", None).tags, meta.tags);
        assert_eq!(archive.get_tag_cloud().await.unwrap().len(), 1);
    }

    #[test]
    fn test_remove_downloads() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path(), "a", "A");
        let removed = remove_downloads(tmp.path(), &["a".to_string(), "gone".to_string()]);
        assert_eq!(removed, 1);
        assert!(!tmp.path().join("a.zip").exists());
    }
}
