//! Archive index stored in SQLite
//!
//! This module holds the relational side of the library:
//! - Zipballs (one row per content bundle, keyed by md5)
//! - Tags (created lazily, never deleted)
//! - Taggings (many-to-many between zipballs and tags)

mod query;
mod schema;

pub use query::*;
pub use schema::*;

use crate::config::{default_search_order, Config};
use crate::error::{Error, Result};
use crate::metadata::{ContentRecord, Meta, Tag, TagCount, TitleEntry, UPDATED_FORMAT};
use chrono::NaiveDateTime;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Split a comma-separated tag list into trimmed, unique, non-empty names
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn upsert_sql() -> String {
    let placeholders = vec!["?"; INSERT_COLUMNS.len()].join(", ");
    let updates = INSERT_COLUMNS
        .iter()
        .filter(|c| **c != "md5")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO zipballs ({}) VALUES ({}) ON CONFLICT(md5) DO UPDATE SET {}",
        INSERT_COLUMNS.join(", "),
        placeholders,
        updates
    )
}

/// Bind a record's fields in [`INSERT_COLUMNS`] order
fn bind_record<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    record: &'q ContentRecord,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(&record.md5)
        .bind(&record.url)
        .bind(&record.title)
        .bind(record.images)
        .bind(&record.timestamp)
        .bind(record.keep_formatting)
        .bind(record.is_partner)
        .bind(record.is_sponsored)
        .bind(&record.archive)
        .bind(&record.publisher)
        .bind(&record.license)
        .bind(&record.language)
        .bind(record.multipage)
        .bind(&record.entry_point)
        .bind(&record.broadcast)
        .bind(&record.keywords)
        .bind(record.size)
        .bind(&record.updated)
}

/// Append `(?, ?, ...)` binding each value
fn push_text_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, values: &'a [String]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value.as_str());
    }
    separated.push_unseparated(")");
}

/// Upsert `records` and delete the `replaced` ones on `conn`
async fn write_records(
    conn: &mut SqliteConnection,
    records: &[ContentRecord],
    replaced: &[String],
) -> Result<u64> {
    let sql = upsert_sql();

    debug!(count = records.len(), "Adding new content to archive database");
    let mut rowcount = 0;
    for record in records {
        let result = bind_record(sqlx::query(&sql), record)
            .execute(&mut *conn)
            .await?;
        rowcount += result.rows_affected();
    }

    // A bundle never replaces itself
    let replaced: Vec<String> = replaced
        .iter()
        .filter(|md5| !records.iter().any(|r| &r.md5 == *md5))
        .cloned()
        .collect();
    if !replaced.is_empty() {
        debug!(count = replaced.len(), "Removing replaced content from archive database");
        for table in ["zipballs", "taggings"] {
            let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE md5 IN ", table));
            push_text_list(&mut qb, &replaced);
            qb.build().execute(&mut *conn).await?;
        }
    }

    Ok(rowcount)
}

/// Archive database handle
#[derive(Clone)]
pub struct Archive {
    pool: SqlitePool,
    /// Pre-rendered `ORDER BY` clause for searches
    search_order: String,
}

impl Archive {
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Connect to the archive database described by the config
    pub async fn connect(config: &Config) -> Result<Self> {
        let archive = Self::new(&config.paths.db_file).await?;
        archive.with_search_order(&config.archive.search_order)
    }

    /// Open (and create if needed) the archive database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let archive = Self {
            pool,
            search_order: order_clause(&default_search_order())?,
        };

        if !archive.is_initialized().await? {
            archive.init_schema().await?;
        }

        Ok(archive)
    }

    /// Use a different ordering for search results
    pub fn with_search_order<S: AsRef<str>>(mut self, order: &[S]) -> Result<Self> {
        self.search_order = order_clause(order)?;
        Ok(self)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing archive schema");
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='zipballs'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Browsing =====

    /// Number of records matching the filter
    pub async fn get_count(&self, filter: &ContentFilter) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*)");
        filter.push_from(&mut qb);
        qb.push(" WHERE 1 = 1");
        filter.push_conditions(&mut qb);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Number of records whose title contains `terms` and that match the filter
    pub async fn get_search_count(&self, terms: &str, filter: &ContentFilter) -> Result<i64> {
        let pattern = like_pattern(terms);
        let mut qb = QueryBuilder::new("SELECT COUNT(*)");
        filter.push_from(&mut qb);
        qb.push(" WHERE title LIKE ").push_bind(pattern.as_str());
        filter.push_conditions(&mut qb);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// One page of records, most recently updated and most viewed first
    pub async fn get_content(&self, filter: &ContentFilter, page: Page) -> Result<Vec<ContentRecord>> {
        let mut qb = QueryBuilder::new("SELECT zipballs.*");
        filter.push_from(&mut qb);
        qb.push(" WHERE 1 = 1");
        filter.push_conditions(&mut qb);
        qb.push(order_clause(CONTENT_ORDER)?);
        page.push(&mut qb);
        let records = qb
            .build_query_as::<ContentRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// One page of records whose title contains `terms`, in search order
    pub async fn search_content(
        &self,
        terms: &str,
        filter: &ContentFilter,
        page: Page,
    ) -> Result<Vec<ContentRecord>> {
        let pattern = like_pattern(terms);
        let mut qb = QueryBuilder::new("SELECT zipballs.*");
        filter.push_from(&mut qb);
        qb.push(" WHERE title LIKE ").push_bind(pattern.as_str());
        filter.push_conditions(&mut qb);
        qb.push(self.search_order.as_str());
        page.push(&mut qb);
        let records = qb
            .build_query_as::<ContentRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Get a record by md5
    pub async fn get_single(&self, md5: &str) -> Result<Option<ContentRecord>> {
        let record = sqlx::query_as::<_, ContentRecord>("SELECT * FROM zipballs WHERE md5 = ?")
            .bind(md5)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Titles of the given records
    pub async fn get_titles(&self, md5s: &[String]) -> Result<Vec<TitleEntry>> {
        if md5s.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new("SELECT title, md5 FROM zipballs WHERE md5 IN ");
        push_text_list(&mut qb, md5s);
        let titles = qb
            .build_query_as::<TitleEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(titles)
    }

    /// Records whose URL mentions `domain`
    pub async fn content_for_domain(&self, domain: &str) -> Result<Vec<ContentRecord>> {
        let pattern = like_pattern(domain);
        let mut qb = QueryBuilder::new("SELECT * FROM zipballs WHERE url LIKE ");
        qb.push_bind(pattern.as_str());
        qb.push(self.search_order.as_str());
        let records = qb
            .build_query_as::<ContentRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// All records, least recently updated and least viewed first
    pub async fn get_stalest(&self) -> Result<Vec<ContentRecord>> {
        let sql = format!(
            "SELECT * FROM zipballs{}",
            order_clause(&["datetime(updated)", "views"])?
        );
        let records = sqlx::query_as::<_, ContentRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    // ===== Indexing =====

    /// Index `records` and drop the `replaced` ones, atomically
    ///
    /// Records whose md5 is already indexed are overwritten; their view count
    /// and tags are kept. Returns the number of rows written.
    pub async fn add_meta_to_db(&self, records: &[ContentRecord], replaced: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let rowcount = write_records(&mut *tx, records, replaced).await?;
        tx.commit().await?;
        Ok(rowcount)
    }

    /// Remove records and their taggings; returns the number of records removed
    pub async fn remove_meta_from_db(&self, md5s: &[String]) -> Result<u64> {
        if md5s.is_empty() {
            return Ok(0);
        }

        debug!("Removing {} items from archive database", md5s.len());
        let mut tx = self.pool.begin().await?;

        let mut qb = QueryBuilder::new("DELETE FROM zipballs WHERE md5 IN ");
        push_text_list(&mut qb, md5s);
        let rowcount = qb.build().execute(&mut *tx).await?.rows_affected();

        let mut qb = QueryBuilder::new("DELETE FROM taggings WHERE md5 IN ");
        push_text_list(&mut qb, md5s);
        qb.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(rowcount)
    }

    /// Drop every record and re-index the zipballs found in `content_dir`
    ///
    /// Taggings go with the records. The index is only replaced once the whole
    /// directory has been read and written.
    pub async fn clear_and_reload(&self, content_dir: &Path, meta_filename: &str) -> Result<u64> {
        debug!("Content refill started");
        let records = crate::downloads::reload_data(content_dir, meta_filename)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM taggings").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM zipballs").execute(&mut *tx).await?;
        let rows = write_records(&mut *tx, &records, &[]).await?;
        tx.commit().await?;

        info!("Content refill finished for {} pieces of content", rows);
        Ok(rows)
    }

    // ===== Statistics =====

    pub async fn zipball_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM zipballs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Timestamp of the most recently updated record
    pub async fn last_update(&self) -> Result<Option<NaiveDateTime>> {
        let updated: Option<String> =
            sqlx::query_scalar("SELECT updated FROM zipballs ORDER BY updated DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(updated.and_then(|u| NaiveDateTime::parse_from_str(&u, UPDATED_FORMAT).ok()))
    }

    /// Total size in bytes of indexed zipballs
    pub async fn archive_space_used(&self) -> Result<u64> {
        let used: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size), 0) FROM zipballs")
            .fetch_one(&self.pool)
            .await?;
        Ok(used.max(0) as u64)
    }

    /// Increment the view count of a record
    ///
    /// Exactly one row must change; anything else means the index is corrupt.
    pub async fn add_view(&self, md5: &str) -> Result<u64> {
        let updated = sqlx::query("UPDATE zipballs SET views = views + 1 WHERE md5 = ?")
            .bind(md5)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated != 1 {
            return Err(Error::Consistency(format!(
                "view count update for '{}' touched {} rows, expected 1",
                md5, updated
            )));
        }
        Ok(updated)
    }

    /// Whether the content needs the formatting patch applied
    pub async fn needs_formatting(&self, md5: &str) -> Result<bool> {
        let keep: Option<bool> =
            sqlx::query_scalar("SELECT keep_formatting FROM zipballs WHERE md5 = ?")
                .bind(md5)
                .fetch_optional(&self.pool)
                .await?;
        keep.map(|k| !k)
            .ok_or_else(|| Error::ContentNotFound(md5.to_string()))
    }

    // ===== Tags =====

    /// Tag the content with `names`, creating missing tags
    ///
    /// Returns the tags now attached. The wrapper's tag map is updated only
    /// once the transaction has committed.
    pub async fn add_tags(&self, meta: &mut Meta, names: &[String]) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        for name in names {
            sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        let mut qb = QueryBuilder::new("SELECT tag_id, name FROM tags WHERE name IN ");
        push_text_list(&mut qb, names);
        let tags = qb.build_query_as::<Tag>().fetch_all(&mut *tx).await?;

        for tag in &tags {
            sqlx::query("INSERT OR IGNORE INTO taggings (tag_id, md5) VALUES (?, ?)")
                .bind(tag.tag_id)
                .bind(meta.md5())
                .execute(&mut *tx)
                .await?;
        }

        let mut merged = meta.tags.clone();
        merged.extend(tags.iter().map(|t| (t.name.clone(), t.tag_id)));
        sqlx::query("UPDATE zipballs SET tags = ? WHERE md5 = ?")
            .bind(serde_json::to_string(&merged)?)
            .bind(meta.md5())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        meta.set_tags(merged)?;

        debug!(md5 = %meta.md5(), count = tags.len(), "Tagged content");
        Ok(tags)
    }

    /// Remove the named tags from the content; names it does not carry are ignored
    pub async fn remove_tags(&self, meta: &mut Meta, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let tag_ids: Vec<i64> = names
            .iter()
            .filter_map(|name| meta.tags.get(name).copied())
            .collect();
        let remaining: BTreeMap<String, i64> = meta
            .tags
            .iter()
            .filter(|(name, _)| !names.contains(name))
            .map(|(name, id)| (name.clone(), *id))
            .collect();

        let mut tx = self.pool.begin().await?;

        if !tag_ids.is_empty() {
            let mut qb = QueryBuilder::new("DELETE FROM taggings WHERE md5 = ");
            qb.push_bind(meta.md5()).push(" AND tag_id IN (");
            let mut separated = qb.separated(", ");
            for id in &tag_ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            qb.build().execute(&mut *tx).await?;
        }

        sqlx::query("UPDATE zipballs SET tags = ? WHERE md5 = ?")
            .bind(serde_json::to_string(&remaining)?)
            .bind(meta.md5())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        meta.set_tags(remaining)?;
        Ok(())
    }

    pub async fn get_tag_name(&self, tag_id: i64) -> Result<Option<String>> {
        let name = sqlx::query_scalar("SELECT name FROM tags WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    pub async fn get_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let tag = sqlx::query_as::<_, Tag>("SELECT tag_id, name FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tag)
    }

    /// Every tag ever created, by name
    pub async fn get_tags(&self) -> Result<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>("SELECT tag_id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(tags)
    }

    /// Tags in use with their usage counts, most used first
    pub async fn get_tag_cloud(&self) -> Result<Vec<TagCount>> {
        let cloud = sqlx::query_as::<_, TagCount>(
            r#"
            SELECT name, tag_id, COUNT(taggings.tag_id) AS count
            FROM tags NATURAL JOIN taggings
            GROUP BY taggings.tag_id
            ORDER BY count DESC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::convert_json;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Archive, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));

        let archive = Archive::connect(&config).await.unwrap();
        (archive, tmp)
    }

    fn record(md5: &str, title: &str, day: u32) -> ContentRecord {
        let raw = serde_json::to_vec(&json!({
            "url": format!("http://{}.example.com/", md5),
            "title": title,
            "timestamp": "2014-08-10 19:59:19 UTC",
            "license": "CC-BY",
            "language": "en",
        }))
        .unwrap();
        let updated = NaiveDate::from_ymd_opt(2015, 1, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        ContentRecord::from_metadata(convert_json(&raw).unwrap(), md5, 100, updated).unwrap()
    }

    fn md5s(records: &[ContentRecord]) -> Vec<&str> {
        records.iter().map(|r| r.md5.as_str()).collect()
    }

    #[tokio::test]
    async fn test_reindex_same_md5_keeps_one_record() {
        let (archive, _tmp) = setup_test_db().await;

        archive.add_meta_to_db(&[record("a", "First", 1)], &[]).await.unwrap();
        archive.add_view("a").await.unwrap();
        archive
            .add_meta_to_db(&[record("a", "Second", 2)], &[])
            .await
            .unwrap();

        assert_eq!(archive.zipball_count().await.unwrap(), 1);
        let loaded = archive.get_single("a").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Second");
        assert_eq!(loaded.updated, "2015-01-02 12:00:00");
        assert_eq!(loaded.views, 1);
    }

    #[tokio::test]
    async fn test_add_meta_removes_replaced() {
        let (archive, _tmp) = setup_test_db().await;
        archive
            .add_meta_to_db(&[record("old", "Old", 1), record("keep", "Keep", 1)], &[])
            .await
            .unwrap();

        let written = archive
            .add_meta_to_db(
                &[record("new", "New", 2)],
                &["old".to_string(), "new".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(written, 1);

        assert!(archive.get_single("old").await.unwrap().is_none());
        assert!(archive.get_single("new").await.unwrap().is_some());
        assert_eq!(archive.zipball_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_add_meta_rolls_back_when_replacing_fails() {
        let (archive, _tmp) = setup_test_db().await;
        archive.add_meta_to_db(&[record("old", "Old", 1)], &[]).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER no_delete BEFORE DELETE ON zipballs BEGIN SELECT RAISE(ABORT, 'locked'); END",
        )
        .execute(archive.pool())
        .await
        .unwrap();

        let result = archive
            .add_meta_to_db(&[record("new", "New", 2)], &["old".to_string()])
            .await;
        assert!(matches!(result, Err(Error::Database(_))));

        assert!(archive.get_single("new").await.unwrap().is_none());
        assert!(archive.get_single("old").await.unwrap().is_some());
        assert_eq!(archive.zipball_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_listing_order_and_pagination() {
        let (archive, _tmp) = setup_test_db().await;
        archive
            .add_meta_to_db(
                &[
                    record("a", "Alpha", 1),
                    record("b", "Beta", 3),
                    record("c", "Gamma", 3),
                    record("d", "Delta", 2),
                ],
                &[],
            )
            .await
            .unwrap();
        archive.add_view("c").await.unwrap();

        let all = archive
            .get_content(&ContentFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(md5s(&all), vec!["c", "b", "d", "a"]);

        let page = archive
            .get_content(&ContentFilter::default(), Page::new(1, 2))
            .await
            .unwrap();
        assert_eq!(md5s(&page), vec!["b", "d"]);

        let tail = archive
            .get_content(&ContentFilter::default(), Page { offset: 3, limit: None })
            .await
            .unwrap();
        assert_eq!(md5s(&tail), vec!["a"]);
    }

    #[tokio::test]
    async fn test_filters() {
        let (archive, _tmp) = setup_test_db().await;
        let mut french = record("fr", "Bonjour", 1);
        french.language = "fr".to_string();
        french.multipage = true;
        archive
            .add_meta_to_db(&[french, record("en", "Hello", 2)], &[])
            .await
            .unwrap();

        let fr = ContentFilter::default().with_lang("fr");
        assert_eq!(archive.get_count(&fr).await.unwrap(), 1);
        let multi = ContentFilter::default().with_multipage(true);
        let found = archive.get_content(&multi, Page::default()).await.unwrap();
        assert_eq!(md5s(&found), vec!["fr"]);
        let single = ContentFilter::default().with_multipage(false);
        assert_eq!(archive.get_count(&single).await.unwrap(), 1);
        assert_eq!(archive.get_count(&ContentFilter::default()).await.unwrap(), 2);

        let mut meta = Meta::new(archive.get_single("en").await.unwrap().unwrap(), "covers", None);
        let tags = archive.add_tags(&mut meta, &["news".to_string()]).await.unwrap();
        let by_tag = ContentFilter::default().with_tag(tags[0].tag_id);
        let tagged = archive.get_content(&by_tag, Page::default()).await.unwrap();
        assert_eq!(md5s(&tagged), vec!["en"]);
        assert_eq!(archive.get_count(&by_tag).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search() {
        let (archive, _tmp) = setup_test_db().await;
        archive
            .add_meta_to_db(
                &[
                    record("a", "Rust Programming", 1),
                    record("b", "Cooking with rust-free pans", 2),
                    record("c", "Gardening", 3),
                ],
                &[],
            )
            .await
            .unwrap();

        let filter = ContentFilter::default();
        assert_eq!(archive.get_search_count("RUST", &filter).await.unwrap(), 2);
        let found = archive
            .search_content("rust", &filter, Page::default())
            .await
            .unwrap();
        assert_eq!(md5s(&found), vec!["b", "a"]);

        let archive = archive.with_search_order(&["title"]).unwrap();
        let found = archive
            .search_content("rust", &filter, Page::new(0, 1))
            .await
            .unwrap();
        assert_eq!(md5s(&found), vec!["b"]);
    }

    #[tokio::test]
    async fn test_titles_and_domain() {
        let (archive, _tmp) = setup_test_db().await;
        archive
            .add_meta_to_db(&[record("a", "Alpha", 1), record("b", "Beta", 2)], &[])
            .await
            .unwrap();

        let titles = archive.get_titles(&["b".to_string()]).await.unwrap();
        assert_eq!(
            titles,
            vec![TitleEntry {
                title: "Beta".to_string(),
                md5: "b".to_string()
            }]
        );
        assert!(archive.get_titles(&[]).await.unwrap().is_empty());

        let found = archive.content_for_domain("A.EXAMPLE.com").await.unwrap();
        assert_eq!(md5s(&found), vec!["a"]);
    }

    #[tokio::test]
    async fn test_add_view_requires_exactly_one_row() {
        let (archive, _tmp) = setup_test_db().await;
        archive.add_meta_to_db(&[record("a", "Alpha", 1)], &[]).await.unwrap();

        assert_eq!(archive.add_view("a").await.unwrap(), 1);
        assert_eq!(archive.get_single("a").await.unwrap().unwrap().views, 1);

        let err = archive.add_view("missing").await.unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_tags_round_trip() {
        let (archive, _tmp) = setup_test_db().await;
        archive.add_meta_to_db(&[record("a", "Alpha", 1)], &[]).await.unwrap();
        let mut meta = Meta::new(archive.get_single("a").await.unwrap().unwrap(), "covers", None);

        archive
            .add_tags(&mut meta, &["existing".to_string()])
            .await
            .unwrap();
        let original = meta.tags.clone();

        let names = vec!["news".to_string(), "science".to_string()];
        let added = archive.add_tags(&mut meta, &names).await.unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(meta.tags.len(), 3);

        let stored = archive.get_single("a").await.unwrap().unwrap();
        assert_eq!(Meta::new(stored, "covers", None).tags, meta.tags);

        archive.remove_tags(&mut meta, &names).await.unwrap();
        assert_eq!(meta.tags, original);

        let stored = archive.get_single("a").await.unwrap().unwrap();
        assert_eq!(Meta::new(stored, "covers", None).tags, original);

        let cloud = archive.get_tag_cloud().await.unwrap();
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud[0].name, "existing");

        // Orphaned tags are kept
        let all: Vec<String> = archive
            .get_tags()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(all, vec!["existing", "news", "science"]);
        let news = archive.get_tag_by_name("news").await.unwrap().unwrap();
        assert_eq!(
            archive.get_tag_name(news.tag_id).await.unwrap().as_deref(),
            Some("news")
        );
    }

    #[tokio::test]
    async fn test_tag_noops() {
        let (archive, _tmp) = setup_test_db().await;
        archive.add_meta_to_db(&[record("a", "Alpha", 1)], &[]).await.unwrap();
        let mut meta = Meta::new(archive.get_single("a").await.unwrap().unwrap(), "covers", None);

        assert!(archive.add_tags(&mut meta, &[]).await.unwrap().is_empty());
        archive.remove_tags(&mut meta, &[]).await.unwrap();
        archive
            .remove_tags(&mut meta, &["unknown".to_string()])
            .await
            .unwrap();
        assert!(meta.tags.is_empty());

        // Tagging twice does not duplicate taggings
        let names = vec!["news".to_string()];
        archive.add_tags(&mut meta, &names).await.unwrap();
        archive.add_tags(&mut meta, &names).await.unwrap();
        let cloud = archive.get_tag_cloud().await.unwrap();
        assert_eq!(cloud[0].count, 1);
    }

    #[tokio::test]
    async fn test_tag_cloud_order() {
        let (archive, _tmp) = setup_test_db().await;
        archive
            .add_meta_to_db(&[record("a", "Alpha", 1), record("b", "Beta", 1)], &[])
            .await
            .unwrap();
        for md5 in ["a", "b"] {
            let mut meta =
                Meta::new(archive.get_single(md5).await.unwrap().unwrap(), "covers", None);
            archive
                .add_tags(&mut meta, &["zebra".to_string(), format!("only-{}", md5)])
                .await
                .unwrap();
        }

        let cloud = archive.get_tag_cloud().await.unwrap();
        let names: Vec<&str> = cloud.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["zebra", "only-a", "only-b"]);
        assert_eq!(cloud[0].count, 2);
    }

    #[tokio::test]
    async fn test_remove_meta_from_db() {
        let (archive, _tmp) = setup_test_db().await;
        archive
            .add_meta_to_db(&[record("a", "Alpha", 1), record("b", "Beta", 2)], &[])
            .await
            .unwrap();
        let mut meta = Meta::new(archive.get_single("a").await.unwrap().unwrap(), "covers", None);
        archive.add_tags(&mut meta, &["news".to_string()]).await.unwrap();

        let removed = archive
            .remove_meta_from_db(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(archive.zipball_count().await.unwrap(), 1);
        assert!(archive.get_tag_cloud().await.unwrap().is_empty());
        assert_eq!(archive.remove_meta_from_db(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_statistics() {
        let (archive, _tmp) = setup_test_db().await;
        assert_eq!(archive.zipball_count().await.unwrap(), 0);
        assert!(archive.last_update().await.unwrap().is_none());
        assert_eq!(archive.archive_space_used().await.unwrap(), 0);

        archive
            .add_meta_to_db(&[record("a", "Alpha", 1), record("b", "Beta", 5)], &[])
            .await
            .unwrap();
        assert_eq!(archive.archive_space_used().await.unwrap(), 200);
        assert_eq!(
            archive.last_update().await.unwrap(),
            NaiveDate::from_ymd_opt(2015, 1, 5).unwrap().and_hms_opt(12, 0, 0)
        );

        let stalest = archive.get_stalest().await.unwrap();
        assert_eq!(md5s(&stalest), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_needs_formatting() {
        let (archive, _tmp) = setup_test_db().await;
        let mut keep = record("keep", "Keep", 1);
        keep.keep_formatting = true;
        archive
            .add_meta_to_db(&[keep, record("patch", "Patch", 1)], &[])
            .await
            .unwrap();

        assert!(!archive.needs_formatting("keep").await.unwrap());
        assert!(archive.needs_formatting("patch").await.unwrap());
        assert!(matches!(
            archive.needs_formatting("missing").await,
            Err(Error::ContentNotFound(_))
        ));
    }

    #[test]
    fn test_parse_tag_list() {
        assert_eq!(
            parse_tag_list(" news, science,,news ,"),
            vec!["news".to_string(), "science".to_string()]
        );
        assert!(parse_tag_list(" , ").is_empty());
    }
}
