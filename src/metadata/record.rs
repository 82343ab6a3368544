//! Indexed content record

use super::MetaMap;
use crate::error::{Error, Result};
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Storage format of the `updated` column, understood by SQLite's date functions
pub const UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A content zipball as stored in the `zipballs` table
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ContentRecord {
    pub md5: String,
    pub url: String,
    pub title: String,
    pub images: i64,
    pub timestamp: String,
    pub keep_formatting: bool,
    pub is_partner: bool,
    pub is_sponsored: bool,
    pub archive: String,
    pub publisher: String,
    pub license: Option<String>,
    pub language: String,
    pub multipage: bool,
    pub entry_point: String,
    pub broadcast: Option<String>,
    pub keywords: String,
    pub size: i64,
    pub updated: String,
    #[serde(default)]
    pub views: i64,
    /// JSON map of tag name to tag id
    #[serde(default)]
    pub tags: Option<String>,
}

impl ContentRecord {
    /// Build a record from normalized metadata plus the auto-filled fields
    pub fn from_metadata(
        mut meta: MetaMap,
        md5: &str,
        size: u64,
        updated: NaiveDateTime,
    ) -> Result<Self> {
        meta.insert("md5".to_string(), Value::String(md5.to_string()));
        meta.insert("size".to_string(), Value::from(size));
        meta.insert(
            "updated".to_string(),
            Value::String(updated.format(UPDATED_FORMAT).to_string()),
        );

        serde_json::from_value(Value::Object(meta))
            .map_err(|e| Error::Format(format!("Invalid metadata for '{}': {}", md5, e)))
    }

    /// Build a record stamped with the current time
    pub fn from_metadata_now(meta: MetaMap, md5: &str, size: u64) -> Result<Self> {
        Self::from_metadata(meta, md5, size, Utc::now().naive_utc())
    }

    /// Parsed `updated` column
    pub fn updated_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.updated, UPDATED_FORMAT).ok()
    }
}

/// A tag row
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: i64,
    pub name: String,
}

/// A tag with the number of contents carrying it
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub tag_id: i64,
    pub count: i64,
}

/// Title lookup result
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TitleEntry {
    pub title: String,
    pub md5: String,
}
