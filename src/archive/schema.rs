//! SQLite schema definition

/// SQL schema for the archive database
pub const SCHEMA_SQL: &str = r#"
-- Zipballs: one row per indexed content bundle
CREATE TABLE IF NOT EXISTS zipballs (
    md5 TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    title TEXT NOT NULL,
    images INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL,
    keep_formatting BOOLEAN NOT NULL DEFAULT 0,
    is_partner BOOLEAN NOT NULL DEFAULT 0,
    is_sponsored BOOLEAN NOT NULL DEFAULT 0,
    archive TEXT NOT NULL DEFAULT 'core',
    publisher TEXT NOT NULL DEFAULT '',
    license TEXT,
    language TEXT NOT NULL DEFAULT '',
    multipage BOOLEAN NOT NULL DEFAULT 0,
    entry_point TEXT NOT NULL DEFAULT 'index.html',
    broadcast TEXT,
    keywords TEXT NOT NULL DEFAULT '',
    size INTEGER NOT NULL,
    updated TEXT NOT NULL,
    views INTEGER NOT NULL DEFAULT 0,
    tags TEXT
);

-- Tags: created on first use, never removed
CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Taggings: many-to-many between zipballs and tags
CREATE TABLE IF NOT EXISTS taggings (
    tag_id INTEGER NOT NULL REFERENCES tags(tag_id),
    md5 TEXT NOT NULL,
    UNIQUE(tag_id, md5)
);

-- Indexes for browsing
CREATE INDEX IF NOT EXISTS idx_zipballs_updated ON zipballs(updated);
CREATE INDEX IF NOT EXISTS idx_zipballs_language ON zipballs(language);
CREATE INDEX IF NOT EXISTS idx_taggings_md5 ON taggings(md5);
"#;

/// Columns written when indexing a record; `views` and `tags` belong to the
/// librarian and survive re-indexing
pub const INSERT_COLUMNS: &[&str] = &[
    "md5",
    "url",
    "title",
    "images",
    "timestamp",
    "keep_formatting",
    "is_partner",
    "is_sponsored",
    "archive",
    "publisher",
    "license",
    "language",
    "multipage",
    "entry_point",
    "broadcast",
    "keywords",
    "size",
    "updated",
];
