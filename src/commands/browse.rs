//! Browse, search and view commands

use crate::archive::{Archive, ContentFilter, Page};
use crate::cleanup::hsize;
use crate::config::Config;
use crate::downloads::get_zip_path;
use crate::error::{Error, Result};
use crate::metadata::{ContentRecord, Meta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Filters and pagination shared by `list` and `search`
#[derive(Debug, Clone, Default)]
pub struct BrowseOptions {
    /// Tag name
    pub tag: Option<String>,
    pub lang: Option<String>,
    pub multipage: Option<bool>,
    /// 1-based page number
    pub page: u32,
    /// Overrides `archive.page_size`
    pub per_page: Option<u32>,
}

/// One line of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSummary {
    pub md5: String,
    pub title: String,
    pub url: String,
    pub language: String,
    pub label: String,
    pub updated: String,
    pub views: i64,
    pub size: i64,
    pub tags: Vec<String>,
}

impl ContentSummary {
    fn from_record(record: ContentRecord, config: &Config) -> Self {
        let meta = Meta::new(record, config.covers_dir(), None);
        let label = meta.label().to_string();
        let tags = meta.tags.keys().cloned().collect();
        let record = meta.into_record();
        Self {
            md5: record.md5,
            title: record.title,
            url: record.url,
            language: record.language,
            label,
            updated: record.updated,
            views: record.views,
            size: record.size,
            tags,
        }
    }
}

/// A page of listing or search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPage {
    pub query: Option<String>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub items: Vec<ContentSummary>,
}

impl ContentPage {
    pub fn page_count(&self) -> u32 {
        if self.total <= 0 {
            return 1;
        }
        let per_page = i64::from(self.per_page.max(1));
        ((self.total + per_page - 1) / per_page) as u32
    }
}

/// Everything known about one piece of content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDetails {
    pub record: ContentRecord,
    pub label: String,
    pub rtl: bool,
    pub i18n_attrs: String,
    pub free_license: bool,
    pub license_name: Option<String>,
    pub cover: Option<String>,
    pub tags: BTreeMap<String, i64>,
    pub has_zipball: bool,
}

/// Resolve the tag name into an id; `None` means the tag does not exist
async fn build_filter(archive: &Archive, options: &BrowseOptions) -> Result<Option<ContentFilter>> {
    let mut filter = ContentFilter {
        lang: options.lang.clone(),
        multipage: options.multipage,
        ..Default::default()
    };
    if let Some(name) = &options.tag {
        match archive.get_tag_by_name(name).await? {
            Some(tag) => filter.tag = Some(tag.tag_id),
            None => {
                debug!(tag = %name, "Unknown tag, nothing to list");
                return Ok(None);
            }
        }
    }
    Ok(Some(filter))
}

fn empty_page(query: Option<&str>, page: Page, number: u32) -> ContentPage {
    ContentPage {
        query: query.map(str::to_string),
        total: 0,
        page: number,
        per_page: page.limit.unwrap_or(0),
        items: Vec::new(),
    }
}

fn page_for(config: &Config, options: &BrowseOptions) -> (Page, u32) {
    let number = options.page.max(1);
    let per_page = options.per_page.unwrap_or(config.archive.page_size).max(1);
    (Page::numbered(number, per_page), number)
}

/// List content, most recently updated first
pub async fn cmd_list(config: &Config, archive: &Archive, options: &BrowseOptions) -> Result<ContentPage> {
    let (page, number) = page_for(config, options);
    let Some(filter) = build_filter(archive, options).await? else {
        return Ok(empty_page(None, page, number));
    };

    let total = archive.get_count(&filter).await?;
    let records = archive.get_content(&filter, page).await?;
    info!(total, shown = records.len(), "Listed content");

    Ok(ContentPage {
        query: None,
        total,
        page: number,
        per_page: page.limit.unwrap_or(0),
        items: records
            .into_iter()
            .map(|r| ContentSummary::from_record(r, config))
            .collect(),
    })
}

/// Search content titles
pub async fn cmd_search(
    config: &Config,
    archive: &Archive,
    terms: &str,
    options: &BrowseOptions,
) -> Result<ContentPage> {
    let (page, number) = page_for(config, options);
    let Some(filter) = build_filter(archive, options).await? else {
        return Ok(empty_page(Some(terms), page, number));
    };

    let total = archive.get_search_count(terms, &filter).await?;
    let records = archive.search_content(terms, &filter, page).await?;
    info!(terms = %terms, total, "Searched content");

    Ok(ContentPage {
        query: Some(terms.to_string()),
        total,
        page: number,
        per_page: page.limit.unwrap_or(0),
        items: records
            .into_iter()
            .map(|r| ContentSummary::from_record(r, config))
            .collect(),
    })
}

/// Load content as a metadata wrapper, with its zipball path when present
pub async fn open_meta(config: &Config, archive: &Archive, md5: &str) -> Result<Meta> {
    let record = archive
        .get_single(md5)
        .await?
        .ok_or_else(|| Error::ContentNotFound(md5.to_string()))?;
    let zip_path = get_zip_path(md5, &config.content_dir());
    Ok(Meta::new(record, config.covers_dir(), zip_path))
}

/// Show one piece of content, extracting its cover if needed
pub async fn cmd_show(config: &Config, archive: &Archive, md5: &str) -> Result<ContentDetails> {
    let mut meta = open_meta(config, archive, md5).await?;
    let cover = meta.image();

    Ok(ContentDetails {
        label: meta.label().to_string(),
        rtl: meta.rtl(),
        i18n_attrs: meta.i18n_attrs(),
        free_license: meta.free_license(),
        license_name: meta.license_name().map(str::to_string),
        cover,
        tags: meta.tags.clone(),
        has_zipball: meta.zip_path().is_some(),
        record: meta.into_record(),
    })
}

/// Record a view of the content; returns the updated details
pub async fn cmd_view(config: &Config, archive: &Archive, md5: &str) -> Result<ContentDetails> {
    archive.add_view(md5).await?;
    cmd_show(config, archive, md5).await
}

pub fn print_content_page(page: &ContentPage) {
    match &page.query {
        Some(query) => println!("\n🔍 Search: {}\n", query),
        None => println!("\n📚 Library\n"),
    }

    if page.items.is_empty() {
        println!("No content found.");
        return;
    }

    for (i, item) in page.items.iter().enumerate() {
        let position = (page.page.saturating_sub(1) * page.per_page) as usize + i + 1;
        println!("{}. {} [{}]", position, item.title, item.md5);
        println!("   {}", item.url);
        println!(
            "   {} · {} · {} · {} views · updated {}",
            item.label,
            if item.language.is_empty() { "-" } else { &item.language },
            hsize(item.size.max(0) as u64),
            item.views,
            item.updated
        );
        if !item.tags.is_empty() {
            println!("   Tags: {}", item.tags.join(", "));
        }
    }

    println!(
        "\nPage {} of {} ({} items)",
        page.page,
        page.page_count(),
        page.total
    );
}

pub fn print_content_details(details: &ContentDetails) {
    let record = &details.record;
    println!("\n{}\n", record.title);
    println!("  MD5:        {}", record.md5);
    println!("  URL:        {}", record.url);
    println!("  Label:      {}", details.label);
    println!(
        "  Language:   {}{}",
        if record.language.is_empty() { "-" } else { &record.language },
        if details.rtl { " (right-to-left)" } else { "" }
    );
    println!(
        "  License:    {}{}",
        details
            .license_name
            .as_deref()
            .or(record.license.as_deref())
            .unwrap_or("unknown"),
        if details.free_license { "" } else { " (non-free)" }
    );
    println!("  Publisher:  {}", record.publisher);
    println!("  Broadcast:  {}", record.broadcast.as_deref().unwrap_or("-"));
    println!("  Updated:    {}", record.updated);
    println!("  Views:      {}", record.views);
    println!("  Size:       {}", hsize(record.size.max(0) as u64));
    println!("  Entry:      {}", record.entry_point);
    if let Some(cover) = &details.cover {
        println!("  Cover:      {}", cover);
    }
    if !details.tags.is_empty() {
        let names: Vec<&str> = details.tags.keys().map(String::as_str).collect();
        println!("  Tags:       {}", names.join(", "));
    }
    if !details.has_zipball {
        println!("\n⚠ Zipball is missing from the content directory");
    }
}
