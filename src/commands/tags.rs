//! Tag commands

use super::browse::open_meta;
use crate::archive::{parse_tag_list, Archive};
use crate::config::Config;
use crate::error::Result;
use crate::metadata::TagCount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Tags carried by a piece of content after a change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTags {
    pub md5: String,
    pub title: String,
    pub tags: BTreeMap<String, i64>,
}

pub async fn cmd_tag_cloud(archive: &Archive) -> Result<Vec<TagCount>> {
    archive.get_tag_cloud().await
}

/// Tag content with a comma-separated list of names
pub async fn cmd_tag_add(config: &Config, archive: &Archive, md5: &str, names: &str) -> Result<ContentTags> {
    let mut meta = open_meta(config, archive, md5).await?;
    let names = parse_tag_list(names);
    let added = archive.add_tags(&mut meta, &names).await?;
    info!(md5 = %md5, added = added.len(), "Tagged content");

    Ok(ContentTags {
        md5: meta.md5().to_string(),
        title: meta.title().to_string(),
        tags: meta.tags,
    })
}

/// Remove a comma-separated list of tags from content
pub async fn cmd_tag_remove(config: &Config, archive: &Archive, md5: &str, names: &str) -> Result<ContentTags> {
    let mut meta = open_meta(config, archive, md5).await?;
    archive.remove_tags(&mut meta, &parse_tag_list(names)).await?;
    info!(md5 = %md5, "Removed tags from content");

    Ok(ContentTags {
        md5: meta.md5().to_string(),
        title: meta.title().to_string(),
        tags: meta.tags,
    })
}

pub fn print_tag_cloud(cloud: &[TagCount]) {
    if cloud.is_empty() {
        println!("No tags in use.");
        return;
    }

    println!("\n🏷  Tags\n");
    let width = cloud.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tag in cloud {
        println!("  {:<width$}  {}", tag.name, tag.count, width = width);
    }
}

pub fn print_content_tags(tags: &ContentTags) {
    println!("{} [{}]", tags.title, tags.md5);
    if tags.tags.is_empty() {
        println!("  (no tags)");
    } else {
        let names: Vec<&str> = tags.tags.keys().map(String::as_str).collect();
        println!("  Tags: {}", names.join(", "));
    }
}
