//! Presentation wrapper around a content record
//!
//! [`Meta`] adds the attributes views need on top of a raw [`ContentRecord`]:
//! text direction, locale attributes, label, license class and the cover
//! image, which is looked up in the covers directory or extracted from the
//! zipball on first use.

use super::ContentRecord;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Languages written right to left
pub const RTL_LANGS: &[&str] = &["ar", "he", "ur", "yi", "ji", "iw", "fa"];

/// Known license codes and their display names
pub const LICENSES: &[(Option<&str>, &str)] = &[
    (None, "Unknown license"),
    (Some("CC-BY"), "Creative Commons Attribution"),
    (Some("CC-BY-ND"), "Creative Commons Attribution-NoDerivs"),
    (Some("CC-BY-NC"), "Creative Commons Attribution-NonCommercial"),
    (Some("CC-BY-ND-NC"), "Creative Commons Attribution-NonCommercial-NoDerivs"),
    (Some("CC-BY-SA"), "Creative Commons Attribution-ShareAlike"),
    (Some("CC-BY-NC-SA"), "Creative Commons Attribution-NonCommercial-ShareAlike"),
    (Some("GFDL"), "GNU Free Documentation License"),
    (Some("OPL"), "Open Publication License"),
    (Some("OCL"), "Open Content License"),
    (Some("ADL"), "Against DRM License"),
    (Some("FAL"), "Free Art License"),
    (Some("PD"), "Public Domain"),
    (Some("OF"), "Other free license"),
    (Some("ARL"), "All rights reserved"),
    (Some("ON"), "Other non-free license"),
];

/// License codes that restrict redistribution
const NON_FREE_LICENSES: &[&str] = &["ARL", "ON"];

/// Extensions recognized as cover images inside a zipball
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".gif", ".jpg", ".jpeg"];

/// Largest image member read out of a zipball (zip-bomb protection)
const MAX_COVER_BYTES: u64 = 16 * 1024 * 1024;

/// Classification label shown next to content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentLabel {
    Core,
    Sponsored,
    Partner,
}

impl std::fmt::Display for ContentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentLabel::Core => write!(f, "core"),
            ContentLabel::Sponsored => write!(f, "sponsored"),
            ContentLabel::Partner => write!(f, "partner"),
        }
    }
}

/// Metadata wrapper with derived attributes for easier consumption
#[derive(Debug, Clone)]
pub struct Meta {
    record: ContentRecord,
    /// Tag name to tag id, decoded from the record's JSON column
    pub tags: BTreeMap<String, i64>,
    cover_dir: PathBuf,
    zip_path: Option<PathBuf>,
    image: Option<String>,
}

fn decode_tags(raw: Option<&str>) -> BTreeMap<String, i64> {
    match raw {
        None | Some("") => BTreeMap::new(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            warn!("Ignoring malformed tags column: {}", e);
            BTreeMap::new()
        }),
    }
}

impl Meta {
    pub fn new(record: ContentRecord, cover_dir: impl Into<PathBuf>, zip_path: Option<PathBuf>) -> Self {
        let tags = decode_tags(record.tags.as_deref());
        Self {
            record,
            tags,
            cover_dir: cover_dir.into(),
            zip_path,
            image: None,
        }
    }

    pub fn record(&self) -> &ContentRecord {
        &self.record
    }

    pub fn into_record(self) -> ContentRecord {
        self.record
    }

    pub fn cover_dir(&self) -> &Path {
        &self.cover_dir
    }

    pub fn zip_path(&self) -> Option<&Path> {
        self.zip_path.as_deref()
    }

    pub fn md5(&self) -> &str {
        &self.record.md5
    }

    pub fn title(&self) -> &str {
        &self.record.title
    }

    pub fn url(&self) -> &str {
        &self.record.url
    }

    pub fn license(&self) -> Option<&str> {
        self.record.license.as_deref()
    }

    /// Serialized tag map, as stored on the record
    pub fn tags_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.tags)?)
    }

    /// Replace the tag map and keep the record's JSON column in step
    pub fn set_tags(&mut self, tags: BTreeMap<String, i64>) -> Result<()> {
        self.tags = tags;
        self.record.tags = Some(self.tags_json()?);
        Ok(())
    }

    fn as_object(&self) -> Result<serde_json::Map<String, Value>> {
        match serde_json::to_value(&self.record)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::Other("content record is not an object".to_string())),
        }
    }

    /// Value of a record field by name
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().ok()?.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a record field by name. The value must match the field's type.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut map = self.as_object()?;
        if !map.contains_key(key) {
            return Err(Error::UnknownField(key.to_string()));
        }
        map.insert(key.to_string(), value);
        self.record = serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::Format(format!("Invalid value for '{}': {}", key, e)))?;
        if key == "tags" {
            self.tags = decode_tags(self.record.tags.as_deref());
        }
        Ok(())
    }

    /// Content language, `None` when unspecified
    pub fn lang(&self) -> Option<&str> {
        Some(self.record.language.as_str()).filter(|l| !l.is_empty())
    }

    pub fn rtl(&self) -> bool {
        self.lang().is_some_and(|l| RTL_LANGS.contains(&l))
    }

    /// HTML attributes describing language and direction, each with a leading space
    pub fn i18n_attrs(&self) -> String {
        let mut attrs = String::new();
        if let Some(lang) = self.lang() {
            attrs.push_str(&format!(" lang=\"{}\"", lang));
        }
        if self.rtl() {
            attrs.push_str(" dir=\"rtl\"");
        }
        attrs
    }

    /// Core content wins over sponsorship, sponsorship over partnership
    pub fn label(&self) -> ContentLabel {
        if self.record.archive == "core" {
            ContentLabel::Core
        } else if self.record.is_sponsored {
            ContentLabel::Sponsored
        } else if self.record.is_partner {
            ContentLabel::Partner
        } else {
            ContentLabel::Core
        }
    }

    pub fn free_license(&self) -> bool {
        !self
            .license()
            .is_some_and(|l| NON_FREE_LICENSES.contains(&l))
    }

    /// Display name of the license, `None` for codes outside the table
    pub fn license_name(&self) -> Option<&'static str> {
        let code = self.license();
        LICENSES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
    }

    /// File name of an already cached cover, if any
    pub fn get_cover_path(&self) -> Option<String> {
        let prefix = format!("{}.", self.record.md5);
        let entries = std::fs::read_dir(&self.cover_dir).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with(&prefix))
            .collect();
        names.sort();
        names.into_iter().next()
    }

    /// Store cover image bytes as `<md5><ext>` and return the file name
    ///
    /// The bytes are written as given; callers check that they are an image.
    pub fn cache_cover(&self, ext: &str, content: &[u8]) -> Result<String> {
        std::fs::create_dir_all(&self.cover_dir)?;
        let name = format!("{}{}", self.record.md5, ext);
        std::fs::write(self.cover_dir.join(&name), content)?;
        Ok(name)
    }

    /// First image member of the zipball as (extension, bytes)
    pub fn extract_image(&self) -> Result<Option<(String, Vec<u8>)>> {
        let zip_path = self
            .zip_path
            .as_deref()
            .ok_or_else(|| Error::Other("no zipball path".to_string()))?;
        first_image(zip_path, MAX_COVER_BYTES)
    }

    /// Cover image file name, extracting and caching it on first use
    pub fn image(&mut self) -> Option<String> {
        if self.image.is_some() {
            return self.image.clone();
        }

        if let Some(cover) = self.get_cover_path() {
            self.image = Some(cover);
            return self.image.clone();
        }

        self.zip_path.as_ref()?;

        let (ext, content) = match self.extract_image() {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!(md5 = %self.record.md5, "No image found in zipball");
                return None;
            }
            Err(e) => {
                error!(md5 = %self.record.md5, "Could not find or read zipball: {}", e);
                return None;
            }
        };

        if image::guess_format(&content).is_err() {
            warn!(md5 = %self.record.md5, ext = %ext, "Zipball image is not a recognizable image");
            return None;
        }

        match self.cache_cover(&ext, &content) {
            Ok(name) => {
                self.image = Some(name);
                self.image.clone()
            }
            Err(e) => {
                error!(md5 = %self.record.md5, "Could not write the cover image: {}", e);
                None
            }
        }
    }
}

/// First image member of a zipball no larger than `max_bytes`
fn first_image(zip_path: &Path, max_bytes: u64) -> Result<Option<(String, Vec<u8>)>> {
    let mut archive = zip::ZipArchive::new(File::open(zip_path)?)?;

    for i in 0..archive.len() {
        let member = archive.by_index(i)?;
        let Some(ext) = Path::new(member.name())
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
        else {
            continue;
        };
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if member.size() > max_bytes {
            debug!(member = %member.name(), size = member.size(), "Skipping oversized image");
            continue;
        }

        let mut content = Vec::new();
        member.take(max_bytes).read_to_end(&mut content)?;
        return Ok(Some((ext, content)));
    }

    Ok(None)
}
