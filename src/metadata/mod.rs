//! Content metadata handling
//!
//! Every zipball ships a JSON metadata file. Before it is indexed the raw
//! document is normalized against [`META_SPECIFICATION`]:
//! - deprecated aliases are renamed to their canonical keys
//! - required keys are checked
//! - missing optional keys receive their static or computed default
//! - keys outside the specification are dropped

mod record;
pub mod wrapper;

pub use record::*;
pub use wrapper::{ContentLabel, Meta, LICENSES, RTL_LANGS};

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// A raw or normalized metadata document
pub type MetaMap = Map<String, Value>;

/// Function computing a default from the rest of the document
pub type ComputedDefault = fn(&str, &MetaMap) -> Result<Value>;

/// Default value of a metadata field
#[derive(Clone, Copy)]
pub enum FieldDefault {
    Null,
    Bool(bool),
    Int(i64),
    Str(&'static str),
    Computed(ComputedDefault),
}

impl std::fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldDefault::Null => write!(f, "Null"),
            FieldDefault::Bool(b) => write!(f, "Bool({})", b),
            FieldDefault::Int(i) => write!(f, "Int({})", i),
            FieldDefault::Str(s) => write!(f, "Str({:?})", s),
            FieldDefault::Computed(_) => write!(f, "Computed"),
        }
    }
}

/// Specification of a single metadata field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub required: bool,
    pub default: FieldDefault,
    /// Deprecated names still accepted in incoming metadata
    pub aliases: &'static [&'static str],
    /// Filled in by the librarian itself, never read from the bundle
    pub auto: bool,
}

impl FieldSpec {
    const fn optional(key: &'static str, default: FieldDefault) -> Self {
        Self {
            key,
            required: false,
            default,
            aliases: &[],
            auto: false,
        }
    }

    const fn required(key: &'static str) -> Self {
        Self {
            key,
            required: true,
            default: FieldDefault::Null,
            aliases: &[],
            auto: false,
        }
    }

    const fn auto(key: &'static str) -> Self {
        Self {
            key,
            required: false,
            default: FieldDefault::Null,
            aliases: &[],
            auto: true,
        }
    }

    const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }
}

/// The fixed metadata field specification, in canonical order
pub const META_SPECIFICATION: &[FieldSpec] = &[
    FieldSpec::required("url"),
    FieldSpec::required("title"),
    FieldSpec::optional("images", FieldDefault::Int(0)),
    FieldSpec::required("timestamp"),
    FieldSpec::optional("keep_formatting", FieldDefault::Bool(false)),
    FieldSpec::optional("is_partner", FieldDefault::Bool(false)),
    FieldSpec::optional("is_sponsored", FieldDefault::Bool(false)),
    FieldSpec::optional("archive", FieldDefault::Str("core")),
    FieldSpec::optional("publisher", FieldDefault::Str("")).with_aliases(&["partner"]),
    FieldSpec::required("license"),
    FieldSpec::optional("language", FieldDefault::Str("")),
    FieldSpec::optional("multipage", FieldDefault::Bool(false)),
    FieldSpec::optional("entry_point", FieldDefault::Str("index.html")).with_aliases(&["index"]),
    // Required by the bundle format, but legacy content without it is still
    // accepted and gets a date derived from the timestamp.
    FieldSpec::optional("broadcast", FieldDefault::Computed(default_broadcast)),
    FieldSpec::optional("keywords", FieldDefault::Str("")),
    FieldSpec::auto("md5"),
    FieldSpec::auto("size"),
    FieldSpec::auto("updated"),
];

/// Fields read from bundle metadata (everything that is not auto-filled)
pub fn standard_fields() -> impl Iterator<Item = &'static FieldSpec> {
    META_SPECIFICATION.iter().filter(|f| !f.auto)
}

/// Keys that must be present in bundle metadata
pub fn required_keys() -> impl Iterator<Item = &'static str> {
    standard_fields().filter(|f| f.required).map(|f| f.key)
}

fn standard_field(key: &str) -> Result<&'static FieldSpec> {
    standard_fields()
        .find(|f| f.key == key)
        .ok_or_else(|| Error::UnknownField(key.to_string()))
}

/// Parse a bundle timestamp in any of the formats seen in the wild
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S UTC", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Broadcast date defaults to the date part of the timestamp
pub fn default_broadcast(_key: &str, meta: &MetaMap) -> Result<Value> {
    let timestamp = meta
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode("timestamp is missing or not a string".to_string()))?;
    let parsed = parse_timestamp(timestamp)
        .ok_or_else(|| Error::Decode(format!("unparsable timestamp '{}'", timestamp)))?;
    Ok(Value::String(parsed.date().format("%Y-%m-%d").to_string()))
}

/// Default value for a standard key, computing it from `meta` if needed
pub fn get_default_value(key: &str, meta: &MetaMap) -> Result<Value> {
    let value = match standard_field(key)?.default {
        FieldDefault::Null => Value::Null,
        FieldDefault::Bool(b) => Value::Bool(b),
        FieldDefault::Int(i) => Value::from(i),
        FieldDefault::Str(s) => Value::String(s.to_string()),
        FieldDefault::Computed(compute) => compute(key, meta)?,
    };
    Ok(value)
}

/// Deprecated names of a standard key
pub fn aliases_for(key: &str) -> Result<&'static [&'static str]> {
    Ok(standard_field(key)?.aliases)
}

pub fn is_required(key: &str) -> Result<bool> {
    Ok(standard_field(key)?.required)
}

/// Rename deprecated aliases to their canonical key, unless the canonical key is already set
pub fn replace_aliases(meta: &mut MetaMap) {
    for field in standard_fields() {
        if meta.contains_key(field.key) {
            continue;
        }
        for alias in field.aliases {
            if let Some(value) = meta.remove(*alias) {
                meta.insert(field.key.to_string(), value);
                break;
            }
        }
    }
}

/// Fill every absent standard key with its default. Other keys are left alone.
pub fn add_missing_keys(meta: &mut MetaMap) -> Result<()> {
    for field in standard_fields() {
        if !meta.contains_key(field.key) {
            let value = get_default_value(field.key, meta)?;
            meta.insert(field.key.to_string(), value);
        }
    }
    Ok(())
}

/// Drop every key that is not a standard field
pub fn clean_keys(meta: &mut MetaMap) {
    meta.retain(|key, _| standard_fields().any(|f| f.key == key));
}

/// Decode raw metadata bytes into a normalized document
pub fn convert_json(raw: &[u8]) -> Result<MetaMap> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::Decode(format!("Failed to decode metadata: '{}'", e)))?;
    let value: Value =
        serde_json::from_str(text).map_err(|_| Error::Decode("Invalid JSON".to_string()))?;
    let Value::Object(mut meta) = value else {
        return Err(Error::Decode("Invalid JSON: expected an object".to_string()));
    };

    replace_aliases(&mut meta);

    if let Some(missing) = required_keys().find(|key| !meta.contains_key(*key)) {
        return Err(Error::Format(format!("Mandatory key '{}' missing", missing)));
    }

    add_missing_keys(&mut meta)
        .map_err(|e| Error::Decode(format!("Failed to add default values: '{}'", e)))?;
    clean_keys(&mut meta);

    Ok(meta)
}
