//! Filters, pagination and ordering for archive queries

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::sync::OnceLock;

/// Default listing order: most recently updated first, then most viewed
pub const CONTENT_ORDER: &[&str] = &["-datetime(updated)", "-views"];

/// Optional filters shared by the count, list and search queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilter {
    pub tag: Option<i64>,
    pub lang: Option<String>,
    pub multipage: Option<bool>,
}

impl ContentFilter {
    pub fn with_tag(mut self, tag: i64) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_multipage(mut self, multipage: bool) -> Self {
        self.multipage = Some(multipage);
        self
    }

    /// `FROM` clause, joining taggings when filtering by tag
    pub(crate) fn push_from(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        if self.tag.is_some() {
            qb.push(" FROM zipballs NATURAL JOIN taggings");
        } else {
            qb.push(" FROM zipballs");
        }
    }

    /// Append the filter conditions, each prefixed with `AND`
    pub(crate) fn push_conditions<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>) {
        if let Some(tag) = self.tag {
            qb.push(" AND tag_id = ").push_bind(tag);
        }
        if let Some(lang) = self.lang.as_deref().filter(|l| !l.is_empty()) {
            qb.push(" AND language = ").push_bind(lang);
        }
        if let Some(multipage) = self.multipage {
            qb.push(" AND multipage = ").push_bind(multipage);
        }
    }
}

/// Offset/limit pagination; no limit returns everything after the offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: Option<u32>,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Page number `page` (1-based) of `per_page` records
    pub fn numbered(page: u32, per_page: u32) -> Self {
        Self::new(page.saturating_sub(1).saturating_mul(per_page), per_page)
    }

    pub(crate) fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self.limit {
            Some(limit) => {
                qb.push(" LIMIT ").push_bind(i64::from(limit));
            }
            None if self.offset > 0 => {
                qb.push(" LIMIT -1");
            }
            None => return,
        }
        if self.offset > 0 {
            qb.push(" OFFSET ").push_bind(i64::from(self.offset));
        }
    }
}

/// A bare column or a single-argument function over a column
fn is_order_expression(expr: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z_]+(?:\([a-z_]+\))?$").expect("static regex is valid"))
        .is_match(expr)
}

/// Render an order list (`-views`, `title`, ...) as an `ORDER BY` clause
pub fn order_clause<S: AsRef<str>>(order: &[S]) -> Result<String> {
    let mut terms = Vec::with_capacity(order.len());
    for term in order {
        let term = term.as_ref();
        let (expr, direction) = match term.strip_prefix('-') {
            Some(expr) => (expr, "DESC"),
            None => (term, "ASC"),
        };
        if !is_order_expression(expr) {
            return Err(Error::Config(format!("Invalid order term: '{}'", term)));
        }
        terms.push(format!("{} {}", expr, direction));
    }

    if terms.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!(" ORDER BY {}", terms.join(", ")))
    }
}

/// Lower-cased `LIKE` pattern matching `terms` anywhere
pub fn like_pattern(terms: &str) -> String {
    format!("%{}%", terms.to_lowercase())
}
