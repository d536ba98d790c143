//! Boundary types shared by the loader and the list-endpoint integration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Normalized (trimmed) search intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SearchTerm(String);

impl SearchTerm {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SearchTerm {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One page fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: usize,
    page_size: usize,
    term: SearchTerm,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize, term: SearchTerm) -> Result<Self, LookupError> {
        if page == 0 {
            return Err(LookupError::InvalidArgument(
                "page numbers start at 1".into(),
            ));
        }
        if page_size == 0 {
            return Err(LookupError::InvalidArgument(
                "--page-size must be at least 1".into(),
            ));
        }
        Ok(Self {
            page,
            page_size,
            term,
        })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn term(&self) -> &SearchTerm {
        &self.term
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOption {
    pub key: String,
    pub label: String,
}

impl LookupOption {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// Canonical page shape consumed by the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub items: Vec<LookupOption>,
    pub total: Option<usize>,
    pub requested_page: usize,
    pub has_more: bool,
}

/// Wire shape of a list endpoint response. Every field is optional; some
/// endpoints report `count` instead of `total`, and `next` is a URL, `null`,
/// or missing.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPage<T> {
    #[serde(default)]
    pub results: Option<Vec<T>>,
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub page: Option<usize>,
    /// `None` when the key is absent, `Some(Value::Null)` when explicitly null.
    #[serde(default, deserialize_with = "present")]
    pub next: Option<serde_json::Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl<T> Default for RawPage<T> {
    fn default() -> Self {
        Self {
            results: None,
            total: None,
            count: None,
            page: None,
            next: None,
        }
    }
}

fn next_signal(next: &serde_json::Value) -> bool {
    match next {
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_u64().is_some_and(|n| n > 0),
        _ => false,
    }
}

/// Converts a raw response into a [`PageResult`], mapping each business item
/// through `map`. Items `map` rejects are dropped.
pub fn normalize<T, F>(raw: RawPage<T>, request: &PageRequest, map: F) -> PageResult
where
    F: FnMut(T) -> Option<LookupOption>,
{
    let total = raw.total.or(raw.count);
    let Some(results) = raw.results else {
        return PageResult {
            items: Vec::new(),
            total,
            requested_page: request.page(),
            has_more: false,
        };
    };

    let fetched = results.len();
    let remaining = total.map(|total| request.page().saturating_mul(request.page_size()) < total);
    let has_more = match (&raw.next, remaining) {
        (Some(next), remaining) => next_signal(next) || remaining.unwrap_or(false),
        (None, Some(remaining)) => remaining,
        // No signal at all: a full page is taken to mean there may be more.
        (None, None) => fetched > 0 && fetched >= request.page_size(),
    };

    PageResult {
        items: results.into_iter().filter_map(map).collect(),
        total,
        requested_page: request.page(),
        has_more,
    }
}
