//! Filter codec: list page state <-> canonical query string.
//!
//! The query string is the navigable form of a list view's state. Filter
//! parameters come first in insertion order, followed by exactly one
//! `page=<n>`. A parameter value may hold several comma-separated tokens,
//! which the API combines with OR; distinct keys combine with AND.
//!
//! The codec treats every value, including the literal `null`, as an opaque
//! string. Sentinel handling lives in [`crate::filter::FilterValue`].
//!
//! Keys are written verbatim. Values are percent-encoded, so a multi-value
//! `new,open` goes on the wire as `new%2Copen` and decodes back unchanged.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Query parameter carrying the page number.
pub const PAGE_KEY: &str = "page";

/// Separator between OR-combined values of one key.
pub const VALUE_SEPARATOR: char = ',';

/// One `(key, value)` filter criterion as it appears in the query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub value: String,
}

impl Filter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The comma-separated tokens of the value, trimmed, empties dropped.
    pub fn tokens(&self) -> Vec<&str> {
        split_tokens(&self.value)
    }
}

fn split_tokens(value: &str) -> Vec<&str> {
    value
        .split(VALUE_SEPARATOR)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn encode_component(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// Parsed list page state.
///
/// `params` holds every non-page parameter in query order; the page is kept
/// aside so it can always be rendered last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    params: Vec<(String, String)>,
    page: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            page: 1,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build state from filters and a page. Keys are not deduplicated.
    pub fn from_filters(filters: &[Filter], page: u32) -> Self {
        Self {
            params: filters
                .iter()
                .map(|f| (f.key.clone(), f.value.clone()))
                .collect(),
            page: page.max(1),
        }
    }

    /// Parse a query string. A leading `?` is ignored, `+` reads as a space,
    /// and a missing or malformed page reads as page 1.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = Vec::new();
        let mut page = None;

        for segment in query.split('&').filter(|s| !s.is_empty()) {
            let (raw_key, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
            let key = decode_component(raw_key);
            let value = decode_component(raw_value);
            if key == PAGE_KEY {
                if page.is_none() {
                    page = Some(value.trim().parse::<u32>().ok().filter(|p| *p > 0).unwrap_or(1));
                }
                continue;
            }
            params.push((key, value));
        }

        Self {
            params,
            page: page.unwrap_or(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn set_page(&mut self, page: u32) -> &mut Self {
        self.page = page.max(1);
        self
    }

    /// First value recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first occurrence of `key` in place, dropping any later
    /// duplicates, or append the key when it is new.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.params.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.params[index].1 = value;
                let mut seen = 0usize;
                self.params.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.params.push((key.to_string(), value)),
        }
        self
    }

    /// Remove every occurrence of `key`.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.params.retain(|(k, _)| k != key);
        self
    }

    /// Every non-page parameter as a filter, in query order.
    pub fn filters(&self) -> Vec<Filter> {
        self.params
            .iter()
            .map(|(k, v)| Filter::new(k.clone(), v.clone()))
            .collect()
    }

    /// Add `new_value` to the OR-list of `key`.
    ///
    /// A blank value leaves the state untouched. Otherwise the page resets
    /// to 1, even when the token was already present.
    pub fn add_value(&mut self, key: &str, new_value: &str) -> &mut Self {
        let token = new_value.trim();
        if token.is_empty() {
            return self;
        }

        match self.get(key).filter(|existing| !existing.trim().is_empty()) {
            Some(existing) => {
                let mut tokens: Vec<String> =
                    split_tokens(existing).into_iter().map(str::to_string).collect();
                if !tokens.iter().any(|t| t == token) {
                    tokens.push(token.to_string());
                    let joined = tokens.join(",");
                    self.set(key, joined);
                }
            }
            None => {
                self.set(key, token);
            }
        }

        self.page = 1;
        self
    }

    /// Remove one token from `key`'s OR-list, dropping the key once it is
    /// empty. Always resets the page to 1.
    pub fn remove_value(&mut self, key: &str, value: &str) -> &mut Self {
        let target = value.trim();
        if let Some(existing) = self.get(key) {
            let remaining: Vec<String> = split_tokens(existing)
                .into_iter()
                .filter(|token| *token != target)
                .map(str::to_string)
                .collect();
            if remaining.is_empty() {
                self.remove(key);
            } else {
                let joined = remaining.join(",");
                self.set(key, joined);
            }
        }
        self.page = 1;
        self
    }

    /// Drop all listed keys and reset the page. Idempotent.
    pub fn clear<S: AsRef<str>>(&mut self, keys: &[S]) -> &mut Self {
        for key in keys {
            self.remove(key.as_ref());
        }
        self.page = 1;
        self
    }

    /// True iff any of `keys` carries a non-empty value.
    pub fn has_any_active<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        self.params.iter().any(|(k, v)| {
            !v.is_empty() && keys.iter().any(|key| key.as_ref() == k.as_str())
        })
    }

    /// Non-empty parameters split into their OR tokens, for rendering
    /// removable filter badges.
    pub fn active_filters(&self) -> Vec<(String, Vec<String>)> {
        self.params
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| {
                (
                    k.clone(),
                    split_tokens(v).into_iter().map(str::to_string).collect(),
                )
            })
            .collect()
    }

    /// Render the canonical query string (no leading `?`).
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, encode_component(v)))
            .collect();
        parts.push(format!("{}={}", PAGE_KEY, self.page));
        parts.join("&")
    }
}

impl fmt::Display for ListQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

// ============================================================================
// STRING-LEVEL OPERATIONS
// ============================================================================

/// Encode filters then `page=<page>`. Keys are not deduplicated.
pub fn encode(filters: &[Filter], page: u32) -> String {
    ListQuery::from_filters(filters, page).to_query_string()
}

pub fn decode(query: &str) -> ListQuery {
    ListQuery::parse(query)
}

pub fn add_value(query: &str, key: &str, new_value: &str) -> String {
    if new_value.trim().is_empty() {
        return query.to_string();
    }
    ListQuery::parse(query)
        .add_value(key, new_value)
        .to_query_string()
}

pub fn clear<S: AsRef<str>>(query: &str, keys: &[S]) -> String {
    ListQuery::parse(query).clear(keys).to_query_string()
}

pub fn remove_value(query: &str, key: &str, value: &str) -> String {
    ListQuery::parse(query)
        .remove_value(key, value)
        .to_query_string()
}

pub fn has_any_active<S: AsRef<str>>(query: &str, keys: &[S]) -> bool {
    ListQuery::parse(query).has_any_active(keys)
}

pub fn set_page(query: &str, page: u32) -> String {
    ListQuery::parse(query).set_page(page).to_query_string()
}

pub fn active_filters(query: &str) -> Vec<(String, Vec<String>)> {
    ListQuery::parse(query).active_filters()
}
