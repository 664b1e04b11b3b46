//! Client-side filtering for the filesystem and remote share backends.
//!
//! The object store filters on its own side; the other two backends load
//! metadata themselves and have to apply the query here:
//!
//! - Favorites (`keep == 1`)
//! - Free text: a quoted string is a case-sensitive literal, otherwise every
//!   word has to appear somewhere (case-insensitive, any order)
//! - Modification time range
//! - Mime types and activity
//!
//! Text is matched against the file path (when there is one) and the
//! `fulltext`, `title`, `description` and `tags` properties.

use crate::error::{JournalError, Result};
use crate::query::{Query, TimeRange};
use crate::types::Entry;
use regex::{Regex, RegexBuilder};

/// Properties searched by free text queries.
pub const TEXT_FIELDS: [&str; 4] = ["fulltext", "title", "description", "tags"];

/// Compiled free-text matcher.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    /// `"exact"`: case-sensitive substring
    Literal(String),

    /// Every word must match, in any order
    AllWords(Vec<Regex>),
}

impl TextMatcher {
    /// Compile a free-text query. Blank text yields `None`.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            let literal = &text[1..text.len() - 1];
            return Ok(Some(TextMatcher::Literal(literal.to_string())));
        }

        let words = text
            .split_whitespace()
            .map(|word| {
                RegexBuilder::new(&regex::escape(word))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| JournalError::InvalidQuery {
                        reason: format!("bad search word {:?}: {}", word, e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(TextMatcher::AllWords(words)))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            TextMatcher::Literal(literal) => text.contains(literal.as_str()),
            TextMatcher::AllWords(words) => words.iter().all(|w| w.is_match(text)),
        }
    }

    /// Check the path and every searchable property of the entry.
    pub fn matches_entry(&self, path: Option<&str>, entry: Option<&Entry>) -> bool {
        if path.map_or(false, |p| self.matches(p)) {
            return true;
        }

        let Some(entry) = entry else {
            return false;
        };

        TEXT_FIELDS
            .iter()
            .filter_map(|field| entry.get_str(field))
            .any(|value| self.matches(value))
    }
}

/// What a filter gets to look at for one candidate entry.
///
/// Filesystem candidates have a path, a stat mtime and a guessed mime type,
/// and only sometimes sidecar metadata. Remote candidates are all metadata.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub path: Option<&'a str>,
    pub entry: Option<&'a Entry>,
    pub mtime: i64,
    pub mime_type: Option<&'a str>,
}

impl<'a> Candidate<'a> {
    /// Candidate built only from metadata
    pub fn from_entry(entry: &'a Entry) -> Self {
        Candidate {
            path: None,
            entry: Some(entry),
            mtime: entry.timestamp().unwrap_or(0),
            mime_type: entry.mime_type(),
        }
    }
}

/// A single filter over candidates.
#[derive(Debug, Clone)]
pub enum EntryFilter {
    /// Only favorites
    Favorite,

    /// Mime type must be one of these
    MimeTypes(Vec<String>),

    /// Created by this activity
    Activity(String),

    /// Modified within the range
    Modified(TimeRange),

    /// Free text
    Text(TextMatcher),
}

impl EntryFilter {
    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        match self {
            EntryFilter::Favorite => candidate.entry.map_or(false, Entry::is_favorite),
            EntryFilter::MimeTypes(types) => candidate
                .mime_type
                .map_or(false, |m| types.iter().any(|t| t == m)),
            EntryFilter::Activity(activity) => candidate
                .entry
                .and_then(|e| e.get_str(crate::types::ACTIVITY))
                .map_or(false, |a| a == activity),
            EntryFilter::Modified(range) => range.contains(candidate.mtime),
            EntryFilter::Text(matcher) => matcher.matches_entry(candidate.path, candidate.entry),
        }
    }
}

/// All filters a query asks for, evaluated cheapest first.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<EntryFilter>,
}

impl FilterSet {
    /// Build the filters for a query.
    pub fn from_query(query: &Query) -> Result<Self> {
        let mut filters = Vec::new();

        if query.keep == Some(true) {
            filters.push(EntryFilter::Favorite);
        }
        if let Some(range) = query.timestamp {
            filters.push(EntryFilter::Modified(range));
        }
        if let Some(activity) = query.activity.as_ref().filter(|a| !a.is_empty()) {
            filters.push(EntryFilter::Activity(activity.clone()));
        }
        if !query.mime_types.is_empty() {
            filters.push(EntryFilter::MimeTypes(query.mime_types.clone()));
        }
        if let Some(text) = query.text.as_deref() {
            if let Some(matcher) = TextMatcher::parse(text)? {
                filters.push(EntryFilter::Text(matcher));
            }
        }

        Ok(FilterSet { filters })
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn matches(&self, candidate: &Candidate<'_>) -> bool {
        self.filters.iter().all(|f| f.matches(candidate))
    }

    /// Whether any filter looks at the mime type, so callers can skip
    /// guessing one.
    pub fn needs_mime_type(&self) -> bool {
        self.filters
            .iter()
            .any(|f| matches!(f, EntryFilter::MimeTypes(_)))
    }

    /// Whether any filter reads entry metadata, so scanning backends know
    /// to load sidecars before filtering.
    pub fn needs_metadata(&self) -> bool {
        self.filters.iter().any(|f| {
            matches!(
                f,
                EntryFilter::Favorite | EntryFilter::Activity(_) | EntryFilter::Text(_)
            )
        })
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
