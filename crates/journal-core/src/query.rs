//! Query parameters and mount-point routing.
//!
//! A [`Query`] carries the filter, sort and paging parameters a view asks
//! for. Which backend answers it is decided by its single mount point, see
//! [`MountPoint::classify`].

use crate::error::{JournalError, Result};
use crate::types::{FILESIZE, OBJECT_STORE_MOUNT_POINT, TIMESTAMP};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Sort direction of a [`SortKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A signed property name such as `-timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub property: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn ascending(property: impl Into<String>) -> Self {
        SortKey {
            property: property.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        SortKey {
            property: property.into(),
            direction: Direction::Descending,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.direction == Direction::Descending
    }
}

impl Default for SortKey {
    /// Newest first.
    fn default() -> Self {
        SortKey::descending(TIMESTAMP)
    }
}

impl FromStr for SortKey {
    type Err = JournalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (direction, property) = if let Some(p) = s.strip_prefix('-') {
            (Direction::Descending, p)
        } else if let Some(p) = s.strip_prefix('+') {
            (Direction::Ascending, p)
        } else {
            (Direction::Ascending, s)
        };

        if property.is_empty() {
            return Err(JournalError::invalid_query(format!(
                "empty sort property in {:?}",
                s
            )));
        }

        Ok(SortKey {
            property: property.to_string(),
            direction,
        })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.direction {
            Direction::Ascending => '+',
            Direction::Descending => '-',
        };
        write!(f, "{}{}", sign, self.property)
    }
}

/// Inclusive modification-time range in epoch seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        TimeRange { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

/// Filter, sort and paging parameters for one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Exactly one mount point; `None` means the object store
    pub mountpoints: Option<Vec<String>>,

    /// Only favorites when `Some(true)`
    pub keep: Option<bool>,

    /// Accepted mime types (empty = any)
    pub mime_types: Vec<String>,

    /// Only entries created by this activity
    pub activity: Option<String>,

    /// Free text; space separated words are ANDed, a quoted string is literal
    pub text: Option<String>,

    /// Modification time range
    pub timestamp: Option<TimeRange>,

    /// Signed property names, most significant first
    pub order_by: Vec<SortKey>,

    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    /// Create an empty query (object store, no filters)
    pub fn new() -> Self {
        Query::default()
    }

    /// Route the query to a single mount point
    pub fn mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mountpoints = Some(vec![mount_point.into()]);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn favorites(mut self) -> Self {
        self.keep = Some(true);
        self
    }

    pub fn mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mime_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    pub fn between(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.timestamp = Some(TimeRange::new(start, end));
        self
    }

    pub fn order_by(mut self, key: SortKey) -> Self {
        self.order_by.push(key);
        self
    }

    /// The sort key used by the scanning backends, which sort on one
    /// property only.
    ///
    /// Only `filesize` and `creation_time` are honoured besides the default
    /// `timestamp`.
    pub fn primary_sort(&self) -> SortKey {
        match self.order_by.first() {
            Some(key) if key.property == FILESIZE || key.property == "creation_time" => key.clone(),
            Some(key) => SortKey {
                property: TIMESTAMP.to_string(),
                direction: key.direction,
            },
            None => SortKey::default(),
        }
    }

    /// Free text rewritten for the object store's native search.
    ///
    /// Every unquoted word gets a trailing `*` so the store matches prefixes;
    /// quoted phrases pass through untouched.
    pub fn store_text(&self) -> Option<String> {
        let text = self.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }

        let mut terms = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            if let Some(quoted) = rest.strip_prefix('"') {
                let end = quoted.find('"').map_or(quoted.len(), |i| i + 1);
                let (phrase, tail) = rest.split_at((end + 1).min(rest.len()));
                terms.push(phrase.to_string());
                rest = tail;
            } else {
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                let (word, tail) = rest.split_at(end);
                terms.push(format!("{}*", word));
                rest = tail;
            }
        }

        Some(terms.join(" "))
    }

    /// Split the mount point off the query.
    ///
    /// Fails unless exactly one mount point is named; a query without the
    /// field at all goes to the object store.
    pub fn take_mount_point(&mut self) -> Result<String> {
        match self.mountpoints.take() {
            None => Ok(OBJECT_STORE_MOUNT_POINT.to_string()),
            Some(mut points) if points.len() == 1 => Ok(points.remove(0)),
            Some(points) => Err(JournalError::invalid_query(format!(
                "exactly one mount point must be specified, got {}",
                points.len()
            ))),
        }
    }
}

/// The three kinds of backing store a mount point can name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountPoint {
    /// The local object store, named `/`
    ObjectStore,

    /// A remote share mirrored below the remote mount root
    RemoteShare { host: String, path: String },

    /// A local filesystem subtree, e.g. a USB stick
    Filesystem(PathBuf),
}

impl MountPoint {
    /// Classify a mount point string.
    ///
    /// `remote_root` is the directory remote shares are mounted under (for
    /// example `/tmp/`); the first path component below it names the host.
    pub fn classify(mount_point: &str, remote_root: &str) -> Self {
        if mount_point == OBJECT_STORE_MOUNT_POINT {
            return MountPoint::ObjectStore;
        }

        if !remote_root.is_empty() {
            if let Some(rest) = mount_point.strip_prefix(remote_root) {
                let host = rest.trim_start_matches('/').split('/').next().unwrap_or("");
                if !host.is_empty() {
                    return MountPoint::RemoteShare {
                        host: host.to_string(),
                        path: mount_point.to_string(),
                    };
                }
            }
        }

        MountPoint::Filesystem(PathBuf::from(mount_point))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, MountPoint::RemoteShare { .. })
    }
}
