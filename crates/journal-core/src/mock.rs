//! In-memory collaborators for tests and embedders.
//!
//! [`MemoryObjectStore`] behaves like the object store daemon closely enough
//! to drive result sets: it filters, sorts on the full `order_by` sequence,
//! pages, and broadcasts changes. [`StaticShare`] stands in for a remote
//! share client that either returns a fixed snapshot or fails.

use crate::backend::ChangeNotifier;
use crate::query::{Direction, Query};
use crate::remote::RemoteShare;
use crate::types::{Entry, Value, ACTIVITY, TITLE, UID};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

/// Object store kept entirely in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    entries: Mutex<Vec<Entry>>,
    files: Mutex<HashMap<String, PathBuf>>,
    failure: Mutex<Option<String>>,
    notifier: Option<ChangeNotifier>,
    next_id: AtomicU64,
    find_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcast created/updated/deleted through `notifier`
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Add an entry directly, assigning a uid when it has none
    pub fn insert(&self, mut entry: Entry) -> String {
        let uid = match entry.uid() {
            Some(uid) => uid.to_string(),
            None => {
                let uid = format!(
                    "obj-{:04}",
                    self.next_id.fetch_add(1, AtomicOrdering::Relaxed)
                );
                entry.set(UID, uid.clone());
                uid
            }
        };
        self.entries.lock().push(entry);
        uid
    }

    /// Make every subsequent call fail with `reason`
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    /// Number of `find` calls served so far
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(AtomicOrdering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check_failure(&self) -> anyhow::Result<()> {
        match self.failure.lock().as_ref() {
            Some(reason) => anyhow::bail!("{}", reason),
            None => Ok(()),
        }
    }

    fn matches(query: &Query, entry: &Entry) -> bool {
        if query.keep == Some(true) && !entry.is_favorite() {
            return false;
        }
        if !query.mime_types.is_empty()
            && !entry
                .mime_type()
                .map_or(false, |m| query.mime_types.iter().any(|t| t == m))
        {
            return false;
        }
        if let Some(activity) = &query.activity {
            if entry.get_str(ACTIVITY) != Some(activity.as_str()) {
                return false;
            }
        }
        if let Some(range) = query.timestamp {
            if !range.contains(entry.timestamp().unwrap_or(0)) {
                return false;
            }
        }
        if let Some(text) = &query.text {
            let title = entry.title().unwrap_or("").to_lowercase();
            let all_terms = text
                .split_whitespace()
                .map(|t| t.trim_matches(|c| c == '*' || c == '"').to_lowercase())
                .all(|t| title.contains(&t));
            if !all_terms {
                return false;
            }
        }
        true
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.and_then(Value::as_i64), b.and_then(Value::as_i64)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.map(Value::to_string).cmp(&b.map(Value::to_string)),
    }
}

impl crate::store::ObjectStore for MemoryObjectStore {
    fn find(&self, query: &Query, _properties: &[&str]) -> anyhow::Result<(Vec<Entry>, usize)> {
        self.check_failure()?;
        self.find_calls.fetch_add(1, AtomicOrdering::Relaxed);

        let mut matched: Vec<Entry> = self
            .entries
            .lock()
            .iter()
            .filter(|e| Self::matches(query, e))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|key| {
                    let ord = compare_values(a.get(&key.property), b.get(&key.property));
                    match key.direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let total = matched.len();
        let offset = query.offset.unwrap_or(0).min(total);
        let limit = query.limit.unwrap_or(total);
        let page = matched.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }

    fn get_properties(&self, object_id: &str) -> anyhow::Result<Entry> {
        self.check_failure()?;
        self.entries
            .lock()
            .iter()
            .find(|e| e.uid() == Some(object_id))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no object with id {}", object_id))
    }

    fn get_filename(&self, object_id: &str) -> anyhow::Result<Option<PathBuf>> {
        self.check_failure()?;
        Ok(self.files.lock().get(object_id).cloned())
    }

    fn create(
        &self,
        metadata: &Entry,
        file_path: Option<&Path>,
        _transfer_ownership: bool,
    ) -> anyhow::Result<String> {
        self.check_failure()?;
        let mut entry = metadata.clone();
        entry.remove(UID);
        let uid = self.insert(entry);
        if let Some(path) = file_path.filter(|p| !p.as_os_str().is_empty()) {
            self.files.lock().insert(uid.clone(), path.to_path_buf());
        }
        if let Some(notifier) = &self.notifier {
            notifier.created(uid.clone());
        }
        Ok(uid)
    }

    fn update(
        &self,
        object_id: &str,
        metadata: &Entry,
        file_path: Option<&Path>,
        _transfer_ownership: bool,
    ) -> anyhow::Result<String> {
        self.check_failure()?;
        {
            let mut entries = self.entries.lock();
            let slot = entries
                .iter_mut()
                .find(|e| e.uid() == Some(object_id))
                .ok_or_else(|| anyhow::anyhow!("no object with id {}", object_id))?;
            *slot = metadata.clone().with(UID, object_id);
        }
        if let Some(path) = file_path.filter(|p| !p.as_os_str().is_empty()) {
            self.files
                .lock()
                .insert(object_id.to_string(), path.to_path_buf());
        }
        if let Some(notifier) = &self.notifier {
            notifier.updated(object_id);
        }
        Ok(object_id.to_string())
    }

    fn delete(&self, object_id: &str) -> anyhow::Result<()> {
        self.check_failure()?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.uid() != Some(object_id));
        if entries.len() == before {
            anyhow::bail!("no object with id {}", object_id);
        }
        drop(entries);

        self.files.lock().remove(object_id);
        if let Some(notifier) = &self.notifier {
            notifier.deleted(object_id);
        }
        Ok(())
    }

    fn get_unique_values(&self, property: &str) -> anyhow::Result<Vec<Value>> {
        self.check_failure()?;
        let seen: BTreeSet<String> = self
            .entries
            .lock()
            .iter()
            .filter_map(|e| e.get(property))
            .map(Value::to_string)
            .collect();
        Ok(seen.into_iter().map(Value::Text).collect())
    }
}

/// A remote share client with a canned answer.
pub struct StaticShare {
    answer: Result<Vec<Entry>, String>,
    calls: AtomicUsize,
}

impl StaticShare {
    /// A share whose metadata snapshot is `entries`
    pub fn new(entries: Vec<Entry>) -> Self {
        StaticShare {
            answer: Ok(entries),
            calls: AtomicUsize::new(0),
        }
    }

    /// A share that cannot be reached
    pub fn unreachable(reason: impl Into<String>) -> Self {
        StaticShare {
            answer: Err(reason.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::Relaxed)
    }
}

impl RemoteShare for StaticShare {
    fn fetch_all_metadata(&self, host: &str) -> anyhow::Result<Vec<Entry>> {
        self.calls.fetch_add(1, AtomicOrdering::Relaxed);
        match &self.answer {
            Ok(entries) => Ok(entries.clone()),
            Err(reason) => anyhow::bail!("connection to {} failed: {}", host, reason),
        }
    }
}

/// Convenience for building titled, timestamped entries in tests
pub fn titled(title: &str, timestamp: i64) -> Entry {
    Entry::new()
        .with(TITLE, title)
        .with(crate::types::TIMESTAMP, timestamp)
}
