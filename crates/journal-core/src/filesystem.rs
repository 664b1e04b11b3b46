//! Filesystem backend for removable media and local directories.

use crate::backend::{Page, QueryBackend, ScanStatus};
use crate::config::StorageConfig;
use crate::error::{JournalError, Result};
use crate::mime::{MimeRegistry, FALLBACK_MIME_TYPE};
use crate::query::Query;
use crate::scan::{epoch_seconds, ScanPhase, Scanner};
use crate::search::FilterSet;
use crate::sidecar;
use crate::types::{
    Entry, ACTIVITY, ACTIVITY_ID, DEFAULT_ICON_COLOR, DESCRIPTION, FILESIZE, ICON_COLOR,
    MIME_TYPE, MOUNTPOINT, TIMESTAMP, TITLE, UID,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Metadata for a file that has no sidecar, derived from the file itself.
pub(crate) fn synthesize(path: &Path, mtime: i64, size: u64, mime: &dyn MimeRegistry) -> Entry {
    let path_str = path.to_string_lossy().into_owned();
    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.clone());
    let mime_type = mime
        .guess(path)
        .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string());

    Entry::new()
        .with(UID, path_str.clone())
        .with(TITLE, title)
        .with(TIMESTAMP, mtime)
        .with(FILESIZE, size)
        .with(MIME_TYPE, mime_type)
        .with(ACTIVITY, "")
        .with(ACTIVITY_ID, "")
        .with(ICON_COLOR, DEFAULT_ICON_COLOR)
        .with(DESCRIPTION, path_str)
}

/// Complete metadata for a file: its sidecar when it has one, otherwise
/// synthesized from the file.
pub(crate) fn entry_for(
    path: &Path,
    mtime: i64,
    size: u64,
    sidecar_entry: Option<Entry>,
    metadata_dir: &str,
    mime: &dyn MimeRegistry,
    fetch_preview: bool,
) -> Entry {
    let from_sidecar = sidecar_entry.or_else(|| {
        let dir = path.parent()?;
        sidecar::read(dir, path.file_name()?, metadata_dir, fetch_preview)
    });

    match from_sidecar {
        Some(mut entry) => {
            entry.set(UID, path.to_string_lossy().into_owned());
            if !entry.contains(FILESIZE) {
                entry.set(FILESIZE, size);
            }
            entry
        }
        None => synthesize(path, mtime, size, mime),
    }
}

/// Stat `path` and build its metadata.
pub fn file_metadata(
    path: &Path,
    storage: &StorageConfig,
    mime: &dyn MimeRegistry,
    fetch_preview: bool,
) -> Result<Entry> {
    let meta = fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => JournalError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;
    let mtime = meta.modified().map(epoch_seconds).unwrap_or(0);

    Ok(entry_for(
        path,
        mtime,
        meta.len(),
        None,
        &storage.metadata_dir,
        mime,
        fetch_preview,
    ))
}

/// Result set backend over a directory tree.
///
/// `setup()` arms a [`Scanner`]; the tree is walked one step per `poll()`.
/// Once the scan is ready, `find` slices the scanned list without touching
/// the tree again.
pub struct FilesystemBackend {
    mount_point: String,
    scanner: Scanner,
    storage: StorageConfig,
    mime: Arc<dyn MimeRegistry>,
}

impl FilesystemBackend {
    pub fn new(
        mount_point: impl Into<String>,
        query: &Query,
        storage: StorageConfig,
        mime: Arc<dyn MimeRegistry>,
    ) -> Result<Self> {
        let mount_point = mount_point.into();
        let filters = FilterSet::from_query(query)?;
        let scanner = Scanner::new(
            &mount_point,
            filters,
            query.primary_sort(),
            storage.clone(),
            Arc::clone(&mime),
        );

        Ok(FilesystemBackend {
            mount_point,
            scanner,
            storage,
            mime,
        })
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }
}

impl QueryBackend for FilesystemBackend {
    #[instrument(skip(self))]
    fn setup(&mut self) -> Result<ScanStatus> {
        self.scanner.start();
        Ok(ScanStatus::Pending)
    }

    fn poll(&mut self) -> ScanStatus {
        self.scanner.step()
    }

    fn stop(&mut self) {
        self.scanner.stop();
    }

    fn find(&self, offset: usize, limit: usize) -> Result<Page> {
        match self.scanner.phase() {
            ScanPhase::Ready => {}
            ScanPhase::Stopped => return Err(JournalError::Stopped),
            _ => return Err(JournalError::NotSetUp),
        }

        let started = Instant::now();
        let files = self.scanner.files();
        let total = files.len();
        let end = offset.saturating_add(limit).min(total);
        let start = offset.min(end);

        let entries: Vec<Entry> = files[start..end]
            .iter()
            .map(|file| {
                let mut entry = entry_for(
                    &file.path,
                    file.mtime,
                    file.size,
                    file.metadata.clone(),
                    &self.storage.metadata_dir,
                    self.mime.as_ref(),
                    false,
                );
                entry.set(MOUNTPOINT, self.mount_point.as_str());
                entry
            })
            .collect();

        debug!(
            offset,
            limit,
            returned = entries.len(),
            total,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Filesystem find"
        );
        Ok(Page::new(entries, total))
    }

    fn mount_point(&self) -> &str {
        &self.mount_point
    }
}
