//! Incremental directory scanning for filesystem mount points.
//!
//! [`Scanner`] is a resumable state machine. Each [`Scanner::step`] does one
//! bounded unit of work (stat one file or list one directory) and returns,
//! so the owner's event loop is never blocked by a large tree:
//!
//! ```text
//! Idle -> ConvertingLegacy -> Scanning (files <-> directories) -> Ready
//!                    \________________________/
//!                              stop() -> Stopped
//! ```
//!
//! Files that fail the query's filters are dropped as they are found, so
//! the finished list is exactly the result set, sorted on the query's
//! primary key.

use crate::backend::ScanStatus;
use crate::config::StorageConfig;
use crate::mime::{MimeRegistry, FALLBACK_MIME_TYPE};
use crate::query::SortKey;
use crate::search::{Candidate, FilterSet};
use crate::sidecar;
use crate::types::{Entry, CREATION_TIME, FILESIZE};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Where a scan is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    ConvertingLegacy,
    Scanning,
    Ready,
    Stopped,
}

/// A regular file that passed the query's filters.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,

    /// Modification time, epoch seconds
    pub mtime: i64,

    pub size: u64,

    /// Sidecar metadata, when a filter or the sort key needed it and one
    /// exists
    pub metadata: Option<Entry>,
}

impl ScannedFile {
    fn sort_value(&self, property: &str) -> i64 {
        match property {
            FILESIZE => i64::try_from(self.size).unwrap_or(i64::MAX),
            CREATION_TIME => self
                .metadata
                .as_ref()
                .and_then(|m| m.get_i64(CREATION_TIME))
                .unwrap_or(self.mtime),
            _ => self.mtime,
        }
    }
}

/// Counters reported when a scan finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files_seen: u64,
    pub dirs_scanned: u64,
    pub matched: u64,
}

/// Identity used to avoid scanning a directory twice through symlinks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DirId {
    #[cfg(unix)]
    Inode { dev: u64, ino: u64 },
    #[cfg(not(unix))]
    Path(PathBuf),
}

#[cfg(unix)]
fn dir_id(_path: &Path, meta: &fs::Metadata) -> DirId {
    use std::os::unix::fs::MetadataExt;
    DirId::Inode {
        dev: meta.dev(),
        ino: meta.ino(),
    }
}

#[cfg(not(unix))]
fn dir_id(path: &Path, _meta: &fs::Metadata) -> DirId {
    DirId::Path(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
}

/// Seconds since the epoch for a filesystem timestamp
pub(crate) fn epoch_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

/// Races with deletion and unreadable entries are expected on removable
/// media and not worth reporting.
fn is_quiet(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

/// Resumable scan of one mount point.
pub struct Scanner {
    mount_point: PathBuf,
    canonical_root: Option<PathBuf>,
    filters: FilterSet,
    sort: SortKey,
    storage: StorageConfig,
    mime: Arc<dyn MimeRegistry>,

    phase: ScanPhase,
    pending_dirs: VecDeque<PathBuf>,
    pending_files: VecDeque<PathBuf>,
    visited: HashSet<DirId>,
    files: Vec<ScannedFile>,
    stats: ScanStats,
}

impl Scanner {
    pub fn new(
        mount_point: impl Into<PathBuf>,
        filters: FilterSet,
        sort: SortKey,
        storage: StorageConfig,
        mime: Arc<dyn MimeRegistry>,
    ) -> Self {
        Scanner {
            mount_point: mount_point.into(),
            canonical_root: None,
            filters,
            sort,
            storage,
            mime,
            phase: ScanPhase::Idle,
            pending_dirs: VecDeque::new(),
            pending_files: VecDeque::new(),
            visited: HashSet::new(),
            files: Vec::new(),
            stats: ScanStats::default(),
        }
    }

    /// Reset the queues to the mount point and arm the scan.
    pub fn start(&mut self) {
        self.pending_dirs.clear();
        self.pending_files.clear();
        self.visited.clear();
        self.files.clear();
        self.stats = ScanStats::default();

        self.canonical_root = match fs::canonicalize(&self.mount_point) {
            Ok(root) => Some(root),
            Err(e) => {
                warn!(mount_point = %self.mount_point.display(), error = %e, "Cannot resolve mount point");
                None
            }
        };
        if let Ok(meta) = fs::metadata(&self.mount_point) {
            self.visited.insert(dir_id(&self.mount_point, &meta));
        }
        self.pending_dirs.push_back(self.mount_point.clone());

        self.phase = if sidecar::needs_conversion(&self.mount_point, &self.storage) {
            ScanPhase::ConvertingLegacy
        } else {
            ScanPhase::Scanning
        };
        debug!(mount_point = %self.mount_point.display(), phase = ?self.phase, "Scan armed");
    }

    /// Do one unit of work.
    pub fn step(&mut self) -> ScanStatus {
        match self.phase {
            ScanPhase::Idle => {
                self.start();
                ScanStatus::Pending
            }
            ScanPhase::ConvertingLegacy => {
                if let Err(e) =
                    sidecar::convert_legacy(&self.mount_point, &self.storage, self.mime.as_ref())
                {
                    warn!(mount_point = %self.mount_point.display(), error = %e, "Legacy conversion failed");
                }
                self.phase = ScanPhase::Scanning;
                ScanStatus::Pending
            }
            ScanPhase::Scanning => {
                if let Some(path) = self.pending_files.pop_front() {
                    self.scan_file(path);
                } else if let Some(dir) = self.pending_dirs.pop_front() {
                    self.scan_directory(&dir);
                } else {
                    self.finish();
                    return ScanStatus::Ready;
                }
                ScanStatus::Pending
            }
            ScanPhase::Ready => ScanStatus::Ready,
            ScanPhase::Stopped => ScanStatus::Stopped,
        }
    }

    /// Abandon the scan. A finished scan keeps its results.
    pub fn stop(&mut self) {
        if matches!(self.phase, ScanPhase::Ready | ScanPhase::Stopped) {
            return;
        }
        debug!(mount_point = %self.mount_point.display(), "Scan stopped");
        self.phase = ScanPhase::Stopped;
        self.pending_dirs.clear();
        self.pending_files.clear();
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Matching files, sorted once the scan is ready
    pub fn files(&self) -> &[ScannedFile] {
        &self.files
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn scan_directory(&mut self, dir: &Path) {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                self.report(dir, &e);
                return;
            }
        };
        self.stats.dirs_scanned += 1;

        for dir_entry in listing {
            let dir_entry = match dir_entry {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    self.report(dir, &e);
                    continue;
                }
            };
            if dir_entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            self.pending_files.push_back(dir_entry.path());
        }
    }

    fn scan_file(&mut self, path: PathBuf) {
        self.stats.files_seen += 1;

        let link_meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => return self.report(&path, &e),
        };

        let meta = if link_meta.file_type().is_symlink() {
            let target = match fs::canonicalize(&path) {
                Ok(target) => target,
                Err(e) => return self.report(&path, &e),
            };
            let inside = self
                .canonical_root
                .as_ref()
                .map_or(false, |root| target.starts_with(root));
            if !inside {
                debug!(path = %path.display(), target = %target.display(), "Skipping link outside the mount point");
                return;
            }
            match fs::metadata(&target) {
                Ok(meta) => meta,
                Err(e) => return self.report(&path, &e),
            }
        } else {
            link_meta
        };

        if meta.is_dir() {
            if self.visited.insert(dir_id(&path, &meta)) {
                self.pending_dirs.push_back(path);
            }
            return;
        }
        if !meta.is_file() {
            return;
        }

        let mtime = meta.modified().map(epoch_seconds).unwrap_or(0);
        let metadata = if self.filters.needs_metadata() || self.sort.property == CREATION_TIME {
            self.read_sidecar(&path)
        } else {
            None
        };

        let relative = path
            .strip_prefix(&self.mount_point)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let guessed = if self.filters.needs_mime_type()
            && metadata.as_ref().and_then(Entry::mime_type).is_none()
        {
            Some(
                self.mime
                    .guess(&path)
                    .unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
            )
        } else {
            None
        };
        let candidate = Candidate {
            path: Some(relative.as_str()),
            entry: metadata.as_ref(),
            mtime,
            mime_type: metadata
                .as_ref()
                .and_then(Entry::mime_type)
                .or(guessed.as_deref()),
        };
        if !self.filters.matches(&candidate) {
            return;
        }

        self.stats.matched += 1;
        self.files.push(ScannedFile {
            path,
            mtime,
            size: meta.len(),
            metadata,
        });
    }

    fn read_sidecar(&self, path: &Path) -> Option<Entry> {
        let dir = path.parent()?;
        let name = path.file_name()?;
        sidecar::read(dir, name, &self.storage.metadata_dir, false)
    }

    fn finish(&mut self) {
        let property = self.sort.property.clone();
        let descending = self.sort.is_descending();
        self.files.sort_by(|a, b| {
            let ord = a
                .sort_value(&property)
                .cmp(&b.sort_value(&property))
                .then_with(|| a.path.cmp(&b.path));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });

        self.phase = ScanPhase::Ready;
        info!(
            mount_point = %self.mount_point.display(),
            matched = self.stats.matched,
            files = self.stats.files_seen,
            dirs = self.stats.dirs_scanned,
            sort = %self.sort,
            "Scan complete"
        );
    }

    fn report(&self, path: &Path, err: &io::Error) {
        if is_quiet(err) {
            debug!(path = %path.display(), error = %err, "Skipping entry");
        } else {
            warn!(path = %path.display(), error = %err, "Error while scanning");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::ExtensionRegistry;
    use crate::query::Query;
    use std::fs::File;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    fn touch(path: &Path, mtime: i64) {
        let file = File::create(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime as u64))
            .unwrap();
    }

    fn scanner_for(root: &Path, query: &Query) -> Scanner {
        Scanner::new(
            root,
            FilterSet::from_query(query).unwrap(),
            query.primary_sort(),
            StorageConfig::default(),
            Arc::new(ExtensionRegistry::new()),
        )
    }

    fn drain(scanner: &mut Scanner) -> usize {
        scanner.start();
        let mut steps = 0;
        while scanner.step() == ScanStatus::Pending {
            steps += 1;
            assert!(steps < 10_000, "scan did not terminate");
        }
        steps
    }

    fn names(scanner: &Scanner) -> Vec<String> {
        scanner
            .files()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("a.txt"), 1_000);
        touch(&root.join("b.png"), 5_000);
        touch(&root.join("c.odt"), 3_000);
        fs::create_dir(root.join("sub")).unwrap();
        touch(&root.join("sub").join("d.txt"), 4_000);
        touch(&root.join("sub").join("e.txt"), 2_000);
        dir
    }

    #[test]
    fn test_scan_sorted_newest_first() {
        let dir = tree();
        touch(&dir.path().join(".hidden"), 9_000);

        let mut scanner = scanner_for(dir.path(), &Query::new());
        let steps = drain(&mut scanner);

        assert_eq!(scanner.phase(), ScanPhase::Ready);
        assert_eq!(names(&scanner), ["b.png", "d.txt", "c.odt", "e.txt", "a.txt"]);
        // One step per file or directory, never the whole tree at once
        assert!(steps >= 7);
        assert_eq!(scanner.stats().dirs_scanned, 2);
    }

    #[test]
    fn test_scan_by_size_ascending() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big"), vec![0u8; 300]).unwrap();
        fs::write(dir.path().join("small"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("medium"), vec![0u8; 100]).unwrap();

        let query = Query::new().order_by("+filesize".parse().unwrap());
        let mut scanner = scanner_for(dir.path(), &query);
        drain(&mut scanner);

        assert_eq!(names(&scanner), ["small", "medium", "big"]);
    }

    #[test]
    fn test_filters_applied_while_scanning() {
        let dir = tree();
        let query = Query::new()
            .mime_types(["text/plain"])
            .between(Some(1_500), Some(4_000));
        let mut scanner = scanner_for(dir.path(), &query);
        drain(&mut scanner);

        assert_eq!(names(&scanner), ["d.txt", "e.txt"]);
        assert_eq!(scanner.stats().matched, 2);
    }

    #[test]
    fn test_unknown_extension_matches_fallback_mime_type() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("blob.zzq"), 1_000);
        touch(&dir.path().join("notes.txt"), 2_000);

        let query = Query::new().mime_types([FALLBACK_MIME_TYPE]);
        let mut scanner = scanner_for(dir.path(), &query);
        drain(&mut scanner);

        assert_eq!(names(&scanner), ["blob.zzq"]);
    }

    #[test]
    fn test_favorites_need_sidecar() {
        let dir = tree();
        let kept = Entry::new().with("title", "c").with("keep", 1i64);
        sidecar::write(dir.path(), "c.odt", &kept, ".Sugar-Metadata", false).unwrap();

        let mut scanner = scanner_for(dir.path(), &Query::new().favorites());
        drain(&mut scanner);

        assert_eq!(names(&scanner), ["c.odt"]);
        assert!(scanner.files()[0].metadata.is_some());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tree();
        let mut scanner = scanner_for(dir.path(), &Query::new());
        scanner.start();
        assert_eq!(scanner.step(), ScanStatus::Pending);

        scanner.stop();
        scanner.stop();
        assert_eq!(scanner.step(), ScanStatus::Stopped);
        assert_eq!(scanner.phase(), ScanPhase::Stopped);
    }

    #[test]
    fn test_stop_after_completion_keeps_results() {
        let dir = tree();
        let mut scanner = scanner_for(dir.path(), &Query::new());
        drain(&mut scanner);

        scanner.stop();
        assert_eq!(scanner.step(), ScanStatus::Ready);
        assert_eq!(scanner.files().len(), 5);
    }

    #[test]
    fn test_missing_mount_point_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut scanner = scanner_for(&dir.path().join("gone"), &Query::new());
        drain(&mut scanner);

        assert_eq!(scanner.phase(), ScanPhase::Ready);
        assert!(scanner.files().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks() {
        use std::os::unix::fs::symlink;

        let dir = tree();
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("secret.txt"), 7_000);

        symlink(outside.path(), dir.path().join("escape")).unwrap();
        symlink(dir.path(), dir.path().join("sub").join("loop")).unwrap();
        symlink(dir.path().join("a.txt"), dir.path().join("alias.txt")).unwrap();

        let mut scanner = scanner_for(dir.path(), &Query::new());
        drain(&mut scanner);

        let found = names(&scanner);
        assert!(!found.contains(&"secret.txt".to_string()));
        assert!(found.contains(&"alias.txt".to_string()));
        // The loop back to the root does not rescan it
        assert_eq!(found.len(), 6);
    }

    #[test]
    fn test_legacy_conversion_runs_first() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig::default();
        let legacy = dir.path().join(&storage.legacy_store_dir);
        fs::create_dir(&legacy).unwrap();
        touch(&dir.path().join("poem.txt"), 1_000);
        fs::write(
            legacy.join("uid-9"),
            r#"{"uid": "uid-9", "filename": "poem.txt", "title": "Poem", "keep": 1}"#,
        )
        .unwrap();

        let mut scanner = scanner_for(dir.path(), &Query::new().favorites());
        scanner.start();
        assert_eq!(scanner.phase(), ScanPhase::ConvertingLegacy);
        while scanner.step() == ScanStatus::Pending {}

        assert_eq!(names(&scanner), ["poem.txt"]);
        assert!(dir.path().join(&storage.metadata_dir).is_dir());
    }
}
