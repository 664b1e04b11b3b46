//! Remote share backend.
//!
//! A remote share exposes no query interface, only a complete metadata
//! snapshot. The backend fetches that snapshot once on a worker thread,
//! applies the query's filters and sort locally, and pages over the result
//! like the other backends do.
//!
//! A share that cannot be reached yields an empty result set rather than an
//! error; the view shows "nothing here" either way.

use crate::backend::{Page, QueryBackend, ScanStatus};
use crate::config::Config;
use crate::error::{JournalError, Result};
use crate::query::{Query, SortKey};
use crate::search::{Candidate, FilterSet};
use crate::sidecar::{METADATA_SUFFIX, PREVIEW_SUFFIX};
use crate::types::{Entry, CREATION_TIME, MOUNTPOINT, TIMESTAMP, UID};
use anyhow::Context;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Client for one kind of remote share.
pub trait RemoteShare: Send + Sync {
    /// Every entry the share at `host` publishes, or an error if it cannot
    /// be reached.
    fn fetch_all_metadata(&self, host: &str) -> anyhow::Result<Vec<Entry>>;
}

/// Reads the metadata a share client has mirrored to local disk.
///
/// The client downloads `<host>/<metadata_dir>/*.metadata` below
/// `root`; previews are left alone.
#[derive(Debug, Clone)]
pub struct MirroredShare {
    root: PathBuf,
    metadata_dir: String,
}

impl MirroredShare {
    pub fn new(root: impl Into<PathBuf>, metadata_dir: impl Into<String>) -> Self {
        MirroredShare {
            root: root.into(),
            metadata_dir: metadata_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.remote.mirror_root(), &config.storage.metadata_dir)
    }
}

impl RemoteShare for MirroredShare {
    fn fetch_all_metadata(&self, host: &str) -> anyhow::Result<Vec<Entry>> {
        let share_dir = self.root.join(host);
        let metadata_dir = share_dir.join(&self.metadata_dir);
        let listing = fs::read_dir(&metadata_dir)
            .with_context(|| format!("no metadata mirrored at {}", metadata_dir.display()))?;

        let mut entries = Vec::new();
        for dir_entry in listing {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(PREVIEW_SUFFIX) {
                continue;
            }
            let Some(file_name) = name.strip_suffix(METADATA_SUFFIX) else {
                continue;
            };

            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let mut entry = match Entry::from_json_str(&text) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable share metadata");
                    continue;
                }
            };

            entry.set(UID, share_dir.join(file_name).to_string_lossy().into_owned());
            if let Some(timestamp) = entry.get(TIMESTAMP).cloned() {
                entry.set(CREATION_TIME, timestamp);
            }
            entries.push(entry);
        }

        Ok(entries)
    }
}

enum FetchState {
    Idle,
    Fetching {
        done: Receiver<anyhow::Result<Vec<Entry>>>,
        started: Instant,
    },
    Ready(Vec<Entry>),
    Stopped,
}

/// Result set backend over a remote share.
pub struct RemoteShareBackend {
    host: String,
    mount_point: String,
    share: Option<Arc<dyn RemoteShare>>,
    filters: FilterSet,
    sort: SortKey,
    state: FetchState,
    last_error: Option<JournalError>,
}

impl RemoteShareBackend {
    /// `share` is `None` when no client is configured; such a backend is
    /// always empty.
    pub fn new(
        host: impl Into<String>,
        mount_point: impl Into<String>,
        share: Option<Arc<dyn RemoteShare>>,
        query: &Query,
    ) -> Result<Self> {
        Ok(RemoteShareBackend {
            host: host.into(),
            mount_point: mount_point.into(),
            share,
            filters: FilterSet::from_query(query)?,
            sort: query.primary_sort(),
            state: FetchState::Idle,
            last_error: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Why the share came back empty, if the fetch failed
    pub fn last_error(&self) -> Option<&JournalError> {
        self.last_error.as_ref()
    }

    fn start_fetch(
        &mut self,
        spawned: io::Result<()>,
        done: Receiver<anyhow::Result<Vec<Entry>>>,
    ) -> ScanStatus {
        match spawned {
            Ok(()) => {
                debug!(host = %self.host, "Fetching remote share metadata");
                self.state = FetchState::Fetching {
                    done,
                    started: Instant::now(),
                };
                ScanStatus::Pending
            }
            Err(e) => self.complete(
                Err(anyhow::Error::new(e).context("could not start the fetch worker")),
                Duration::ZERO,
            ),
        }
    }

    fn complete(&mut self, result: anyhow::Result<Vec<Entry>>, elapsed: Duration) -> ScanStatus {
        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                let err = JournalError::remote_share(self.host.as_str(), e);
                warn!(
                    host = %self.host,
                    error = %err,
                    transient = err.is_transient(),
                    "Remote share unavailable, showing nothing"
                );
                self.last_error = Some(err);
                Vec::new()
            }
        };
        let fetched = entries.len();

        let mut matched: Vec<Entry> = entries
            .into_iter()
            .filter(|entry| self.filters.matches(&Candidate::from_entry(entry)))
            .collect();

        let property = self.sort.property.as_str();
        let descending = self.sort.is_descending();
        matched.sort_by(|a, b| {
            let ord = a
                .get_i64(property)
                .unwrap_or(0)
                .cmp(&b.get_i64(property).unwrap_or(0))
                .then_with(|| a.uid().cmp(&b.uid()));
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });

        for entry in &mut matched {
            entry.set(MOUNTPOINT, self.mount_point.as_str());
        }

        info!(
            host = %self.host,
            fetched,
            matched = matched.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Remote share metadata loaded"
        );
        self.state = FetchState::Ready(matched);
        ScanStatus::Ready
    }

    fn receive(&mut self, timeout: Option<Duration>) -> ScanStatus {
        if matches!(self.state, FetchState::Idle) {
            return match self.setup() {
                Ok(status) => status,
                Err(e) => self.complete(Err(anyhow::Error::new(e)), Duration::ZERO),
            };
        }

        let received = match &self.state {
            FetchState::Idle | FetchState::Ready(_) => return ScanStatus::Ready,
            FetchState::Stopped => return ScanStatus::Stopped,
            FetchState::Fetching { done, started } => {
                let outcome = match timeout {
                    Some(timeout) => done.recv_timeout(timeout).map_err(|e| match e {
                        RecvTimeoutError::Timeout => TryRecvError::Empty,
                        RecvTimeoutError::Disconnected => TryRecvError::Disconnected,
                    }),
                    None => done.try_recv(),
                };
                (outcome, started.elapsed())
            }
        };

        match received {
            (Ok(result), elapsed) => self.complete(result, elapsed),
            (Err(TryRecvError::Empty), _) => ScanStatus::Pending,
            (Err(TryRecvError::Disconnected), elapsed) => self.complete(
                Err(anyhow::anyhow!("fetch worker exited without an answer")),
                elapsed,
            ),
        }
    }
}

impl QueryBackend for RemoteShareBackend {
    fn setup(&mut self) -> Result<ScanStatus> {
        let Some(share) = self.share.clone() else {
            warn!(host = %self.host, "No remote share client configured");
            self.state = FetchState::Ready(Vec::new());
            return Ok(ScanStatus::Ready);
        };

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let host = self.host.clone();
        let spawned = thread::Builder::new()
            .name(format!("share-{}", host))
            .spawn(move || {
                let _ = done_tx.send(share.fetch_all_metadata(&host));
            })
            .map(drop);

        Ok(self.start_fetch(spawned, done_rx))
    }

    fn poll(&mut self) -> ScanStatus {
        self.receive(None)
    }

    fn wait(&mut self, timeout: Duration) -> ScanStatus {
        self.receive(Some(timeout))
    }

    fn stop(&mut self) {
        if matches!(self.state, FetchState::Idle | FetchState::Fetching { .. }) {
            debug!(host = %self.host, "Remote fetch abandoned");
            self.state = FetchState::Stopped;
        }
    }

    fn find(&self, offset: usize, limit: usize) -> Result<Page> {
        let entries = match &self.state {
            FetchState::Ready(entries) => entries,
            FetchState::Stopped => return Err(JournalError::Stopped),
            _ => return Err(JournalError::NotSetUp),
        };

        let total = entries.len();
        let end = offset.saturating_add(limit).min(total);
        let start = offset.min(end);
        Ok(Page::new(entries[start..end].to_vec(), total))
    }

    fn mount_point(&self) -> &str {
        &self.mount_point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{titled, StaticShare};
    use crate::types::{FILESIZE, KEEP};
    use crossbeam_channel::Sender;
    use tempfile::TempDir;

    const MOUNT: &str = "/tmp/10.0.0.7";

    fn drain(backend: &mut RemoteShareBackend) -> ScanStatus {
        backend.setup().unwrap();
        loop {
            match backend.wait(Duration::from_millis(50)) {
                ScanStatus::Pending => continue,
                status => return status,
            }
        }
    }

    fn backend(share: StaticShare, query: &Query) -> RemoteShareBackend {
        RemoteShareBackend::new("10.0.0.7", MOUNT, Some(Arc::new(share)), query).unwrap()
    }

    #[test]
    fn test_unreachable_share_is_empty() {
        let mut backend = backend(StaticShare::unreachable("connection refused"), &Query::new());
        assert_eq!(drain(&mut backend), ScanStatus::Ready);

        let page = backend.find(0, 10).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.entries.is_empty());

        match backend.last_error() {
            Some(JournalError::RemoteShare { host, reason }) => {
                assert_eq!(host, "10.0.0.7");
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(backend.last_error().unwrap().is_transient());
    }

    #[test]
    fn test_worker_spawn_failure_is_empty() {
        let mut backend = backend(StaticShare::new(vec![titled("moon", 1)]), &Query::new());
        let (_done_tx, done_rx) = crossbeam_channel::bounded(1);

        let status = backend.start_fetch(Err(io::Error::other("no more threads")), done_rx);
        assert_eq!(status, ScanStatus::Ready);
        assert_eq!(backend.poll(), ScanStatus::Ready);
        assert_eq!(backend.find(0, 10).unwrap().total, 0);
        assert!(matches!(
            backend.last_error(),
            Some(JournalError::RemoteShare { reason, .. }) if reason.contains("no more threads")
        ));
    }

    #[test]
    fn test_missing_client_is_empty() {
        let mut backend = RemoteShareBackend::new("h", "/tmp/h", None, &Query::new()).unwrap();
        assert_eq!(backend.setup().unwrap(), ScanStatus::Ready);
        assert_eq!(backend.find(0, 5).unwrap().total, 0);
    }

    #[test]
    fn test_filters_sort_and_tags() {
        let share = StaticShare::new(vec![
            titled("moon one", 30).with(UID, "/tmp/10.0.0.7/a"),
            titled("sun", 20).with(UID, "/tmp/10.0.0.7/b"),
            titled("Moon two", 10).with(UID, "/tmp/10.0.0.7/c").with(KEEP, 1i64),
            titled("moon three", 40).with(UID, "/tmp/10.0.0.7/d"),
        ]);
        let query = Query::new().text("moon").order_by("+timestamp".parse().unwrap());
        let mut backend = backend(share, &query);
        drain(&mut backend);

        let page = backend.find(0, 10).unwrap();
        let titles: Vec<_> = page.entries.iter().filter_map(Entry::title).collect();
        assert_eq!(titles, ["Moon two", "moon one", "moon three"]);
        assert!(page.entries.iter().all(|e| e.mount_point() == Some(MOUNT)));

        let page = backend.find(1, 1).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.entries[0].title(), Some("moon one"));
    }

    #[test]
    fn test_sort_by_size_descending() {
        let share = StaticShare::new(vec![
            titled("small", 1).with(FILESIZE, 10i64),
            titled("big", 2).with(FILESIZE, 900i64),
            titled("medium", 3).with(FILESIZE, 200i64),
        ]);
        let mut backend = backend(share, &Query::new().order_by("-filesize".parse().unwrap()));
        drain(&mut backend);

        let titles: Vec<_> = backend
            .find(0, 10)
            .unwrap()
            .entries
            .iter()
            .filter_map(|e| e.title().map(str::to_string))
            .collect();
        assert_eq!(titles, ["big", "medium", "small"]);
    }

    #[test]
    fn test_fetches_once() {
        let share = Arc::new(StaticShare::new(vec![titled("a", 1)]));
        let client: Arc<dyn RemoteShare> = share.clone();
        let mut backend = RemoteShareBackend::new("h", "/tmp/h", Some(client), &Query::new()).unwrap();
        drain(&mut backend);
        backend.find(0, 1).unwrap();
        backend.find(0, 1).unwrap();
        assert_eq!(share.calls(), 1);
    }

    struct GatedShare {
        gate: Receiver<()>,
    }

    impl RemoteShare for GatedShare {
        fn fetch_all_metadata(&self, _host: &str) -> anyhow::Result<Vec<Entry>> {
            let _ = self.gate.recv();
            Ok(vec![titled("late", 1)])
        }
    }

    #[test]
    fn test_poll_does_not_block_and_stop_discards() {
        let (open, gate): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(1);
        let mut backend =
            RemoteShareBackend::new("h", "/tmp/h", Some(Arc::new(GatedShare { gate })), &Query::new())
                .unwrap();

        assert_eq!(backend.setup().unwrap(), ScanStatus::Pending);
        assert_eq!(backend.poll(), ScanStatus::Pending);
        assert!(matches!(backend.find(0, 1), Err(JournalError::NotSetUp)));

        backend.stop();
        open.send(()).unwrap();
        assert_eq!(backend.poll(), ScanStatus::Stopped);
        assert!(matches!(backend.find(0, 1), Err(JournalError::Stopped)));
    }

    #[test]
    fn test_mirrored_share() {
        let root = TempDir::new().unwrap();
        let meta_dir = root.path().join("10.0.0.7").join(".Sugar-Metadata");
        fs::create_dir_all(&meta_dir).unwrap();
        fs::write(
            meta_dir.join("song.ogg.metadata"),
            r#"{"title": "Song", "timestamp": 1500, "mime_type": "audio/ogg"}"#,
        )
        .unwrap();
        fs::write(meta_dir.join("song.ogg.preview"), [1u8, 2]).unwrap();
        fs::write(meta_dir.join("broken.txt.metadata"), "{{{").unwrap();

        let share = MirroredShare::new(root.path(), ".Sugar-Metadata");
        let entries = share.fetch_all_metadata("10.0.0.7").unwrap();
        assert_eq!(entries.len(), 1);

        let song = &entries[0];
        let expected_uid = root.path().join("10.0.0.7").join("song.ogg");
        assert_eq!(song.uid(), Some(expected_uid.to_string_lossy().as_ref()));
        assert_eq!(song.get_i64(CREATION_TIME), Some(1500));

        assert!(share.fetch_all_metadata("10.0.0.8").is_err());
    }
}
