//! Windowed, seekable result sets.
//!
//! A [`ResultSet`] presents the full result of a query as a virtual list
//! but keeps only a bounded, contiguous window of it materialized. Reads
//! near the window slide it a page at a time; reads far away rebuild it
//! around the requested position.
//!
//! ```text
//!            offset                      offset + cache.len()
//!               |<------------ cache ------------>|
//! 0 ... ... ... [ e e e e e e e e e e e e e e e e ] ... ... total
//!                       ^ position
//! ```

use crate::backend::{Page, QueryBackend, ResultSetEvent, ScanStatus};
use crate::cache::WindowedCache;
use crate::config::PagingConfig;
use crate::error::{JournalError, Result};
use crate::filesystem::FilesystemBackend;
use crate::remote::RemoteShareBackend;
use crate::store::ObjectStoreBackend;
use crate::types::Entry;
use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// How long `run_until_ready` lets a backend block per turn
const READY_WAIT: Duration = Duration::from_millis(50);

/// The three backends a result set can sit on.
pub enum Backend {
    ObjectStore(ObjectStoreBackend),
    Filesystem(FilesystemBackend),
    RemoteShare(RemoteShareBackend),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::ObjectStore(_) => "object-store",
            Backend::Filesystem(_) => "filesystem",
            Backend::RemoteShare(_) => "remote-share",
        }
    }

    fn inner(&self) -> &dyn QueryBackend {
        match self {
            Backend::ObjectStore(b) => b,
            Backend::Filesystem(b) => b,
            Backend::RemoteShare(b) => b,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn QueryBackend {
        match self {
            Backend::ObjectStore(b) => b,
            Backend::Filesystem(b) => b,
            Backend::RemoteShare(b) => b,
        }
    }
}

impl QueryBackend for Backend {
    fn setup(&mut self) -> Result<ScanStatus> {
        self.inner_mut().setup()
    }

    fn poll(&mut self) -> ScanStatus {
        self.inner_mut().poll()
    }

    fn wait(&mut self, timeout: Duration) -> ScanStatus {
        self.inner_mut().wait(timeout)
    }

    fn stop(&mut self) {
        self.inner_mut().stop()
    }

    fn find(&self, offset: usize, limit: usize) -> Result<Page> {
        self.inner().find(offset, limit)
    }

    fn mount_point(&self) -> &str {
        self.inner().mount_point()
    }
}

/// Counters describing how the window has been refilled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultSetStats {
    /// Window rebuilt from scratch around the read position
    pub total_misses: u64,
    /// One page added at the tail
    pub appends: u64,
    /// One page added at the head
    pub prepends: u64,
}

/// A query's results, read one entry at a time.
pub struct ResultSet {
    backend: Backend,
    paging: PagingConfig,
    total_count: Option<usize>,
    cache: WindowedCache<Entry>,
    offset: usize,
    position: Option<usize>,
    ready_sent: bool,
    events: Option<Sender<ResultSetEvent>>,
    stats: ResultSetStats,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("backend", &self.backend.kind())
            .field("total_count", &self.total_count)
            .field("offset", &self.offset)
            .field("position", &self.position)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ResultSet {
    pub fn new(backend: Backend, paging: PagingConfig) -> Self {
        ResultSet {
            backend,
            paging,
            total_count: None,
            cache: WindowedCache::new(),
            offset: 0,
            position: None,
            ready_sent: false,
            events: None,
            stats: ResultSetStats::default(),
        }
    }

    /// Receive progress and ready notifications. Replaces any earlier
    /// subscription.
    pub fn events(&mut self) -> Receiver<ResultSetEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.events = Some(sender);
        receiver
    }

    fn emit(&mut self, event: ResultSetEvent) {
        if let Some(sender) = &self.events {
            if sender.send(event).is_err() {
                self.events = None;
            }
        }
    }

    fn note_status(&mut self, status: ScanStatus) -> ScanStatus {
        if status == ScanStatus::Ready && !self.ready_sent {
            self.ready_sent = true;
            let mount_point = self.backend.mount_point().to_string();
            self.emit(ResultSetEvent::Ready { mount_point });
        }
        status
    }

    /// Arm the backend. Store-backed sets are ready straight away.
    #[instrument(skip(self))]
    pub fn setup(&mut self) -> Result<ScanStatus> {
        let status = self.backend.setup()?;
        debug!(mount_point = self.backend.mount_point(), %status, "Result set set up");
        Ok(self.note_status(status))
    }

    fn step(&mut self, timeout: Option<Duration>) -> ScanStatus {
        if self.ready_sent {
            return ScanStatus::Ready;
        }
        let mount_point = self.backend.mount_point().to_string();
        self.emit(ResultSetEvent::Progress { mount_point });

        let status = match timeout {
            Some(timeout) => self.backend.wait(timeout),
            None => self.backend.poll(),
        };
        self.note_status(status)
    }

    /// Do one unit of preparation work.
    pub fn poll(&mut self) -> ScanStatus {
        self.step(None)
    }

    /// Drive preparation to completion on the calling thread.
    pub fn run_until_ready(&mut self) -> ScanStatus {
        loop {
            match self.step(Some(READY_WAIT)) {
                ScanStatus::Pending => continue,
                status => return status,
            }
        }
    }

    /// Abandon preparation. Idempotent.
    pub fn stop(&mut self) {
        self.backend.stop();
    }

    /// Number of entries, fetching the first window if it is not known yet.
    pub fn get_length(&mut self) -> Result<usize> {
        if let Some(total) = self.total_count {
            return Ok(total);
        }

        let limit = self.window_size();
        let page = self.backend.find(0, limit)?;
        debug!(limit, total = page.total, "Seeding cache from the top");

        self.cache = WindowedCache::from_entries(page.entries);
        self.offset = 0;
        self.total_count = Some(page.total);
        Ok(page.total)
    }

    pub fn seek(&mut self, position: usize) {
        self.position = Some(position);
    }

    /// The entry at the current position.
    pub fn read(&mut self) -> Result<&Entry> {
        let position = *self.position.get_or_insert(0);
        let length = self.get_length()?;
        if position >= length {
            return Err(JournalError::PositionOutOfRange { position, length });
        }

        let page_size = self.paging.page_size;
        let cached_end = self.offset + self.cache.len();
        let remaining_forward = if position < self.offset {
            0
        } else {
            cached_end.saturating_sub(position)
        };
        let remaining_backward = if position > cached_end {
            0
        } else {
            position.saturating_sub(self.offset)
        };

        if remaining_forward == 0 && remaining_backward == 0 {
            let limit = self.window_size();
            let offset = position.saturating_sub(limit / 2);
            debug!(offset, limit, "Remaking cache");
            let page = self.fetch(offset, limit)?;

            self.cache = WindowedCache::from_entries(page.entries);
            self.offset = offset;
            self.stats.total_misses += 1;
        } else if remaining_forward == 0 {
            debug!(offset = cached_end, "Appending one more page");
            let page = self.fetch(cached_end, page_size)?;
            self.cache.append_all(page.entries);
            self.stats.appends += 1;

            let excess = self.cache.len().saturating_sub(self.max_cached());
            if excess > 0 {
                self.cache.truncate_front(excess);
                self.offset += excess;
            }
        } else if remaining_backward == 0 && self.offset > 0 {
            let limit = self.offset.min(page_size);
            let offset = self.offset - limit;
            debug!(offset, limit, "Prepending one more page");
            let page = self.fetch(offset, limit)?;
            // Keep the head aligned with what actually came back
            self.offset = self.offset.saturating_sub(page.entries.len());
            self.cache.prepend_all(page.entries);
            self.stats.prepends += 1;

            let excess = self.cache.len().saturating_sub(self.max_cached());
            if excess > 0 {
                self.cache.truncate_back(excess);
            }
        }

        let length = self.total_count.unwrap_or(length);
        let index = position.checked_sub(self.offset);
        trace!(position, offset = self.offset, cached = self.cache.len(), "Read");
        index
            .and_then(|i| self.cache.get(i))
            .ok_or(JournalError::PositionOutOfRange { position, length })
    }

    fn fetch(&mut self, offset: usize, limit: usize) -> Result<Page> {
        let page = self.backend.find(offset, limit)?;
        self.total_count = Some(page.total);
        Ok(page)
    }

    fn window_size(&self) -> usize {
        self.paging.page_size * self.paging.min_pages_to_cache
    }

    fn max_cached(&self) -> usize {
        self.paging.page_size * self.paging.max_pages_to_cache
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Total number of entries, if known yet
    pub fn total_count(&self) -> Option<usize> {
        self.total_count
    }

    /// Index of the first cached entry in the full result list
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn page_size(&self) -> usize {
        self.paging.page_size
    }

    pub fn stats(&self) -> ResultSetStats {
        self.stats
    }

    pub fn mount_point(&self) -> &str {
        self.backend.mount_point()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}
