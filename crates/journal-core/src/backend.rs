//! Backend traits and notifications.
//!
//! A result set talks to its backing store only through [`QueryBackend`].
//! There are three implementations, one per kind of mount point:
//!
//! - [`ObjectStoreBackend`](crate::store::ObjectStoreBackend): the local
//!   object store, queried synchronously with server-side filtering
//! - [`FilesystemBackend`](crate::filesystem::FilesystemBackend): a directory
//!   tree scanned incrementally, filtered as it goes
//! - [`RemoteShareBackend`](crate::remote::RemoteShareBackend): a remote
//!   share's metadata fetched once, filtered client-side
//!
//! ## Scheduling
//!
//! Everything is cooperative. `setup()` only arms the backend; the owner then
//! calls `poll()` from its event loop, and each call does one bounded unit of
//! work (one file stat, one directory listing, one check for a finished
//! fetch) before returning.

use crate::error::Result;
use crate::types::{ChangeEvent, ChangeKind, Entry};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Where a backend is in its preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// More work to do; poll again
    Pending,

    /// Results can be read
    Ready,

    /// Stopped before completing
    Stopped,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Pending => write!(f, "pending"),
            ScanStatus::Ready => write!(f, "ready"),
            ScanStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub entries: Vec<Entry>,
    pub total: usize,
}

impl Page {
    pub fn new(entries: Vec<Entry>, total: usize) -> Self {
        Page { entries, total }
    }
}

/// Contract every backing store implements for a result set.
pub trait QueryBackend {
    /// Arm the backend. Store-backed variants are ready immediately.
    fn setup(&mut self) -> Result<ScanStatus>;

    /// Do one unit of preparation work.
    fn poll(&mut self) -> ScanStatus;

    /// Like `poll`, but may block for up to `timeout` when the remaining
    /// work happens off this thread.
    fn wait(&mut self, _timeout: Duration) -> ScanStatus {
        self.poll()
    }

    /// Abandon any preparation in progress. Idempotent.
    fn stop(&mut self);

    /// Fetch up to `limit` entries starting at `offset`, with every query
    /// filter applied before counting the total.
    fn find(&self, offset: usize, limit: usize) -> Result<Page>;

    /// The mount point this backend answers for
    fn mount_point(&self) -> &str;
}

/// Notifications a result set sends to its view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSetEvent {
    /// A unit of scan work is about to run
    Progress { mount_point: String },

    /// The result set can be read
    Ready { mount_point: String },
}

/// Process-wide broadcast of entry changes.
///
/// Any number of views can subscribe; each gets its own channel. Closed
/// subscribers are dropped on the next notification. Cloning shares the
/// subscriber list.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    subscribers: Arc<Mutex<Vec<Sender<ChangeEvent>>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    /// Broadcast a change to every live subscriber
    pub fn notify(&self, kind: ChangeKind, object_id: impl Into<String>) {
        let event = ChangeEvent {
            kind,
            object_id: object_id.into(),
        };
        trace!(kind = %event.kind, object_id = %event.object_id, "Broadcasting change");

        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn created(&self, object_id: impl Into<String>) {
        self.notify(ChangeKind::Created, object_id);
    }

    pub fn updated(&self, object_id: impl Into<String>) {
        self.notify(ChangeKind::Updated, object_id);
    }

    pub fn deleted(&self, object_id: impl Into<String>) {
        self.notify(ChangeKind::Deleted, object_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
