//! # Journal Core Library
//!
//! This crate provides the result-set model behind the Sugar journal: one
//! query interface over three very different stores, read through a
//! bounded, seekable window.
//!
//! ## Architecture
//!
//! - **Query** (`query`, `search`): Query parameters, mount-point routing and
//!   client-side filtering
//! - **Backends** (`backend`, `store`, `filesystem`, `remote`): The object
//!   store, directory trees scanned incrementally (`scan`, `sidecar`), and
//!   remote shares fetched on a worker thread
//! - **Result sets** (`resultset`, `cache`): Windowed reading over any backend
//! - **Model** (`model`): The public operations (find, get, write, copy,
//!   delete, ...) over a [`JournalContext`]
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust,ignore
//! use journal_core::{model, Config, JournalContext, Query};
//!
//! let ctx = JournalContext::new(Config::load()?);
//! let query = Query::new().mount_point("/media/usb").text("moon");
//!
//! let mut results = model::find(&ctx, &query, 10)?;
//! results.setup()?;
//! results.run_until_ready();
//!
//! for position in 0..results.get_length()? {
//!     results.seek(position);
//!     println!("{:?}", results.read()?.title());
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod mime;
pub mod model;
pub mod query;
pub mod remote;
pub mod resultset;
pub mod scan;
pub mod search;
pub mod sidecar;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export commonly used types
pub use backend::{ChangeNotifier, Page, QueryBackend, ResultSetEvent, ScanStatus};
pub use config::Config;
pub use error::{JournalError, Result};
pub use mime::{ExtensionRegistry, MimeRegistry};
pub use model::JournalContext;
pub use query::{MountPoint, Query, SortKey, TimeRange};
pub use remote::{MirroredShare, RemoteShare};
pub use resultset::{Backend, ResultSet};
pub use store::ObjectStore;
pub use types::{ChangeEvent, ChangeKind, Entry, Value};
