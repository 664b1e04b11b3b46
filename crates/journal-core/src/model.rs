//! The journal's public operations.
//!
//! Everything here takes a [`JournalContext`], which carries the
//! collaborators the operations need (object store, remote share client,
//! mime registry, change notifier, configuration). The application builds
//! one context at startup and hands it around.
//!
//! Object ids come in two shapes: absolute paths name files on a filesystem
//! or remote share, anything else is an object store id.

use crate::backend::ChangeNotifier;
use crate::config::Config;
use crate::error::{JournalError, Result};
use crate::filesystem::{self, FilesystemBackend};
use crate::mime::{ExtensionRegistry, MimeRegistry};
use crate::query::{MountPoint, Query};
use crate::remote::{RemoteShare, RemoteShareBackend};
use crate::resultset::{Backend, ResultSet};
use crate::sidecar;
use crate::store::{ObjectStore, ObjectStoreBackend};
use crate::types::{
    Entry, Value, DEFAULT_ICON_COLOR, FILESIZE, ICON_COLOR, MIME_TYPE, MOUNTPOINT, MTIME,
    OBJECT_STORE_MOUNT_POINT, TIMESTAMP, TITLE, UID,
};
use chrono::Utc;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Collaborators shared by every journal operation.
#[derive(Clone)]
pub struct JournalContext {
    object_store: Option<Arc<dyn ObjectStore>>,
    remote_share: Option<Arc<dyn RemoteShare>>,
    mime: Arc<dyn MimeRegistry>,
    notifier: ChangeNotifier,
    config: Config,
}

impl JournalContext {
    /// A context with no object store and no remote share client.
    pub fn new(config: Config) -> Self {
        JournalContext {
            object_store: None,
            remote_share: None,
            mime: Arc::new(ExtensionRegistry::new()),
            notifier: ChangeNotifier::new(),
            config,
        }
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_remote_share(mut self, share: Arc<dyn RemoteShare>) -> Self {
        self.remote_share = Some(share);
        self
    }

    pub fn with_mime_registry(mut self, registry: Arc<dyn MimeRegistry>) -> Self {
        self.mime = registry;
        self
    }

    /// Share an existing notifier, e.g. the one the object store forwards
    /// its signals to
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn mime(&self) -> &dyn MimeRegistry {
        self.mime.as_ref()
    }

    pub fn object_store(&self) -> Result<&Arc<dyn ObjectStore>> {
        self.object_store
            .as_ref()
            .ok_or(JournalError::ObjectStoreUnavailable)
    }

    /// Which backend answers for `mount_point`
    pub fn classify(&self, mount_point: &str) -> MountPoint {
        MountPoint::classify(mount_point, &self.config.remote.mount_root)
    }

    fn remote_mount_point(&self, host: &str) -> String {
        format!(
            "{}/{}",
            self.config.remote.mount_root.trim_end_matches('/'),
            host
        )
    }
}

impl fmt::Debug for JournalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JournalContext")
            .field("object_store", &self.object_store.is_some())
            .field("remote_share", &self.remote_share.is_some())
            .field("notifier", &self.notifier)
            .field("config", &self.config)
            .finish()
    }
}

fn is_path(object_id: &str) -> bool {
    object_id.starts_with('/')
}

/// Build a result set for `query`, routed on its single mount point.
#[instrument(skip(ctx))]
pub fn find(ctx: &JournalContext, query: &Query, page_size: usize) -> Result<ResultSet> {
    if page_size == 0 {
        return Err(JournalError::invalid_query("page size must be positive"));
    }

    let mut query = query.clone();
    let mount_point = query.take_mount_point()?;
    let mut paging = ctx.config.paging;
    paging.page_size = page_size;

    let backend = match ctx.classify(&mount_point) {
        MountPoint::ObjectStore => Backend::ObjectStore(ObjectStoreBackend::new(
            Arc::clone(ctx.object_store()?),
            query,
        )),
        MountPoint::RemoteShare { host, path } => Backend::RemoteShare(RemoteShareBackend::new(
            host,
            path,
            ctx.remote_share.clone(),
            &query,
        )?),
        MountPoint::Filesystem(_) => Backend::Filesystem(FilesystemBackend::new(
            mount_point,
            &query,
            ctx.config.storage.clone(),
            Arc::clone(&ctx.mime),
        )?),
    };

    debug!(backend = backend.kind(), page_size, "Result set created");
    Ok(ResultSet::new(backend, paging))
}

/// The filesystem a path lives on, found by walking up while the device
/// stays the same.
#[cfg(unix)]
fn enclosing_mount_point(path: &Path) -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    let Ok(dev) = fs::metadata(path).map(|m| m.dev()) else {
        return PathBuf::from(OBJECT_STORE_MOUNT_POINT);
    };
    let mut current = path;
    while let Some(parent) = current.parent() {
        match fs::metadata(parent) {
            Ok(meta) if meta.dev() == dev => current = parent,
            _ => break,
        }
    }
    current.to_path_buf()
}

#[cfg(not(unix))]
fn enclosing_mount_point(path: &Path) -> PathBuf {
    path.ancestors()
        .last()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(OBJECT_STORE_MOUNT_POINT))
}

/// All metadata of one entry, preview included.
pub fn get(ctx: &JournalContext, object_id: &str) -> Result<Entry> {
    if !is_path(object_id) {
        let mut entry = ctx
            .object_store()?
            .get_properties(object_id)
            .map_err(|e| JournalError::object_store("get_properties", e))?;
        entry.set(MOUNTPOINT, OBJECT_STORE_MOUNT_POINT);
        return Ok(entry);
    }

    let path = Path::new(object_id);
    if let MountPoint::RemoteShare { host, .. } = ctx.classify(object_id) {
        let not_found = || JournalError::FileNotFound {
            path: path.to_path_buf(),
        };
        let dir = path.parent().ok_or_else(not_found)?;
        let name = path.file_name().ok_or_else(not_found)?;
        let mut entry = sidecar::read(dir, name, &ctx.config.storage.metadata_dir, true)
            .ok_or_else(not_found)?;
        entry.set(MOUNTPOINT, ctx.remote_mount_point(&host));
        return Ok(entry);
    }

    let mut entry = filesystem::file_metadata(path, &ctx.config.storage, ctx.mime(), true)?;
    entry.set(
        MOUNTPOINT,
        enclosing_mount_point(path).to_string_lossy().into_owned(),
    );
    Ok(entry)
}

/// Path of the entry's file, if it has one.
///
/// Files from the object store are temporary copies the caller owns.
pub fn get_file(ctx: &JournalContext, object_id: &str) -> Result<Option<PathBuf>> {
    if is_path(object_id) {
        let path = PathBuf::from(object_id);
        if !path.exists() {
            return Err(JournalError::FileNotFound { path });
        }
        return Ok(Some(path));
    }

    ctx.object_store()?
        .get_filename(object_id)
        .map_err(|e| JournalError::object_store("get_filename", e))
}

/// Size of the entry's file in bytes, 0 when it has none.
pub fn get_file_size(ctx: &JournalContext, object_id: &str) -> Result<u64> {
    if is_path(object_id) {
        return Ok(fs::metadata(object_id)?.len());
    }

    let Some(copy) = get_file(ctx, object_id)? else {
        return Ok(0);
    };
    let size = fs::metadata(&copy)?.len();
    if let Err(e) = fs::remove_file(&copy) {
        debug!(path = %copy.display(), error = %e, "Could not remove temporary copy");
    }
    Ok(size)
}

/// Distinct values of a property across the object store
pub fn get_unique_values(ctx: &JournalContext, property: &str) -> Result<Vec<Value>> {
    ctx.object_store()?
        .get_unique_values(property)
        .map_err(|e| JournalError::object_store("get_unique_values", e))
}

/// Delete an entry and, for files, its sidecars.
#[instrument(skip(ctx))]
pub fn delete(ctx: &JournalContext, object_id: &str) -> Result<()> {
    if !is_path(object_id) {
        return ctx
            .object_store()?
            .delete(object_id)
            .map_err(|e| JournalError::object_store("delete", e));
    }

    if let MountPoint::RemoteShare { host, .. } = ctx.classify(object_id) {
        return Err(JournalError::RemoteShareUnavailable { host });
    }

    let path = Path::new(object_id);
    fs::remove_file(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => JournalError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => e.into(),
    })?;
    if let (Some(dir), Some(name)) = (path.parent(), path.file_name()) {
        sidecar::remove(dir, name, &ctx.config.storage.metadata_dir);
    }

    info!(path = object_id, "Deleted entry");
    ctx.notifier.deleted(object_id);
    Ok(())
}

/// Store an entry where its `mountpoint` says, returning its new id.
///
/// With `update_mtime` the entry is stamped with the current time first.
/// Entries with a `uid` update the object store object of that id.
#[instrument(skip(ctx, metadata), fields(title = metadata.title().unwrap_or_default()))]
pub fn write(
    ctx: &JournalContext,
    metadata: &Entry,
    file_path: Option<&Path>,
    update_mtime: bool,
    transfer_ownership: bool,
) -> Result<String> {
    let mut metadata = metadata.clone();
    if update_mtime {
        let now = Utc::now();
        metadata.set(MTIME, now.to_rfc3339());
        metadata.set(TIMESTAMP, now.timestamp());
    }

    let mount_point = metadata
        .mount_point()
        .unwrap_or(OBJECT_STORE_MOUNT_POINT)
        .to_string();

    match ctx.classify(&mount_point) {
        MountPoint::ObjectStore => {
            let store = ctx.object_store()?;
            match metadata.uid().filter(|uid| !uid.is_empty()) {
                Some(uid) => store
                    .update(uid, &metadata, file_path, transfer_ownership)
                    .map_err(|e| JournalError::object_store("update", e)),
                None => store
                    .create(&metadata, file_path, transfer_ownership)
                    .map_err(|e| JournalError::object_store("create", e)),
            }
        }
        MountPoint::RemoteShare { host, .. } => Err(JournalError::RemoteShareUnavailable { host }),
        MountPoint::Filesystem(root) => {
            write_on_external_device(ctx, metadata, file_path, &root, transfer_ownership)
        }
    }
}

fn write_on_external_device(
    ctx: &JournalContext,
    mut metadata: Entry,
    file_path: Option<&Path>,
    mount_point: &Path,
    transfer_ownership: bool,
) -> Result<String> {
    let existing = metadata
        .uid()
        .map(PathBuf::from)
        .filter(|p| p.is_absolute() && p.exists());
    let renaming = existing.is_some();
    let source = existing
        .or_else(|| file_path.map(Path::to_path_buf))
        .filter(|p| p.exists())
        .ok_or(JournalError::NoFile)?;

    if metadata.title().map_or(true, str::is_empty) {
        metadata.set(TITLE, "Untitled");
    }
    let title = metadata.title().unwrap_or_default().to_string();
    let mime_type = metadata.get_str(MIME_TYPE).unwrap_or_default().to_string();

    let mut file_name = sidecar::file_name_for(&title, &mime_type, ctx.mime());
    let mut destination = mount_point.join(&file_name);
    if destination != source {
        file_name = sidecar::unique_file_name(mount_point, &file_name)?;
        destination = mount_point.join(&file_name);
        let stem = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        metadata.set(TITLE, stem);
    }

    let metadata_dir = &ctx.config.storage.metadata_dir;
    if destination != source {
        if renaming && source.parent() == Some(mount_point) {
            fs::rename(&source, &destination)?;
            if let Some(old_name) = source.file_name() {
                sidecar::remove(mount_point, old_name, metadata_dir);
            }
        } else if transfer_ownership {
            if fs::rename(&source, &destination).is_err() {
                // Across devices: copy, then drop the original we own
                fs::copy(&source, &destination)?;
                fs::remove_file(&source)?;
            }
            debug!(from = %source.display(), to = %destination.display(), "Moved file");
        } else {
            fs::copy(&source, &destination)?;
        }
    }

    sidecar::write(mount_point, &file_name, &metadata, metadata_dir, false)?;

    let object_id = destination.to_string_lossy().into_owned();
    info!(path = %object_id, "Wrote entry to external device");
    if renaming && destination != source {
        ctx.notifier.deleted(source.to_string_lossy().into_owned());
    }
    ctx.notifier.created(object_id.clone());
    Ok(object_id)
}

/// Copy an entry to another mount point, returning the copy's id.
pub fn copy(ctx: &JournalContext, entry: &Entry, mount_point: &str) -> Result<String> {
    let uid = entry.uid().ok_or(JournalError::NoFile)?;
    let mut metadata = get(ctx, uid)?;

    if mount_point == OBJECT_STORE_MOUNT_POINT
        && metadata.get_str(ICON_COLOR) == Some(DEFAULT_ICON_COLOR)
    {
        metadata.set(ICON_COLOR, ctx.config.user.icon_color.as_str());
    }

    let file_path = get_file(ctx, uid)?;
    metadata.set(MOUNTPOINT, mount_point);
    metadata.remove(UID);
    if mount_point != OBJECT_STORE_MOUNT_POINT {
        metadata.remove(FILESIZE);
    }

    write(ctx, &metadata, file_path.as_deref(), true, false)
}

/// A file name for `title` that removable media accept.
pub fn get_file_name(ctx: &JournalContext, title: &str, mime_type: &str) -> String {
    sidecar::file_name_for(title, mime_type, ctx.mime())
}

/// `file_name`, or a numbered variant of it, unused in `mount_point`.
pub fn get_unique_file_name(mount_point: &Path, file_name: &str) -> Result<String> {
    sidecar::unique_file_name(mount_point, file_name)
}

/// Whether the entry's metadata can be changed where it lives.
pub fn is_editable(ctx: &JournalContext, entry: &Entry) -> bool {
    let mount_point = entry.mount_point().unwrap_or(OBJECT_STORE_MOUNT_POINT);
    match ctx.classify(mount_point) {
        MountPoint::ObjectStore => true,
        MountPoint::RemoteShare { .. } => false,
        MountPoint::Filesystem(path) => match fs::metadata(&path) {
            Ok(meta) => !meta.permissions().readonly(),
            Err(e) => {
                warn!(mount_point, error = %e, "Cannot check mount point");
                false
            }
        },
    }
}
