//! Sidecar metadata on removable media.
//!
//! Journal properties that a plain filesystem cannot hold live next to the
//! real file, in a hidden directory:
//!
//! ```text
//! <dir>/photo.png
//! <dir>/.Sugar-Metadata/photo.png.metadata   JSON object
//! <dir>/.Sugar-Metadata/photo.png.preview    raw thumbnail bytes
//! ```
//!
//! The layout and the suffixes are shared with every other Sugar release,
//! so they must not change.
//!
//! Media written by the first generation of the on-device store keep one JSON
//! record per object under `.olpc.store/` instead; [`convert_legacy`]
//! rewrites those into sidecars once.

use crate::config::StorageConfig;
use crate::error::{JournalError, Result};
use crate::mime::MimeRegistry;
use crate::types::{Entry, Value, FILESIZE, MIME_TYPE, MOUNTPOINT, PREVIEW, TITLE, UID};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const METADATA_SUFFIX: &str = ".metadata";
pub const PREVIEW_SUFFIX: &str = ".preview";

/// Longest file name produced by [`unique_file_name`].
const MAX_FILE_NAME_LEN: usize = 255;

/// Characters FAT file systems refuse in names
const INVALID_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\x7f'];

fn sidecar_path(dir: &Path, metadata_dir: &str, file_name: &OsStr, suffix: &str) -> PathBuf {
    let mut name = file_name.to_os_string();
    name.push(suffix);
    dir.join(metadata_dir).join(name)
}

/// Path of the `.metadata` sidecar for `file_name` in `dir`
pub fn metadata_path(dir: &Path, metadata_dir: &str, file_name: &OsStr) -> PathBuf {
    sidecar_path(dir, metadata_dir, file_name, METADATA_SUFFIX)
}

/// Path of the `.preview` sidecar for `file_name` in `dir`
pub fn preview_path(dir: &Path, metadata_dir: &str, file_name: &OsStr) -> PathBuf {
    sidecar_path(dir, metadata_dir, file_name, PREVIEW_SUFFIX)
}

/// Read the sidecar metadata of `dir/file_name`.
///
/// Returns `None` when there is no sidecar. A sidecar that cannot be parsed
/// is deleted together with its preview, so the file falls back to
/// synthesized metadata from then on.
pub fn read(dir: &Path, file_name: &OsStr, metadata_dir: &str, fetch_preview: bool) -> Option<Entry> {
    let meta_path = metadata_path(dir, metadata_dir, file_name);
    if !meta_path.exists() {
        return None;
    }

    let mut entry = match parse_metadata(&meta_path) {
        Ok(entry) => entry,
        Err(e) => {
            let prev_path = preview_path(dir, metadata_dir, file_name);
            let _ = fs::remove_file(&meta_path);
            if prev_path.exists() {
                let _ = fs::remove_file(&prev_path);
            }
            error!(
                path = %meta_path.display(),
                error = %e,
                "Could not read metadata for file on external device, removed it"
            );
            return None;
        }
    };

    entry.set(UID, dir.join(file_name).to_string_lossy().into_owned());

    if !fetch_preview {
        entry.remove(PREVIEW);
    } else {
        let prev_path = preview_path(dir, metadata_dir, file_name);
        if prev_path.exists() {
            match fs::read(&prev_path) {
                Ok(bytes) => entry.set(PREVIEW, Value::Bytes(bytes)),
                Err(e) => debug!(
                    path = %prev_path.display(),
                    error = %e,
                    "Could not read preview for file on external device"
                ),
            }
        }
    }

    Some(entry)
}

fn parse_metadata(meta_path: &Path) -> Result<Entry> {
    let text = fs::read_to_string(meta_path)?;
    Entry::from_json_str(&text).map_err(|e| JournalError::CorruptMetadata {
        path: meta_path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Locations of freshly written sidecars
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarPaths {
    pub metadata: PathBuf,
    pub preview: Option<PathBuf>,
}

/// Write the sidecars for `dir/file_name`.
///
/// Identity and origin (`uid`, `mountpoint`) are never persisted, and
/// `filesize` only when `keep_filesize` is set since the file itself already
/// knows its size. The preview goes to its own file. Both files are written
/// to a temporary name first and renamed into place.
pub fn write(
    dir: &Path,
    file_name: &str,
    entry: &Entry,
    metadata_dir: &str,
    keep_filesize: bool,
) -> Result<SidecarPaths> {
    let mut stored = entry.clone();
    stored.remove(MOUNTPOINT);
    stored.remove(UID);
    if !keep_filesize {
        stored.remove(FILESIZE);
    }
    let preview = stored.remove(PREVIEW);

    let sidecar_dir = dir.join(metadata_dir);
    if !sidecar_dir.exists() {
        fs::create_dir(&sidecar_dir)?;
    }

    let name = OsStr::new(file_name);
    let meta_path = metadata_path(dir, metadata_dir, name);
    write_atomically(dir, &meta_path, stored.to_json_string()?.as_bytes())?;

    let preview = match preview {
        Some(Value::Bytes(bytes)) => {
            let prev_path = preview_path(dir, metadata_dir, name);
            write_atomically(dir, &prev_path, &bytes)?;
            Some(prev_path)
        }
        Some(other) => {
            warn!(file = file_name, kind = ?other, "Ignoring preview that is not binary data");
            None
        }
        None => None,
    };

    debug!(path = %meta_path.display(), "Wrote sidecar metadata");
    Ok(SidecarPaths {
        metadata: meta_path,
        preview,
    })
}

fn write_atomically(temp_dir: &Path, destination: &Path, contents: &[u8]) -> Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(temp_dir)?;
    temp.write_all(contents)?;
    temp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

/// Delete both sidecars of `dir/file_name`, logging failures.
pub fn remove(dir: &Path, file_name: &OsStr, metadata_dir: &str) {
    for path in [
        metadata_path(dir, metadata_dir, file_name),
        preview_path(dir, metadata_dir, file_name),
    ] {
        if !path.exists() {
            continue;
        }
        if let Err(e) = fs::remove_file(&path) {
            error!(path = %path.display(), error = %e, "Could not remove sidecar file");
        }
    }
}

/// Turn a title into a file name FAT media accept.
///
/// Invalid characters become `_`, and the primary extension of the mime
/// type is appended unless the name already ends with it.
pub fn file_name_for(title: &str, mime_type: &str, registry: &dyn MimeRegistry) -> String {
    let mut file_name: String = title
        .chars()
        .map(|c| {
            if INVALID_NAME_CHARS.contains(&c) || (c as u32) < 32 {
                '_'
            } else {
                c
            }
        })
        .collect();

    if let Some(ext) = registry.primary_extension(mime_type).filter(|e| !e.is_empty()) {
        let ext = format!(".{}", ext);
        if !file_name.ends_with(&ext) {
            file_name.push_str(&ext);
        }
    }

    file_name
}

/// Find a name not yet taken in `dir`, appending `_1`, `_2`, ... before
/// the extension.
///
/// Fails with [`JournalError::AlreadyExists`] once the candidates grow past
/// the longest name a device accepts.
pub fn unique_file_name(dir: &Path, file_name: &str) -> Result<String> {
    if !dir.join(file_name).exists() {
        return Ok(file_name.to_string());
    }

    let (stem, ext) = match file_name.rfind('.') {
        Some(i) if i > 0 => file_name.split_at(i),
        _ => (file_name, ""),
    };

    for i in 1u64.. {
        let candidate = format!("{}_{}{}", stem, i, ext);
        if candidate.len() > MAX_FILE_NAME_LEN {
            break;
        }
        if !dir.join(&candidate).exists() {
            return Ok(candidate);
        }
    }

    Err(JournalError::AlreadyExists {
        name: file_name.to_string(),
    })
}

/// Whether `mount_point` still uses the legacy layout and has not been
/// converted yet.
pub fn needs_conversion(mount_point: &Path, storage: &StorageConfig) -> bool {
    mount_point.join(&storage.legacy_store_dir).is_dir()
        && !mount_point.join(&storage.metadata_dir).exists()
}

/// Rewrite legacy `.olpc.store` records into sidecars.
///
/// Each record is a JSON object whose `filename` names a file in the mount
/// point; its preview, if any, is `.olpc.store/preview/<uid>`. Records
/// without a file are skipped. Untitled entries are named "Untitled" and
/// their file renamed to match. Returns the number of converted entries.
pub fn convert_legacy(
    mount_point: &Path,
    storage: &StorageConfig,
    registry: &dyn MimeRegistry,
) -> Result<usize> {
    let legacy_dir = mount_point.join(&storage.legacy_store_dir);
    match fs::create_dir(mount_point.join(&storage.metadata_dir)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }

    let mut converted = 0;
    for dir_entry in fs::read_dir(&legacy_dir)? {
        let record_path = dir_entry?.path();
        if !record_path.is_file() {
            continue;
        }

        let record = match fs::read_to_string(&record_path)
            .map_err(JournalError::from)
            .and_then(|text| Entry::from_json_str(&text))
        {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "Skipping unreadable legacy record");
                continue;
            }
        };

        match convert_record(mount_point, &legacy_dir, record, storage, registry) {
            Ok(true) => converted += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(path = %record_path.display(), error = %e, "Could not convert legacy record")
            }
        }
    }

    info!(mount_point = %mount_point.display(), converted, "Converted legacy journal entries");
    Ok(converted)
}

fn convert_record(
    mount_point: &Path,
    legacy_dir: &Path,
    mut record: Entry,
    storage: &StorageConfig,
    registry: &dyn MimeRegistry,
) -> Result<bool> {
    let uid = record.uid().unwrap_or_default().to_string();
    let Some(mut file_name) = record.get_str("filename").map(str::to_string) else {
        warn!(uid = %uid, "Legacy journal entry has no filename");
        return Ok(false);
    };

    let file_path = mount_point.join(&file_name);
    if !file_path.exists() {
        warn!(uid = %uid, file = %file_path.display(), "Legacy journal entry has no file");
        return Ok(false);
    }

    if record.title().map_or(true, str::is_empty) {
        record.set(TITLE, "Untitled");
        let mime_type = record.mime_type().unwrap_or_default().to_string();
        let wanted = file_name_for("Untitled", &mime_type, registry);
        let new_name = unique_file_name(mount_point, &wanted)?;
        fs::rename(&file_path, mount_point.join(&new_name))?;
        file_name = new_name;
    }

    if !uid.is_empty() {
        let legacy_preview = legacy_dir.join("preview").join(&uid);
        if let Ok(bytes) = fs::read(&legacy_preview) {
            record.set(PREVIEW, Value::Bytes(bytes));
        }
    }
    record.remove("filename");
    if !record.contains(MIME_TYPE) {
        if let Some(mime) = registry.guess(Path::new(&file_name)) {
            record.set(MIME_TYPE, mime);
        }
    }

    write(mount_point, &file_name, &record, &storage.metadata_dir, false)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime::ExtensionRegistry;
    use crate::types::{TIMESTAMP, TITLE};
    use tempfile::TempDir;

    const META: &str = ".Sugar-Metadata";

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let entry = Entry::new()
            .with(TITLE, "notes.txt")
            .with(TIMESTAMP, 1_300_000_000i64)
            .with(UID, "ignored")
            .with(MOUNTPOINT, "/media/usb")
            .with(FILESIZE, 5i64)
            .with(PREVIEW, vec![0x89u8, 0x50, 0x4e, 0x47]);
        let paths = write(dir.path(), "notes.txt", &entry, META, false).unwrap();
        assert!(paths.metadata.ends_with(".Sugar-Metadata/notes.txt.metadata"));
        assert!(paths.preview.is_some());

        let name = OsStr::new("notes.txt");
        let read_back = read(dir.path(), name, META, true).unwrap();
        assert_eq!(read_back.title(), Some("notes.txt"));
        assert_eq!(read_back.timestamp(), Some(1_300_000_000));
        assert_eq!(
            read_back.uid(),
            Some(dir.path().join("notes.txt").to_string_lossy().as_ref())
        );
        assert!(!read_back.contains(MOUNTPOINT));
        assert!(!read_back.contains(FILESIZE));
        assert_eq!(
            read_back.get(PREVIEW).and_then(Value::as_bytes),
            Some(&[0x89u8, 0x50, 0x4e, 0x47][..])
        );

        let without_preview = read(dir.path(), name, META, false).unwrap();
        assert!(!without_preview.contains(PREVIEW));
    }

    #[test]
    fn test_missing_sidecar() {
        let dir = TempDir::new().unwrap();
        assert!(read(dir.path(), OsStr::new("nothing.txt"), META, false).is_none());
    }

    #[test]
    fn test_corrupt_sidecar_is_removed() {
        let dir = TempDir::new().unwrap();
        let name = OsStr::new("broken.txt");
        fs::create_dir(dir.path().join(META)).unwrap();
        fs::write(metadata_path(dir.path(), META, name), "{not json").unwrap();
        fs::write(preview_path(dir.path(), META, name), [1u8, 2, 3]).unwrap();

        assert!(read(dir.path(), name, META, true).is_none());
        assert!(!metadata_path(dir.path(), META, name).exists());
        assert!(!preview_path(dir.path(), META, name).exists());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let entry = Entry::new().with(TITLE, "a").with(PREVIEW, vec![1u8]);
        write(dir.path(), "a.txt", &entry, META, false).unwrap();

        remove(dir.path(), OsStr::new("a.txt"), META);
        assert!(!metadata_path(dir.path(), META, OsStr::new("a.txt")).exists());
        assert!(!preview_path(dir.path(), META, OsStr::new("a.txt")).exists());
    }

    #[test]
    fn test_file_name_for() {
        let registry = ExtensionRegistry::new();
        assert_eq!(file_name_for("My: Drawing?", "image/png", &registry), "My_ Drawing_.png");
        assert_eq!(file_name_for("photo.png", "image/png", &registry), "photo.png");
        assert_eq!(file_name_for("a/b\tc", "application/x-none", &registry), "a_b_c");
    }

    #[test]
    fn test_unique_file_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(unique_file_name(dir.path(), "a.txt").unwrap(), "a.txt");

        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::write(dir.path().join("a_1.txt"), "").unwrap();
        assert_eq!(unique_file_name(dir.path(), "a.txt").unwrap(), "a_2.txt");

        fs::write(dir.path().join("README"), "").unwrap();
        assert_eq!(unique_file_name(dir.path(), "README").unwrap(), "README_1");
    }

    #[test]
    fn test_unique_file_name_exhausted() {
        let dir = TempDir::new().unwrap();
        // 253 characters: only `_1` through `_9` still fit in 255
        let stem = "n".repeat(249);
        let name = format!("{}.txt", stem);
        fs::write(dir.path().join(&name), "").unwrap();
        for i in 1..=9 {
            fs::write(dir.path().join(format!("{}_{}.txt", stem, i)), "").unwrap();
        }

        let err = unique_file_name(dir.path(), &name).unwrap_err();
        assert!(matches!(err, JournalError::AlreadyExists { name: n } if n == name));
        assert!(!dir.path().join(format!("{}_10.txt", stem)).exists());
    }

    #[test]
    fn test_corrupt_metadata_error() {
        let dir = TempDir::new().unwrap();
        let meta = metadata_path(dir.path(), META, OsStr::new("a.txt"));
        fs::create_dir_all(meta.parent().unwrap()).unwrap();
        fs::write(&meta, "{ not json").unwrap();

        match parse_metadata(&meta).unwrap_err() {
            JournalError::CorruptMetadata { path, .. } => assert_eq!(path, meta),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_convert_legacy() {
        let mount = TempDir::new().unwrap();
        let storage = StorageConfig::default();
        let legacy = mount.path().join(&storage.legacy_store_dir);
        fs::create_dir_all(legacy.join("preview")).unwrap();

        fs::write(mount.path().join("essay.odt"), "doc").unwrap();
        fs::write(
            legacy.join("uid-1"),
            r#"{"uid": "uid-1", "filename": "essay.odt", "title": "Essay",
                "mime_type": "application/vnd.oasis.opendocument.text"}"#,
        )
        .unwrap();
        fs::write(legacy.join("preview").join("uid-1"), [7u8, 7]).unwrap();

        fs::write(mount.path().join("blob"), "x").unwrap();
        fs::write(
            legacy.join("uid-2"),
            r#"{"uid": "uid-2", "filename": "blob", "mime_type": "text/plain"}"#,
        )
        .unwrap();

        fs::write(legacy.join("uid-3"), r#"{"uid": "uid-3", "filename": "gone.txt"}"#).unwrap();

        assert!(needs_conversion(mount.path(), &storage));
        let registry = ExtensionRegistry::new();
        let converted = convert_legacy(mount.path(), &storage, &registry).unwrap();
        assert_eq!(converted, 2);
        assert!(!needs_conversion(mount.path(), &storage));

        let essay = read(mount.path(), OsStr::new("essay.odt"), META, true).unwrap();
        assert_eq!(essay.title(), Some("Essay"));
        assert!(!essay.contains("filename"));
        assert_eq!(essay.get(PREVIEW).and_then(Value::as_bytes), Some(&[7u8, 7][..]));

        assert!(!mount.path().join("blob").exists());
        let untitled = read(mount.path(), OsStr::new("Untitled.txt"), META, false).unwrap();
        assert_eq!(untitled.title(), Some("Untitled"));
    }
}
