//! Archive container for backups
//!
//! A backup archive is a gzip-compressed tar with a fixed layout:
//!
//! - `metadata.json`: context metadata ([`ArchiveMetadata`])
//! - `data/export.json`: the structured-data export
//! - `files/<relative path>`: every file and directory under the binary
//!   file root
//!
//! Extraction never trusts entry names. Absolute paths, `..` components,
//! drive prefixes and link entries are refused before anything is written.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::storage::FileRoot;

/// Archive entry holding the context metadata
pub const METADATA_ENTRY: &str = "metadata.json";

/// Archive entry holding the structured-data export
pub const DATA_EXPORT_ENTRY: &str = "data/export.json";

/// Directory prefix for binary files
pub const FILES_PREFIX: &str = "files";

/// Version of the in-archive layout
pub const ARCHIVE_FORMAT_VERSION: &str = "rollcall-archive/1";

const ARCHIVE_FILE_NAME: &str = "archive.tar.gz";

/// Context metadata stored inside the archive
///
/// Covered by the digest and the authentication code, so it may be trusted
/// once a restore has verified both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Layout version, always [`ARCHIVE_FORMAT_VERSION`] when written
    pub format_version: String,
    /// Institution the data belongs to
    pub institution_name: String,
    /// When the archive was built
    pub created_at: DateTime<Utc>,
    /// Version of the application that built it
    pub app_version: String,
    /// Number of entries under `files/`
    pub file_count: usize,
    /// Byte length of `data/export.json`
    pub export_size: u64,
    /// Caller-supplied key/value pairs
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ArchiveMetadata {
    /// Metadata for a new archive; counts are filled in by [`build_archive`]
    pub fn new(institution_name: impl Into<String>) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION.to_string(),
            institution_name: institution_name.into(),
            created_at: Utc::now(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            file_count: 0,
            export_size: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Attach caller-supplied key/value pairs
    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }
}

/// Result of building an archive
#[derive(Debug)]
pub struct BuiltArchive {
    /// Compressed archive bytes
    pub bytes: Vec<u8>,
    /// Metadata as written into the archive
    pub metadata: ArchiveMetadata,
}

/// Contents of an extracted archive
#[derive(Debug)]
pub struct ExtractedArchive {
    /// Raw structured-data export
    pub data_export: Vec<u8>,
    /// Directory holding the extracted file tree
    pub files_dir: PathBuf,
    /// Parsed context metadata (not yet validated against the contents)
    pub metadata: ArchiveMetadata,
    /// Number of regular files extracted under `files_dir`
    pub file_count: usize,
}

/// Build an archive from a data export and a file root
///
/// The archive is streamed into a file inside `work_dir` and read back;
/// the file goes away with the work directory.
pub fn build_archive(
    export: &[u8],
    file_root: &dyn FileRoot,
    metadata: ArchiveMetadata,
    level: u32,
    work_dir: &Path,
) -> VaultResult<BuiltArchive> {
    let files = file_root.list_files()?;
    let dirs = file_root.list_dirs()?;
    let metadata = ArchiveMetadata {
        file_count: files.len(),
        export_size: export.len() as u64,
        ..metadata
    };
    let metadata_json = serde_json::to_vec_pretty(&metadata)?;
    let mtime = metadata.created_at.timestamp().max(0) as u64;

    let archive_path = work_dir.join(ARCHIVE_FILE_NAME);
    let file = File::create(&archive_path)
        .map_err(|e| VaultError::Io(format!("Failed to create archive file: {}", e)))?;
    let encoder = GzEncoder::new(file, Compression::new(level.min(9)));
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    append_bytes(&mut builder, METADATA_ENTRY, &metadata_json, mtime)?;
    append_bytes(&mut builder, DATA_EXPORT_ENTRY, export, mtime)?;

    for relative in &dirs {
        let source = file_root.root().join(relative);
        let name = Path::new(FILES_PREFIX).join(relative);
        builder.append_dir(&name, &source).map_err(|e| {
            VaultError::Storage(format!("Failed to archive {}: {}", relative.display(), e))
        })?;
    }

    for relative in &files {
        let source = file_root.root().join(relative);
        let name = Path::new(FILES_PREFIX).join(relative);
        builder.append_path_with_name(&source, &name).map_err(|e| {
            VaultError::Storage(format!("Failed to archive {}: {}", relative.display(), e))
        })?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| VaultError::Io(format!("Failed to finalize tar archive: {}", e)))?;
    let file = encoder
        .finish()
        .map_err(|e| VaultError::Io(format!("Failed to finalize compression: {}", e)))?;
    file.sync_all()?;
    drop(file);

    let bytes = fs::read(&archive_path)?;
    debug!(
        files = metadata.file_count,
        dirs = dirs.len(),
        export_size = metadata.export_size,
        archive_size = bytes.len(),
        "archive built"
    );

    Ok(BuiltArchive { bytes, metadata })
}

fn append_bytes<W: io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    bytes: &[u8],
    mtime: u64,
) -> VaultResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_entry_type(tar::EntryType::Regular);
    builder
        .append_data(&mut header, name, bytes)
        .map_err(|e| VaultError::Io(format!("Failed to write {}: {}", name, e)))
}

/// Where an archive entry belongs
enum EntryKind {
    Metadata,
    DataExport,
    File(PathBuf),
    Directory(Option<PathBuf>),
}

/// Check that an entry name is a plain relative path
fn validate_entry_path(path: &Path, raw: &str) -> VaultResult<Vec<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(VaultError::PathTraversal {
                    entry: raw.to_string(),
                })
            }
        }
    }
    // Windows separators and drive letters are not path components on unix
    let drive_letter = parts.first().map_or(false, |p| {
        let b = p.as_bytes();
        b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
    });
    if raw.contains('\\') || drive_letter {
        return Err(VaultError::PathTraversal {
            entry: raw.to_string(),
        });
    }
    if parts.is_empty() {
        return Err(VaultError::MalformedArchive(format!(
            "Archive entry with empty name: {:?}",
            raw
        )));
    }
    Ok(parts)
}

fn classify(parts: &[String], is_dir: bool, raw: &str) -> VaultResult<EntryKind> {
    let first = parts[0].as_str();
    match (first, parts.len(), is_dir) {
        (METADATA_ENTRY, 1, false) => Ok(EntryKind::Metadata),
        ("data", 2, false) if parts[1] == "export.json" => Ok(EntryKind::DataExport),
        ("data", 1, true) | (FILES_PREFIX, 1, true) => Ok(EntryKind::Directory(None)),
        (FILES_PREFIX, n, _) if n > 1 => {
            let relative: PathBuf = parts[1..].iter().collect();
            if is_dir {
                Ok(EntryKind::Directory(Some(relative)))
            } else {
                Ok(EntryKind::File(relative))
            }
        }
        _ => Err(VaultError::MalformedArchive(format!(
            "Unexpected archive entry: {}",
            raw
        ))),
    }
}

/// Extract an archive into `dest`
///
/// `dest` must be a fresh directory owned by this invocation.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> VaultResult<ExtractedArchive> {
    let files_dir = dest.join(FILES_PREFIX);
    fs::create_dir_all(&files_dir)?;

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|e| VaultError::MalformedArchive(format!("Unreadable archive: {}", e)))?;

    let mut metadata_bytes: Option<Vec<u8>> = None;
    let mut data_export: Option<Vec<u8>> = None;
    let mut file_count = 0usize;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| VaultError::MalformedArchive(format!("Unreadable archive entry: {}", e)))?;

        let raw = String::from_utf8_lossy(&entry.path_bytes()).to_string();
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(VaultError::PathTraversal { entry: raw });
        }

        let path = entry
            .path()
            .map_err(|e| VaultError::MalformedArchive(format!("Bad entry name {}: {}", raw, e)))?
            .into_owned();
        let parts = validate_entry_path(&path, &raw)?;

        let is_dir = entry_type.is_dir();
        if !is_dir && !entry_type.is_file() {
            return Err(VaultError::MalformedArchive(format!(
                "Unsupported entry type for {}",
                raw
            )));
        }

        match classify(&parts, is_dir, &raw)? {
            EntryKind::Metadata => {
                if metadata_bytes.is_some() {
                    return Err(VaultError::MalformedArchive(
                        "Archive holds more than one metadata entry".into(),
                    ));
                }
                metadata_bytes = Some(read_entry(&mut entry, &raw)?);
            }
            EntryKind::DataExport => {
                if data_export.is_some() {
                    return Err(VaultError::MalformedArchive(
                        "Archive holds more than one data export".into(),
                    ));
                }
                data_export = Some(read_entry(&mut entry, &raw)?);
            }
            EntryKind::Directory(None) => {}
            EntryKind::Directory(Some(relative)) => {
                let target = files_dir.join(&relative);
                if !target.starts_with(&files_dir) {
                    return Err(VaultError::PathTraversal { entry: raw });
                }
                fs::create_dir_all(&target).map_err(|e| unwritable_entry(&raw, e))?;
            }
            EntryKind::File(relative) => {
                let target = files_dir.join(&relative);
                if !target.starts_with(&files_dir) {
                    return Err(VaultError::PathTraversal { entry: raw });
                }
                if target.exists() {
                    return Err(VaultError::MalformedArchive(format!(
                        "Duplicate archive entry: {}",
                        raw
                    )));
                }
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| unwritable_entry(&raw, e))?;
                }
                let mut out = File::create(&target).map_err(|e| unwritable_entry(&raw, e))?;
                io::copy(&mut entry, &mut out).map_err(|e| {
                    VaultError::MalformedArchive(format!("Failed to extract {}: {}", raw, e))
                })?;
                file_count += 1;
            }
        }
    }

    let metadata_bytes = metadata_bytes
        .ok_or_else(|| VaultError::MalformedArchive(format!("Missing {}", METADATA_ENTRY)))?;
    let data_export = data_export
        .ok_or_else(|| VaultError::MalformedArchive(format!("Missing {}", DATA_EXPORT_ENTRY)))?;
    let metadata: ArchiveMetadata = serde_json::from_slice(&metadata_bytes)
        .map_err(|e| VaultError::MalformedArchive(format!("Unparsable metadata: {}", e)))?;

    debug!(files = file_count, export_size = data_export.len(), "archive extracted");

    Ok(ExtractedArchive {
        data_export,
        files_dir,
        metadata,
        file_count,
    })
}

// Entries that collide with each other (a file where a directory is
// expected, or the reverse) fail here
fn unwritable_entry(raw: &str, e: io::Error) -> VaultError {
    VaultError::MalformedArchive(format!("Cannot extract {}: {}", raw, e))
}

fn read_entry<R: Read>(entry: &mut R, raw: &str) -> VaultResult<Vec<u8>> {
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| VaultError::MalformedArchive(format!("Failed to read {}: {}", raw, e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DirectoryFileRoot;
    use tempfile::TempDir;

    fn sample_root(temp: &TempDir) -> DirectoryFileRoot {
        let root = temp.path().join("uploads");
        fs::create_dir_all(root.join("students/7")).unwrap();
        fs::write(root.join("logo.png"), b"0123456789").unwrap();
        fs::write(root.join("students/7/photo.jpg"), b"jpeg-bytes").unwrap();
        DirectoryFileRoot::new(root)
    }

    // Header names are written by hand because tar::Header::set_path
    // refuses `..` and absolute paths
    fn raw_archive(entries: Vec<(&str, tar::EntryType, Vec<u8>)>) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, kind, data) in entries {
            let mut header = tar::Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(kind);
            header.set_cksum();
            builder.append(&header, data.as_slice()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn metadata_json() -> Vec<u8> {
        serde_json::to_vec(&ArchiveMetadata::new("Test School")).unwrap()
    }

    #[test]
    fn test_build_and_extract() {
        let temp = TempDir::new().unwrap();
        let root = sample_root(&temp);
        let work = TempDir::new().unwrap();

        let built = build_archive(
            br#"{"tables":{}}"#,
            &root,
            ArchiveMetadata::new("Test School"),
            9,
            work.path(),
        )
        .unwrap();
        assert_eq!(built.metadata.file_count, 2);
        assert_eq!(built.metadata.export_size, 13);

        let dest = TempDir::new().unwrap();
        let extracted = extract_archive(&built.bytes, dest.path()).unwrap();
        assert_eq!(extracted.data_export, br#"{"tables":{}}"#);
        assert_eq!(extracted.file_count, 2);
        assert_eq!(extracted.metadata, built.metadata);
        assert_eq!(
            fs::read(extracted.files_dir.join("logo.png")).unwrap(),
            b"0123456789"
        );
        assert_eq!(
            fs::read(extracted.files_dir.join("students/7/photo.jpg")).unwrap(),
            b"jpeg-bytes"
        );
    }

    #[test]
    fn test_empty_directories_kept() {
        let temp = TempDir::new().unwrap();
        let root = sample_root(&temp);
        fs::create_dir_all(temp.path().join("uploads/empty_dir")).unwrap();
        let work = TempDir::new().unwrap();

        let built = build_archive(b"{}", &root, ArchiveMetadata::new("S"), 6, work.path()).unwrap();
        assert_eq!(built.metadata.file_count, 2);

        let dest = TempDir::new().unwrap();
        let extracted = extract_archive(&built.bytes, dest.path()).unwrap();
        assert_eq!(extracted.file_count, 2);
        assert!(extracted.files_dir.join("empty_dir").is_dir());
    }

    #[test]
    fn test_file_then_nested_file_is_malformed() {
        let bytes = raw_archive(vec![
            ("metadata.json", tar::EntryType::Regular, metadata_json()),
            ("data/export.json", tar::EntryType::Regular, b"{}".to_vec()),
            ("files/a", tar::EntryType::Regular, b"x".to_vec()),
            ("files/a/b", tar::EntryType::Regular, b"y".to_vec()),
        ]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_empty_file_root() {
        let temp = TempDir::new().unwrap();
        let root = DirectoryFileRoot::new(temp.path().join("missing"));
        let work = TempDir::new().unwrap();

        let built = build_archive(b"{}", &root, ArchiveMetadata::new("S"), 1, work.path()).unwrap();
        let dest = TempDir::new().unwrap();
        let extracted = extract_archive(&built.bytes, dest.path()).unwrap();
        assert_eq!(extracted.file_count, 0);
    }

    #[test]
    fn test_rejects_parent_dir_entry() {
        let bytes = raw_archive(vec![
            ("metadata.json", tar::EntryType::Regular, metadata_json()),
            ("../../etc/passwd", tar::EntryType::Regular, b"root:x:0:0".to_vec()),
        ]);
        let dest = TempDir::new().unwrap();
        let err = extract_archive(&bytes, &dest.path().join("x")).unwrap_err();
        assert!(matches!(err, VaultError::PathTraversal { .. }));
        assert!(!dest.path().join("etc").exists());
    }

    #[test]
    fn test_rejects_absolute_entry() {
        let bytes = raw_archive(vec![("/tmp/evil", tar::EntryType::Regular, b"x".to_vec())]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_rejects_nested_traversal_under_files() {
        let bytes = raw_archive(vec![("files/a/../../../x", tar::EntryType::Regular, b"x".to_vec())]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_rejects_symlink_entry() {
        let bytes = raw_archive(vec![("files/link", tar::EntryType::Symlink, b"".to_vec())]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_missing_export_is_malformed() {
        let bytes = raw_archive(vec![("metadata.json", tar::EntryType::Regular, metadata_json())]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_unknown_entry_is_malformed() {
        let bytes = raw_archive(vec![("secrets.txt", tar::EntryType::Regular, b"x".to_vec())]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_bad_metadata_is_malformed() {
        let bytes = raw_archive(vec![
            ("metadata.json", tar::EntryType::Regular, b"not json".to_vec()),
            ("data/export.json", tar::EntryType::Regular, b"{}".to_vec()),
        ]);
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(&bytes, dest.path()),
            Err(VaultError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let dest = TempDir::new().unwrap();
        assert!(matches!(
            extract_archive(b"definitely not gzip", dest.path()),
            Err(VaultError::MalformedArchive(_))
        ));
    }
}
