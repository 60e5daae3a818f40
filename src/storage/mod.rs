//! Live-state collaborators for the backup core
//!
//! The application owns its structured-data store and its binary file root.
//! The backup core only reaches them through the two traits below, so the
//! hosting application can plug in its own persistence layer.

pub mod file_io;
pub mod file_root;
pub mod records;

use std::path::{Path, PathBuf};

use crate::error::VaultResult;

pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
pub use file_root::DirectoryFileRoot;
pub use records::{JsonDataStore, RecordSet};

/// Structured-data store (the relational side of live state)
pub trait DataStore: Send + Sync {
    /// Serialize every record as one consistent point-in-time snapshot
    fn export_all(&self) -> VaultResult<Vec<u8>>;

    /// Replace every record with the contents of `snapshot`
    ///
    /// Implementations must leave the store unchanged when this fails.
    fn import_all(&self, snapshot: &[u8]) -> VaultResult<()>;
}

/// Binary file root (the uploads side of live state)
pub trait FileRoot: Send + Sync {
    /// Directory holding the live files
    fn root(&self) -> &Path;

    /// Regular files under the root, as relative paths
    fn list_files(&self) -> VaultResult<Vec<PathBuf>>;

    /// Directories under the root, as relative paths
    ///
    /// Archived alongside the files so empty directories come back on restore.
    fn list_dirs(&self) -> VaultResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Replace the whole root with the tree at `staged`
    ///
    /// Implementations must leave the previous tree in place when this fails.
    fn replace_with(&self, staged: &Path) -> VaultResult<()>;
}
