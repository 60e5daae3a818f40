//! Directory-backed binary file root
//!
//! Uploaded files (logos, photos, attachments) live under one directory.
//! Replacement swaps the whole tree: the new tree is copied next to the
//! live one, the live tree is renamed aside, the new tree is renamed into
//! place, and only then is the old tree deleted.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

use super::FileRoot;

/// File root stored as a plain directory tree
#[derive(Debug, Clone)]
pub struct DirectoryFileRoot {
    root: PathBuf,
}

impl DirectoryFileRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn sibling(&self, tag: &str) -> VaultResult<PathBuf> {
        let name = self
            .root
            .file_name()
            .ok_or_else(|| {
                VaultError::Storage(format!("File root has no name: {}", self.root.display()))
            })?
            .to_string_lossy()
            .to_string();
        Ok(self
            .root
            .with_file_name(format!(".{}.{}-{}", name, tag, Uuid::new_v4().simple())))
    }
}

impl FileRoot for DirectoryFileRoot {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_files(&self) -> VaultResult<Vec<PathBuf>> {
        list_relative_files(&self.root)
    }

    fn list_dirs(&self) -> VaultResult<Vec<PathBuf>> {
        list_relative_dirs(&self.root)
    }

    fn replace_with(&self, staged: &Path) -> VaultResult<()> {
        if let Some(parent) = self.root.parent() {
            fs::create_dir_all(parent)?;
        }

        let incoming = self.sibling("incoming")?;
        if let Err(e) = copy_tree(staged, &incoming) {
            let _ = fs::remove_dir_all(&incoming);
            return Err(e);
        }

        let previous = if self.root.exists() {
            let previous = self.sibling("previous")?;
            if let Err(e) = fs::rename(&self.root, &previous) {
                let _ = fs::remove_dir_all(&incoming);
                return Err(VaultError::Storage(format!(
                    "Failed to move current file root aside: {}",
                    e
                )));
            }
            Some(previous)
        } else {
            None
        };

        if let Err(e) = fs::rename(&incoming, &self.root) {
            if let Some(previous) = &previous {
                if let Err(restore_err) = fs::rename(previous, &self.root) {
                    warn!(
                        error = %restore_err,
                        previous = %previous.display(),
                        "could not put previous file root back"
                    );
                }
            }
            let _ = fs::remove_dir_all(&incoming);
            return Err(VaultError::Storage(format!(
                "Failed to move restored files into place: {}",
                e
            )));
        }

        if let Some(previous) = previous {
            if let Err(e) = fs::remove_dir_all(&previous) {
                warn!(error = %e, path = %previous.display(), "failed to remove old file root");
            }
        }

        debug!(root = %self.root.display(), "file root replaced");
        Ok(())
    }
}

/// Regular files under `root`, as sorted relative paths
///
/// Symlinks are not followed and not listed.
pub fn list_relative_files(root: &Path) -> VaultResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry
            .map_err(|e| VaultError::Storage(format!("Failed to walk {}: {}", root.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| VaultError::Storage(format!("Unexpected path outside root: {}", e)))?;
        files.push(relative.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Directories under `root` (excluding `root` itself), as sorted relative paths
pub fn list_relative_dirs(root: &Path) -> VaultResult<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry
            .map_err(|e| VaultError::Storage(format!("Failed to walk {}: {}", root.display(), e)))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| VaultError::Storage(format!("Unexpected path outside root: {}", e)))?;
        dirs.push(relative.to_path_buf());
    }

    dirs.sort();
    Ok(dirs)
}

/// Copy a directory tree (regular files and directories only)
pub fn copy_tree(from: &Path, to: &Path) -> VaultResult<()> {
    fs::create_dir_all(to)?;

    for entry in WalkDir::new(from).follow_links(false).min_depth(1) {
        let entry = entry
            .map_err(|e| VaultError::Storage(format!("Failed to walk {}: {}", from.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| VaultError::Storage(format!("Unexpected path outside root: {}", e)))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                VaultError::Storage(format!("Failed to copy {}: {}", relative.display(), e))
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_list_files_nested_and_sorted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("uploads");
        write(&root.join("logo.png"), b"0123456789");
        write(&root.join("students/1/photo.jpg"), b"jpg");

        let files = DirectoryFileRoot::new(root).list_files().unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("logo.png"),
                PathBuf::from("students/1/photo.jpg")
            ]
        );
    }

    #[test]
    fn test_list_dirs_includes_empty_ones() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("uploads");
        write(&root.join("students/1/photo.jpg"), b"jpg");
        fs::create_dir_all(root.join("archive/2023")).unwrap();

        let dirs = DirectoryFileRoot::new(root).list_dirs().unwrap();
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("archive"),
                PathBuf::from("archive/2023"),
                PathBuf::from("students"),
                PathBuf::from("students/1"),
            ]
        );
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let root = DirectoryFileRoot::new(temp.path().join("nope"));
        assert!(root.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_replace_swaps_whole_tree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("uploads");
        write(&root.join("old.txt"), b"old");

        let staged = temp.path().join("staged");
        write(&staged.join("new/a.bin"), b"new");

        let file_root = DirectoryFileRoot::new(root.clone());
        file_root.replace_with(&staged).unwrap();

        assert!(!root.join("old.txt").exists());
        assert_eq!(fs::read(root.join("new/a.bin")).unwrap(), b"new");

        // Only the live root remains next to the staged tree
        let mut names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["staged", "uploads"]);
    }

    #[test]
    fn test_replace_missing_staged_keeps_live_tree() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("uploads");
        write(&root.join("keep.txt"), b"keep");

        let file_root = DirectoryFileRoot::new(root.clone());
        assert!(file_root
            .replace_with(&temp.path().join("does-not-exist"))
            .is_err());
        assert_eq!(fs::read(root.join("keep.txt")).unwrap(), b"keep");
    }
}
