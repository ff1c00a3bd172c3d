//! Filesystem image store.
//!
//! Disk layout: `root / owner / folder_key / filename.ext`
//! URL  layout: `/static/uploads / owner / folder_key / filename.ext`
//!
//! The leaf filename doubles as the public locator path component, so stored
//! names are never rewritten. A same-named file already present at a
//! destination is trusted as identical and the write is skipped.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct ImageStore {
    root: PathBuf,
    extensions: Vec<String>,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the filename carries one of the configured image extensions.
    pub fn is_allowed(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            _ => false,
        }
    }

    /// Absolute disk path for a group's storage location. Created on demand.
    pub fn group_dir(&self, owner: &str, folder_key: &str) -> Result<PathBuf> {
        let path = self.root.join(owner).join(folder_key);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create group dir {}", path.display()))?;
        Ok(path)
    }

    pub fn file_path(&self, owner: &str, folder_key: &str, filename: &str) -> PathBuf {
        self.root.join(owner).join(folder_key).join(filename)
    }

    /// Browser URL for a stored image, served by the static file handler.
    pub fn locator(&self, owner: &str, folder_key: &str, filename: &str) -> String {
        format!("/static/uploads/{}/{}/{}", owner, folder_key, filename)
    }

    /// Write image bytes into a group's storage location. Returns false and
    /// leaves the existing file untouched when a same-named file is already
    /// there (filename dedup, not content-hash dedup).
    pub fn put(&self, owner: &str, folder_key: &str, filename: &str, bytes: &[u8]) -> Result<bool> {
        let dir = self.group_dir(owner, folder_key)?;
        let dest = dir.join(filename);
        if dest.exists() {
            return Ok(false);
        }
        std::fs::write(&dest, bytes)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(true)
    }

    /// Copy a file between two groups of the same owner, skipping when the
    /// destination name is taken. The source is left untouched.
    pub fn copy_between(
        &self,
        owner: &str,
        src_key: &str,
        dest_key: &str,
        filename: &str,
    ) -> Result<bool> {
        let src = self.file_path(owner, src_key, filename);
        let dir = self.group_dir(owner, dest_key)?;
        let dest = dir.join(filename);
        if dest.exists() {
            return Ok(false);
        }
        std::fs::copy(&src, &dest)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
        Ok(true)
    }

    /// Sorted image filenames inside a group's storage location. A missing
    /// directory is an empty listing, not an error.
    pub fn list(&self, owner: &str, folder_key: &str) -> Vec<String> {
        let dir = self.root.join(owner).join(folder_key);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| self.is_allowed(name))
            .collect();
        names.sort();
        names
    }

    /// Delete a single stored file. Returns false when it was not there.
    pub fn delete(&self, owner: &str, folder_key: &str, filename: &str) -> Result<bool> {
        let path = self.file_path(owner, folder_key, filename);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete {}", path.display()))?;
        Ok(true)
    }

    /// Recursively remove a group's storage location. Missing is fine.
    pub fn delete_group(&self, owner: &str, folder_key: &str) -> Result<()> {
        let dir = self.root.join(owner).join(folder_key);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove group dir {}", dir.display()))
            }
        }
    }

    /// Last-modified time of a stored file, UNIX epoch on any failure.
    pub fn modified_at(&self, owner: &str, folder_key: &str, filename: &str) -> SystemTime {
        self.file_path(owner, folder_key, filename)
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(tmp: &TempDir) -> ImageStore {
        ImageStore::new(
            tmp.path(),
            vec!["jpg".to_string(), "png".to_string()],
        )
    }

    #[test]
    fn test_is_allowed() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        assert!(store.is_allowed("a.jpg"));
        assert!(store.is_allowed("a.JPG"));
        assert!(!store.is_allowed("a.txt"));
        assert!(!store.is_allowed("noext"));
        assert!(!store.is_allowed(".jpg"));
    }

    #[test]
    fn test_put_dedups_by_filename() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        assert!(store.put("u1", "beach", "a.jpg", b"original").unwrap());
        assert!(!store.put("u1", "beach", "a.jpg", b"different").unwrap());

        // First write wins
        let bytes = std::fs::read(store.file_path("u1", "beach", "a.jpg")).unwrap();
        assert_eq!(bytes, b"original");
        assert_eq!(store.list("u1", "beach"), vec!["a.jpg"]);
    }

    #[test]
    fn test_list_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.put("u1", "beach", "b.jpg", b"x").unwrap();
        store.put("u1", "beach", "a.png", b"x").unwrap();
        store.put("u1", "beach", "notes.txt", b"x").unwrap();

        assert_eq!(store.list("u1", "beach"), vec!["a.png", "b.jpg"]);
        assert!(store.list("u1", "missing").is_empty());
    }

    #[test]
    fn test_delete_and_delete_group() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.put("u1", "beach", "a.jpg", b"x").unwrap();

        assert!(store.delete("u1", "beach", "a.jpg").unwrap());
        assert!(!store.delete("u1", "beach", "a.jpg").unwrap());

        store.put("u1", "beach", "b.jpg", b"x").unwrap();
        store.delete_group("u1", "beach").unwrap();
        assert!(store.list("u1", "beach").is_empty());
        // Removing an already-missing group is not an error
        store.delete_group("u1", "beach").unwrap();
    }

    #[test]
    fn test_copy_between_groups() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        store.put("u1", "src", "a.jpg", b"payload").unwrap();

        assert!(store.copy_between("u1", "src", "dest", "a.jpg").unwrap());
        assert!(!store.copy_between("u1", "src", "dest", "a.jpg").unwrap());
        assert_eq!(store.list("u1", "src"), vec!["a.jpg"]);
        assert_eq!(store.list("u1", "dest"), vec!["a.jpg"]);
    }

    #[test]
    fn test_locator_is_stable() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        assert_eq!(
            store.locator("u1", "beach", "a.jpg"),
            "/static/uploads/u1/beach/a.jpg"
        );
    }
}
