// src/store/local.rs

//! Store mirrored on a local filesystem

use super::{DirEntry, DirectoryLister, EntryType};
use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Pointer files larger than this are not pointers
const MAX_POINTER_SIZE: u64 = 4096;

/// Lists and reads a store rooted at a local directory
///
/// Pointer entries may be real symlinks (their target is the pointer
/// content) or small text files holding the relative path.
#[derive(Debug, Clone)]
pub struct LocalLister {
    root: PathBuf,
}

impl LocalLister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_matches('/'))
    }
}

impl DirectoryLister for LocalLister {
    fn list(&self, path: &str) -> Vec<DirEntry> {
        let dir = self.resolve(path);
        let Ok(entries) = fs::read_dir(&dir) else {
            debug!("{} not found", dir.display());
            return Vec::new();
        };

        let mut listing: Vec<DirEntry> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let path = entry.path();
                let entry_type = if path.is_dir() {
                    EntryType::Directory
                } else if path.symlink_metadata().is_ok() {
                    EntryType::File
                } else {
                    EntryType::Other
                };
                DirEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    entry_type,
                }
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        listing
    }

    fn read(&self, path: &str) -> Result<String> {
        let file = self.resolve(path);
        let meta = fs::symlink_metadata(&file)
            .map_err(|_| Error::NotFoundError(format!("{} does not exist", file.display())))?;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(&file)?;
            return Ok(target.to_string_lossy().into_owned());
        }
        if meta.len() > MAX_POINTER_SIZE {
            return Err(Error::ParseError(format!(
                "{} is {} bytes, too large for a pointer",
                file.display(),
                meta.len()
            )));
        }
        Ok(fs::read_to_string(&file)?)
    }

    fn url(&self, path: &str) -> String {
        format!("file://{}", self.resolve(path).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let pkg = tmp.path().join("TARS/el9/zlib");
        fs::create_dir_all(&pkg).unwrap();
        fs::create_dir_all(tmp.path().join("TARS/el9/store/zl")).unwrap();
        fs::write(tmp.path().join("TARS/el9/store/zl/zlib-v1-1.el9.tar.gz"), b"tarball").unwrap();
        std::os::unix::fs::symlink(
            "../store/zl/zlib-v1-1.el9.tar.gz",
            pkg.join("zlib-v1-1.el9.tar.gz"),
        )
        .unwrap();
        fs::write(pkg.join("zlib-v1-2.el9.tar.gz"), "../store/zl/zlib-v1-2.el9.tar.gz\n").unwrap();
        tmp
    }

    #[test]
    fn test_list() {
        let tmp = store();
        let lister = LocalLister::new(tmp.path());
        assert_eq!(
            lister.list("TARS/el9"),
            vec![DirEntry::directory("store"), DirEntry::directory("zlib")]
        );
        assert_eq!(
            lister.list("/TARS/el9/zlib/"),
            vec![DirEntry::file("zlib-v1-1.el9.tar.gz"), DirEntry::file("zlib-v1-2.el9.tar.gz")]
        );
        assert!(lister.list("TARS/missing").is_empty());
    }

    #[test]
    fn test_read_symlink_and_file() {
        let tmp = store();
        let lister = LocalLister::new(tmp.path());
        assert_eq!(
            lister.read("TARS/el9/zlib/zlib-v1-1.el9.tar.gz").unwrap(),
            "../store/zl/zlib-v1-1.el9.tar.gz"
        );
        assert_eq!(
            lister.read("TARS/el9/zlib/zlib-v1-2.el9.tar.gz").unwrap().trim(),
            "../store/zl/zlib-v1-2.el9.tar.gz"
        );
        assert!(matches!(lister.read("TARS/nope"), Err(Error::NotFoundError(_))));
    }

    #[test]
    fn test_url() {
        let lister = LocalLister::new("/srv/store");
        assert_eq!(lister.url("TARS/el9/x"), "file:///srv/store/TARS/el9/x");
    }
}
