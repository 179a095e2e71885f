//! Filesystem seam for the media cache.
//!
//! [`MediaStorage`] exposes the few operations the read-through cache needs so
//! write failures can be simulated in tests. [`persist_atomically`] writes to a
//! sibling temp file and renames it into place; a failed write never leaves a
//! file at the final path.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait MediaStorage: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create `path` (which must not exist), write `data` and flush it to disk.
    /// The handle is closed before returning, on success and on failure.
    fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// [`MediaStorage`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl MediaStorage for LocalStorage {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut file = File::options().write(true).create_new(true).open(path)?;
        file.write_all(data)?;
        file.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(
        ".{file_name}.{}.tmp",
        uuid::Uuid::new_v4().simple()
    ))
}

/// Write `data` to `target` through a uniquely named temp file.
///
/// Concurrent writers of the same target each use their own temp file, so the
/// last rename wins with a complete file.
pub fn persist_atomically(
    storage: &dyn MediaStorage,
    target: &Path,
    data: &[u8],
) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            storage.create_dir_all(parent)?;
        }
    }

    let temp = temp_path_for(target);
    let result = storage
        .write_new(&temp, data)
        .and_then(|()| storage.rename(&temp, target));

    if result.is_err() && storage.exists(&temp) {
        if let Err(e) = storage.remove_file(&temp) {
            log::warn!("failed to remove temp file {}: {}", temp.display(), e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Writes half the data, then fails like a full disk.
    struct DiskFullStorage {
        wrote_partial: AtomicBool,
    }

    impl MediaStorage for DiskFullStorage {
        fn exists(&self, path: &Path) -> bool {
            LocalStorage.exists(path)
        }

        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            LocalStorage.create_dir_all(path)
        }

        fn write_new(&self, path: &Path, data: &[u8]) -> io::Result<()> {
            let mut file = File::options().write(true).create_new(true).open(path)?;
            file.write_all(&data[..data.len() / 2])?;
            self.wrote_partial.store(true, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            LocalStorage.rename(from, to)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            LocalStorage.remove_file(path)
        }
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[test]
    fn test_persist_writes_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("MEDIA.jpg");

        persist_atomically(&LocalStorage, &target, b"image-bytes").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"image-bytes");
        assert_eq!(entries(dir.path()), vec![target]);
    }

    #[test]
    fn test_persist_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("cache").join("M.amr");

        persist_atomically(&LocalStorage, &target, b"voice").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"voice");
    }

    #[test]
    fn test_persist_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("M.txt");
        fs::write(&target, b"old").unwrap();

        persist_atomically(&LocalStorage, &target, b"new").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_failed_write_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("M.mp4");
        let storage = DiskFullStorage {
            wrote_partial: AtomicBool::new(false),
        };

        let err = persist_atomically(&storage, &target, b"0123456789").unwrap_err();

        assert_eq!(err.to_string(), "no space left on device");
        assert!(storage.wrote_partial.load(Ordering::SeqCst));
        assert!(!target.exists());
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("M.mp4");
        fs::write(&target, b"previous").unwrap();
        let storage = DiskFullStorage {
            wrote_partial: AtomicBool::new(false),
        };

        assert!(persist_atomically(&storage, &target, b"0123456789").is_err());

        assert_eq!(fs::read(&target).unwrap(), b"previous");
        assert_eq!(entries(dir.path()), vec![target]);
    }
}
