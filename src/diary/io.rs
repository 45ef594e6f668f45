//! File IO primitives for the on-disk stores.
//!
//! - Restrictive permissions (0600) on every record and lock file.
//! - One advisory `flock` per directory: shared for reads, exclusive for
//!   writes and removals.
//! - Crash-safe writes via the write-temp, fsync, atomic-rename pattern.
//!
//! Bytes in, bytes out. Record encoding belongs to `format`.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

const LOCK_FILE_NAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held for as long as the directory must not change underneath the caller.
#[derive(Debug)]
pub struct DirLock {
    #[allow(dead_code)]
    file: File,
}

impl DirLock {
    pub fn acquire(dir: &Path, mode: LockMode) -> Result<Self, IoError> {
        fs::create_dir_all(dir)?;
        let lock_path = lock_path_for_dir(dir);

        #[cfg(unix)]
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(&lock_path)?;

        #[cfg(not(unix))]
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        set_permissions_0600(&lock_path)?;
        lock_file(&file, mode)?;
        Ok(Self { file })
    }
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported platform for file locking")]
    UnsupportedPlatform,

    #[error("failed to acquire file lock")]
    LockFailed,

    #[error("path has no parent directory")]
    NoParentDir,
}

pub fn lock_path_for_dir(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE_NAME)
}

/// Read a file, returning `None` if it does not exist. The caller holds the lock.
pub fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>, IoError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

/// Replace `path` with `bytes` atomically. The caller holds the exclusive lock.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    let dir = path.parent().ok_or(IoError::NoParentDir)?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

    tmp.as_file_mut().write_all(bytes)?;
    tmp.as_file_mut().sync_all()?;

    #[cfg(unix)]
    tmp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))?;

    let _persisted = tmp.persist(path).map_err(std::io::Error::from)?;
    set_permissions_0600(path)?;

    fsync_dir(dir)?;
    Ok(())
}

/// Remove a file. Returns whether it existed. The caller holds the exclusive lock.
pub fn remove_file(path: &Path) -> Result<bool, IoError> {
    match fs::remove_file(path) {
        Ok(()) => {
            if let Some(dir) = path.parent() {
                fsync_dir(dir)?;
            }
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// File stems in `dir` carrying `extension`, sorted. Missing directory is empty.
pub fn list_stems(dir: &Path, extension: &str) -> Result<Vec<String>, IoError> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut stems = Vec::new();
    for dir_entry in read_dir {
        let path = dir_entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}

fn set_permissions_0600(path: &Path) -> Result<(), IoError> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn fsync_dir(dir: &Path) -> Result<(), IoError> {
    #[cfg(unix)]
    {
        let file = File::open(dir)?;
        file.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn lock_file(file: &File, mode: LockMode) -> Result<(), IoError> {
    #[cfg(unix)]
    {
        let op = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        };

        let rc = unsafe { libc::flock(file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(());
        }
        Err(IoError::LockFailed)
    }

    #[cfg(not(unix))]
    {
        let _ = file;
        let _ = mode;
        Err(IoError::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_is_atomic_and_permissions_are_restrictive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice").join("d1.entry");

        let a = vec![b'a'; 1024 * 64];
        let b = vec![b'b'; 1024 * 64];

        {
            let _lock = DirLock::acquire(&dir.path().join("alice"), LockMode::Exclusive).unwrap();
            write_bytes_atomic(&path, &a).unwrap();
            assert_eq!(read_bytes(&path).unwrap(), Some(a));
            write_bytes_atomic(&path, &b).unwrap();
        }
        assert_eq!(read_bytes(&path).unwrap(), Some(b));

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);

            let lock_path = lock_path_for_dir(&dir.path().join("alice"));
            let lock_mode = fs::metadata(&lock_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(lock_mode, 0o600);
        }
    }

    #[test]
    fn missing_files_and_dirs_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_bytes(&dir.path().join("nope")).unwrap(), None);
        assert!(!remove_file(&dir.path().join("nope")).unwrap());
        assert!(list_stems(&dir.path().join("missing"), "entry").unwrap().is_empty());
    }

    #[test]
    fn list_stems_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_bytes_atomic(&dir.path().join("b.entry"), b"1").unwrap();
        write_bytes_atomic(&dir.path().join("a.entry"), b"2").unwrap();
        write_bytes_atomic(&dir.path().join("c.user"), b"3").unwrap();
        let _lock = DirLock::acquire(dir.path(), LockMode::Shared).unwrap();

        assert_eq!(list_stems(dir.path(), "entry").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn concurrent_writers_do_not_corrupt_file() {
        use std::sync::Arc;
        use std::thread;

        let dir = Arc::new(tempfile::tempdir().unwrap());

        let writer = |byte: u8| {
            let dir = dir.clone();
            thread::spawn(move || {
                let path = dir.path().join("d1.entry");
                for _ in 0..50 {
                    let payload = vec![byte; 1024 * 32];
                    {
                        let _lock = DirLock::acquire(dir.path(), LockMode::Exclusive).unwrap();
                        write_bytes_atomic(&path, &payload).unwrap();
                    }
                    let _lock = DirLock::acquire(dir.path(), LockMode::Shared).unwrap();
                    let read = read_bytes(&path).unwrap().unwrap();
                    assert_eq!(read.len(), payload.len());
                    let first = read[0];
                    assert!(first == b'x' || first == b'y');
                    assert!(read.iter().all(|b| *b == first));
                }
            })
        };

        let t1 = writer(b'x');
        let t2 = writer(b'y');

        t1.join().unwrap();
        t2.join().unwrap();
    }
}
