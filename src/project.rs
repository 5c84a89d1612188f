use crate::error::{EsyError, Result};
use crate::fsutil::ensure_dir;
use crate::lockfile::LOCKFILE_NAME;
use std::fs;
use std::fs::TryLockError;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_NAME: &str = "package.json";

/// Paths of everything a project owns on disk.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_NAME)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(LOCKFILE_NAME)
    }

    pub fn esy_dir(&self) -> PathBuf {
        self.root.join("_esy")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.esy_dir().join("store")
    }

    pub fn installation_path(&self) -> PathBuf {
        self.esy_dir().join("installation.json")
    }

    fn lock_path(&self) -> PathBuf {
        self.esy_dir().join(".lock")
    }

    /// Take the project lock. Fails immediately if another process holds it.
    ///
    /// The lock is an OS advisory lock on `_esy/.lock`, so it goes away with the
    /// process that held it. A file left behind by a killed process is reused.
    pub fn lock(&self) -> Result<ProjectLock> {
        let path = self.lock_path();
        ensure_dir(&self.esy_dir())?;
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| EsyError::io(format!("open {}", path.display()), e))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(EsyError::ProjectLocked { path }),
            Err(TryLockError::Error(e)) => return Err(EsyError::io(format!("lock {}", path.display()), e)),
        }
        // the pid is informational; the OS lock is what excludes other processes
        let _ = file.set_len(0).and_then(|()| writeln!(file, "{}", std::process::id()));
        Ok(ProjectLock { _file: file })
    }
}

/// Held for the whole check-solve-install sequence; released when dropped
/// or when the process exits.
#[derive(Debug)]
pub struct ProjectLock {
    _file: fs::File,
}
