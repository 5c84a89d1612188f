use crate::error::{IoResultExt, Result};
use dirs::cache_dir;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn cache_root() -> PathBuf {
    let mut root = cache_dir().unwrap_or_else(|| PathBuf::from("."));
    root.push("esyi");
    root.push("v1");
    root
}

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p).io_context(|| format!("create directory {}", p.display()))
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so readers
/// only ever observe the old or the new content.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    let written = (|| -> std::io::Result<()> {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written.io_context(|| format!("write {}", path.display()))
}

/// Copy a directory tree, preserving permissions. `keep_going` is polled per entry.
pub fn copy_tree(from: &Path, to: &Path, keep_going: impl Fn() -> bool) -> Result<bool> {
    for entry in WalkDir::new(from).follow_links(false) {
        if !keep_going() {
            return Ok(false);
        }
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| from.to_path_buf());
            let source = e.into_io_error().unwrap_or_else(|| std::io::Error::other("walk loop"));
            crate::error::EsyError::io(format!("walk {}", path.display()), source)
        })?;
        let Ok(rel) = entry.path().strip_prefix(from) else { continue };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        fs::copy(entry.path(), &dest)
            .io_context(|| format!("copy {} to {}", entry.path().display(), dest.display()))?;
    }
    Ok(true)
}

pub fn safe_join(base: &Path, rel: &str) -> Option<PathBuf> {
    if rel.split(['/', '\\']).any(|part| part == "..") {
        return None;
    }
    let mut p = base.to_path_buf();
    for part in rel.split('/') {
        p.push(part);
    }
    Some(p)
}
