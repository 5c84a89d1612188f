use crate::catalog::PackageDescriptor;
use crate::error::{EsyError, Result};
use crate::fsutil::atomic_write;
use crate::manifest::ConstraintSet;
use crate::resolver::Resolution;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const LOCKFILE_NAME: &str = "esy.lock.json";
const FORMAT: u32 = 1;

/// Digest of the manifest's constraint tables. Equal fingerprints mean the
/// stored resolution can be reused without solving.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Independent of table order; changes whenever any name or range text changes.
pub fn fingerprint_of(constraints: &ConstraintSet) -> Fingerprint {
    let mut entries: Vec<(&str, &str, &str)> =
        constraints.iter().map(|(g, n, r)| (g.manifest_key(), n.as_str(), r.as_str())).collect();
    entries.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(format!("esyi-constraints-v{FORMAT}\n"));
    for (group, name, range) in entries {
        hasher.update(group.as_bytes());
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(range.as_bytes());
        hasher.update([b'\n']);
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Lockfile {
    pub format: u32,
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageDescriptor>,
}

/// The persisted fingerprint + resolution pair for one project.
#[derive(Debug, Clone)]
pub struct ResolutionCache {
    path: PathBuf,
}

impl ResolutionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when there is no lock file or it cannot be used (corrupt, other format).
    pub fn load(&self) -> Result<Option<(Fingerprint, Resolution)>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EsyError::io(format!("read {}", self.path.display()), e)),
        };
        let Ok(lock) = serde_json::from_str::<Lockfile>(&data) else {
            return Ok(None);
        };
        if lock.format != FORMAT {
            return Ok(None);
        }
        Ok(Some((lock.fingerprint, Resolution { packages: lock.packages })))
    }

    pub fn store(&self, fingerprint: &Fingerprint, resolution: &Resolution) -> Result<()> {
        let lock = Lockfile { format: FORMAT, fingerprint: fingerprint.clone(), packages: resolution.packages.clone() };
        let mut data = serde_json::to_string_pretty(&lock)
            .map_err(|e| EsyError::io(format!("serialize {}", self.path.display()), std::io::Error::other(e)))?;
        data.push('\n');
        atomic_write(&self.path, data.as_bytes())
    }
}
