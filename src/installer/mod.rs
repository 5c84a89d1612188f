use crate::catalog::{PackageDescriptor, PackageSource};
use crate::error::{EsyError, IoResultExt, Result};
use crate::events::{Event, Reporter};
use crate::fsutil::{atomic_write, ensure_dir, safe_join};
use crate::manifest::{ConstraintSet, DependencyGroup};
use crate::resolver::Resolution;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const COMPLETE_MARKER: &str = ".esyi-complete";

/// Shared flag telling in-flight fetches to stop at their next check.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

impl From<&PackageDescriptor> for InstalledPackage {
    fn from(p: &PackageDescriptor) -> Self {
        Self { name: p.name.clone(), version: p.version.to_string() }
    }
}

/// What ended up installed, per direct dependency group, plus the full closure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackagesRecord {
    #[serde(default)]
    pub dependencies: BTreeMap<String, InstalledPackage>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, InstalledPackage>,
    #[serde(default)]
    pub packages: BTreeMap<String, InstalledPackage>,
}

impl InstalledPackagesRecord {
    pub fn group(&self, group: DependencyGroup) -> &BTreeMap<String, InstalledPackage> {
        match group {
            DependencyGroup::Runtime => &self.dependencies,
            DependencyGroup::Development => &self.dev_dependencies,
        }
    }

    fn build(resolution: &Resolution, constraints: &ConstraintSet) -> Self {
        let mut record = Self::default();
        for (group, name, _) in constraints.iter() {
            if let Some(pkg) = resolution.get(name) {
                let table = match group {
                    DependencyGroup::Runtime => &mut record.dependencies,
                    DependencyGroup::Development => &mut record.dev_dependencies,
                };
                table.insert(name.clone(), pkg.into());
            }
        }
        record.packages = resolution.packages.iter().map(|(n, p)| (n.clone(), p.into())).collect();
        record
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EsyError::io(format!("read {}", path.display()), e)),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| EsyError::io(format!("parse {}", path.display()), std::io::Error::other(e)))
    }

    fn to_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        let mut data = serde_json::to_string_pretty(self)
            .map_err(|e| EsyError::io(format!("serialize {}", path.display()), std::io::Error::other(e)))?;
        data.push('\n');
        Ok(data.into_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub record: InstalledPackagesRecord,
    pub fetched: usize,
}

/// Materializes a resolution into the project-local store.
///
/// [`Installer::install`] only touches the store. Writing the record and
/// pruning are separate steps so the caller decides when they are committed.
pub struct Installer<'a> {
    source: &'a dyn PackageSource,
    store: PathBuf,
    record_path: PathBuf,
    jobs: usize,
}

impl<'a> Installer<'a> {
    pub fn new(source: &'a dyn PackageSource, store: PathBuf, record_path: PathBuf, jobs: usize) -> Self {
        Self { source, store, record_path, jobs: jobs.max(1) }
    }

    pub fn package_dir(&self, name: &str, version: &semver::Version) -> Option<PathBuf> {
        safe_join(&self.store, name).map(|p| p.join(version.to_string()))
    }

    pub fn install(
        &self,
        resolution: &Resolution,
        constraints: &ConstraintSet,
        reporter: &dyn Reporter,
    ) -> Result<InstallOutcome> {
        ensure_dir(&self.store)?;
        let missing: Vec<&PackageDescriptor> =
            resolution.packages.values().filter(|p| !self.is_complete(p)).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| EsyError::io("start install workers", std::io::Error::other(e)))?;
        let cancel = CancelToken::new();
        let failure: Mutex<Option<EsyError>> = Mutex::new(None);
        pool.install(|| {
            missing.par_iter().for_each(|pkg| {
                if cancel.is_cancelled() {
                    return;
                }
                reporter.report(&Event::Fetching { name: pkg.name.clone(), version: pkg.version.to_string() });
                if let Err(e) = self.fetch_into_store(pkg, &cancel) {
                    cancel.cancel();
                    let mut slot = failure.lock();
                    if slot.is_none() && !matches!(e, EsyError::Cancelled) {
                        *slot = Some(e);
                    }
                }
            })
        });
        if let Some(e) = failure.into_inner() {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(EsyError::Cancelled);
        }

        let record = InstalledPackagesRecord::build(resolution, constraints);
        reporter.report(&Event::Installed { fetched: missing.len(), total: resolution.len() });
        Ok(InstallOutcome { record, fetched: missing.len() })
    }

    /// Atomically replace the installation record. Identical content is left alone.
    pub fn write_record(&self, record: &InstalledPackagesRecord) -> Result<()> {
        let bytes = record.to_bytes(&self.record_path)?;
        if fs::read(&self.record_path).ok().as_deref() != Some(bytes.as_slice()) {
            atomic_write(&self.record_path, &bytes)?;
        }
        Ok(())
    }

    fn is_complete(&self, pkg: &PackageDescriptor) -> bool {
        self.package_dir(&pkg.name, &pkg.version).is_some_and(|d| d.join(COMPLETE_MARKER).is_file())
    }

    /// Fetch into a sibling temp directory, mark it complete, then rename into place.
    fn fetch_into_store(&self, pkg: &PackageDescriptor, cancel: &CancelToken) -> Result<()> {
        let failed = |cause: String| EsyError::InstallationFailed {
            name: pkg.name.clone(),
            version: pkg.version.to_string(),
            cause,
        };
        let dest = self.package_dir(&pkg.name, &pkg.version).ok_or_else(|| failed("unsafe package name".into()))?;
        let parent = dest.parent().map(Path::to_path_buf).unwrap_or_else(|| self.store.clone());
        ensure_dir(&parent)?;
        let tmp = parent.join(format!(".{}.tmp", pkg.version));
        if tmp.exists() {
            fs::remove_dir_all(&tmp).io_context(|| format!("remove {}", tmp.display()))?;
        }

        let fetched = self.source.fetch(pkg, &tmp, cancel).and_then(|()| {
            ensure_dir(&tmp)?;
            fs::write(tmp.join(COMPLETE_MARKER), b"").io_context(|| format!("mark {}", tmp.display()))?;
            if dest.exists() {
                fs::remove_dir_all(&dest).io_context(|| format!("remove {}", dest.display()))?;
            }
            fs::rename(&tmp, &dest).io_context(|| format!("move into {}", dest.display()))
        });
        match fetched {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_dir_all(&tmp);
                match e {
                    EsyError::Cancelled | EsyError::InstallationFailed { .. } => Err(e),
                    other => Err(failed(other.to_string())),
                }
            }
        }
    }

    /// Remove store entries the resolution no longer references.
    pub fn prune(&self, resolution: &Resolution) -> Result<()> {
        let keep: HashSet<(String, String)> =
            resolution.packages.values().map(|p| (p.name.clone(), p.version.to_string())).collect();
        for (name, dir) in package_dirs(&self.store)? {
            let Ok(versions) = fs::read_dir(&dir) else { continue };
            for ent in versions.flatten() {
                let version = ent.file_name().to_string_lossy().into_owned();
                if !keep.contains(&(name.clone(), version)) {
                    let path = ent.path();
                    fs::remove_dir_all(&path).io_context(|| format!("prune {}", path.display()))?;
                }
            }
            if fs::read_dir(&dir).map(|mut rd| rd.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(&dir);
            }
        }
        Ok(())
    }
}

/// `(name, dir)` for every package directory in the store, descending into `@scope` dirs.
fn package_dirs(store: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let rd = match fs::read_dir(store) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(EsyError::io(format!("read {}", store.display()), e)),
    };
    for ent in rd.flatten() {
        let name = ent.file_name().to_string_lossy().into_owned();
        if !ent.path().is_dir() {
            continue;
        }
        if name.starts_with('@') {
            for scoped in fs::read_dir(ent.path()).into_iter().flatten().flatten() {
                if scoped.path().is_dir() {
                    out.push((format!("{name}/{}", scoped.file_name().to_string_lossy()), scoped.path()));
                }
            }
        } else {
            out.push((name, ent.path()));
        }
    }
    Ok(out)
}
