//! The `install`, `add` and `remove` workflows.
//!
//! Each one holds the project lock from the fingerprint check until the
//! installation record is written. Solving and fetching touch only the
//! store; the manifest, lock file and record are then written together and
//! rolled back as a unit if any of those writes fails.

use crate::catalog::{PackageSource, VersionCatalog};
use crate::error::{EsyError, Result};
use crate::events::{Event, Reporter};
use crate::fsutil::atomic_write;
use crate::installer::{InstalledPackagesRecord, Installer};
use crate::lockfile::{fingerprint_of, Fingerprint, ResolutionCache};
use crate::manifest::{self, AddRequest, AddedDependency, DependencyGroup, Manifest};
use crate::project::Project;
use crate::resolver::{Resolution, Resolver};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Everything an operation needs, passed explicitly.
pub struct Context<'a> {
    pub project: Project,
    pub catalog: &'a dyn VersionCatalog,
    pub source: &'a dyn PackageSource,
    pub reporter: &'a dyn Reporter,
    pub jobs: usize,
}

impl Context<'_> {
    fn installer(&self) -> Installer<'_> {
        Installer::new(self.source, self.project.store_dir(), self.project.installation_path(), self.jobs)
    }
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Whether the resolver ran in this invocation.
    pub solved: bool,
    pub fetched: usize,
    pub resolution: Resolution,
    pub record: InstalledPackagesRecord,
}

#[derive(Debug, Clone)]
pub struct AddReport {
    pub added: Vec<AddedDependency>,
    pub install: InstallReport,
}

#[derive(Debug, Clone)]
pub struct RemoveReport {
    pub removed: Vec<(DependencyGroup, String)>,
    pub install: InstallReport,
}

pub fn install(ctx: &Context<'_>) -> Result<InstallReport> {
    let _lock = ctx.project.lock()?;
    let manifest = manifest::load(&ctx.project.manifest_path())?;
    let staged = stage(ctx, &manifest, false)?;
    commit(ctx, staged, None)
}

pub fn add(ctx: &Context<'_>, requests: &[AddRequest]) -> Result<AddReport> {
    let _lock = ctx.project.lock()?;
    let current = manifest::load(&ctx.project.manifest_path())?;
    let (updated, added) = manifest::add(&current, requests, ctx.catalog)?;
    let staged = stage(ctx, &updated, true)?;
    let install = commit(ctx, staged, Some(&updated))?;
    for dep in &added {
        ctx.reporter.report(&Event::ManifestUpdated {
            group: dep.group,
            name: dep.name.clone(),
            range: dep.persisted.to_string(),
        });
    }
    Ok(AddReport { added, install })
}

pub fn remove(ctx: &Context<'_>, names: &[String]) -> Result<RemoveReport> {
    let _lock = ctx.project.lock()?;
    let current = manifest::load(&ctx.project.manifest_path())?;
    let (updated, removed) = manifest::remove(&current, names)?;
    let staged = stage(ctx, &updated, true)?;
    let install = commit(ctx, staged, Some(&updated))?;
    for (group, name) in &removed {
        ctx.reporter.report(&Event::Removed { group: *group, name: name.clone() });
    }
    Ok(RemoveReport { removed, install })
}

/// A resolved and fetched install whose project files are not written yet.
struct Staged {
    report: InstallReport,
    fingerprint: Fingerprint,
}

/// Reuse the stored resolution when its fingerprint matches (unless `force_solve`),
/// otherwise solve; then fetch whatever the store is missing.
fn stage(ctx: &Context<'_>, manifest: &Manifest, force_solve: bool) -> Result<Staged> {
    let constraints = manifest.constraints()?;
    let fingerprint = fingerprint_of(&constraints);

    let reusable = if force_solve {
        None
    } else {
        ResolutionCache::new(ctx.project.lockfile_path())
            .load()?
            .filter(|(stored, resolution)| *stored == fingerprint && resolution.covers(&constraints))
            .map(|(_, resolution)| resolution)
    };
    let (resolution, solved) = match reusable {
        Some(resolution) => {
            ctx.reporter.report(&Event::UsingLockfile);
            (resolution, false)
        }
        None => {
            ctx.reporter.report(&Event::SolvingStarted);
            let resolution = Resolver::new(ctx.catalog).resolve(&constraints)?;
            ctx.reporter.report(&Event::SolvingDone { packages: resolution.len() });
            (resolution, true)
        }
    };

    let outcome = ctx.installer().install(&resolution, &constraints, ctx.reporter)?;
    Ok(Staged {
        report: InstallReport { solved, fetched: outcome.fetched, resolution, record: outcome.record },
        fingerprint,
    })
}

/// Write manifest, lock file and record, restoring all three if any write fails.
/// Store pruning runs afterwards and cannot fail the operation.
fn commit(ctx: &Context<'_>, staged: Staged, manifest: Option<&Manifest>) -> Result<InstallReport> {
    let installer = ctx.installer();
    let manifest_path = ctx.project.manifest_path();
    let lock_path = ctx.project.lockfile_path();
    let snapshots = [
        Snapshot::take(&manifest_path)?,
        Snapshot::take(&lock_path)?,
        Snapshot::take(&ctx.project.installation_path())?,
    ];

    let report = staged.report;
    let written = (|| -> Result<()> {
        if let Some(m) = manifest {
            manifest::write(m, &manifest_path)?;
        }
        if report.solved {
            ResolutionCache::new(&lock_path).store(&staged.fingerprint, &report.resolution)?;
        }
        installer.write_record(&report.record)
    })();
    if let Err(e) = written {
        for snapshot in snapshots.iter().rev() {
            snapshot.restore();
        }
        return Err(e);
    }

    if let Err(e) = installer.prune(&report.resolution) {
        ctx.reporter.report(&Event::PruneSkipped { cause: e.to_string() });
    }
    Ok(report)
}

/// Contents of a project file before an operation started writing.
struct Snapshot {
    path: PathBuf,
    bytes: Option<Vec<u8>>,
}

impl Snapshot {
    fn take(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => Some(b),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(EsyError::io(format!("read {}", path.display()), e)),
        };
        Ok(Self { path: path.to_path_buf(), bytes })
    }

    fn restore(&self) {
        if fs::read(&self.path).ok() == self.bytes {
            return;
        }
        let _ = match &self.bytes {
            Some(bytes) => atomic_write(&self.path, bytes),
            None => fs::remove_file(&self.path).map_err(|e| EsyError::io("remove", e)),
        };
    }
}
