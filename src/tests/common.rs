use crate::catalog::{LocalRegistry, PackageDescriptor, PackageSource, VersionCatalog};
use crate::error::{EsyError, Result};
use crate::installer::CancelToken;
use crate::project::Project;
use semver::Version;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// A throwaway on-disk registry plus project directory.
pub struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("create sandbox tempdir");
        fs::create_dir_all(temp.path().join("registry")).expect("create registry dir");
        fs::create_dir_all(temp.path().join("project")).expect("create project dir");
        Self { temp }
    }

    pub fn registry_root(&self) -> PathBuf {
        self.temp.path().join("registry")
    }

    pub fn registry(&self) -> LocalRegistry {
        LocalRegistry::new(self.registry_root())
    }

    pub fn project(&self) -> Project {
        Project::at(self.temp.path().join("project"))
    }

    pub fn publish(&self, name: &str, version: &str, deps: &[(&str, &str)]) {
        let dir = self.registry_root().join(name).join(version);
        fs::create_dir_all(&dir).expect("create package dir");
        let deps: serde_json::Map<String, Value> =
            deps.iter().map(|(n, r)| (n.to_string(), Value::String(r.to_string()))).collect();
        let manifest = json!({ "name": name, "version": version, "dependencies": deps });
        fs::write(dir.join("package.json"), manifest.to_string()).expect("write package.json");
        fs::write(dir.join("index.js"), format!("module.exports = '{name}@{version}';\n")).expect("write index.js");
    }

    pub fn write_manifest(&self, manifest: &Value) {
        let path = self.project().manifest_path();
        fs::write(path, serde_json::to_string_pretty(manifest).expect("serialize manifest"))
            .expect("write project package.json");
    }

    pub fn read_manifest(&self) -> Value {
        read_json(&self.project().manifest_path())
    }
}

pub fn read_json(path: &Path) -> Value {
    let txt = fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));
    serde_json::from_str(&txt).expect("parse json")
}

pub fn v(s: &str) -> Version {
    Version::parse(s).expect("valid version")
}

/// Counts lookups that reach the wrapped catalog.
pub struct CountingCatalog<C> {
    pub inner: C,
    pub list_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
}

impl<C> CountingCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, list_calls: AtomicUsize::new(0), describe_calls: AtomicUsize::new(0) }
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn describes(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

impl<C: VersionCatalog> VersionCatalog for CountingCatalog<C> {
    fn list_versions(&self, name: &str) -> Result<BTreeSet<Version>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_versions(name)
    }

    fn describe(&self, name: &str, version: &Version) -> Result<PackageDescriptor> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.describe(name, version)
    }
}

/// Delegates to a registry but fails every fetch of `broken`.
pub struct FlakySource<S> {
    pub inner: S,
    pub broken: String,
    pub fetches: AtomicUsize,
}

impl<S> FlakySource<S> {
    pub fn new(inner: S, broken: &str) -> Self {
        Self { inner, broken: broken.to_string(), fetches: AtomicUsize::new(0) }
    }
}

impl<S: PackageSource> PackageSource for FlakySource<S> {
    fn fetch(&self, package: &PackageDescriptor, dest: &Path, cancel: &CancelToken) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if package.name == self.broken {
            return Err(EsyError::CatalogUnavailable { name: package.name.clone(), cause: "connection reset".into() });
        }
        self.inner.fetch(package, dest, cancel)
    }
}

/// Catalog whose every lookup fails as if the network were down.
pub struct OfflineCatalog;

impl VersionCatalog for OfflineCatalog {
    fn list_versions(&self, name: &str) -> Result<BTreeSet<Version>> {
        Err(EsyError::CatalogUnavailable { name: name.to_string(), cause: "offline".into() })
    }

    fn describe(&self, name: &str, _version: &Version) -> Result<PackageDescriptor> {
        Err(EsyError::CatalogUnavailable { name: name.to_string(), cause: "offline".into() })
    }
}
