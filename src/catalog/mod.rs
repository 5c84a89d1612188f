//! Package metadata lookup and package fetching.
//!
//! A [`VersionCatalog`] answers "which versions of `name` exist" and "what does
//! `name@version` depend on". A [`PackageSource`] places the files of a
//! described package into a directory. Both registries in this module
//! implement both traits.

use crate::error::{EsyError, Result};
use crate::installer::CancelToken;
use crate::resolver::range::VersionRange;
use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

pub mod local;
pub mod registry;

pub use local::LocalRegistry;
pub use registry::RegistryCatalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    pub tarball: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

pub trait VersionCatalog: Send + Sync {
    /// All published versions of `name`. Never empty on success.
    fn list_versions(&self, name: &str) -> Result<BTreeSet<Version>>;

    fn describe(&self, name: &str, version: &Version) -> Result<PackageDescriptor>;
}

pub trait PackageSource: Send + Sync {
    /// Place the contents of `package` into `dest`, which does not exist yet.
    fn fetch(&self, package: &PackageDescriptor, dest: &Path, cancel: &CancelToken) -> Result<()>;
}

/// Memoizes lookups for the duration of one resolve pass.
pub struct MemoCatalog<'a> {
    inner: &'a dyn VersionCatalog,
    versions: Mutex<HashMap<String, BTreeSet<Version>>>,
    descriptors: Mutex<HashMap<(String, Version), PackageDescriptor>>,
}

impl<'a> MemoCatalog<'a> {
    pub fn new(inner: &'a dyn VersionCatalog) -> Self {
        Self { inner, versions: Mutex::new(HashMap::new()), descriptors: Mutex::new(HashMap::new()) }
    }
}

impl VersionCatalog for MemoCatalog<'_> {
    fn list_versions(&self, name: &str) -> Result<BTreeSet<Version>> {
        if let Some(hit) = self.versions.lock().get(name) {
            return Ok(hit.clone());
        }
        let found = self.inner.list_versions(name)?;
        self.versions.lock().insert(name.to_string(), found.clone());
        Ok(found)
    }

    fn describe(&self, name: &str, version: &Version) -> Result<PackageDescriptor> {
        let key = (name.to_string(), version.clone());
        if let Some(hit) = self.descriptors.lock().get(&key) {
            return Ok(hit.clone());
        }
        let found = self.inner.describe(name, version)?;
        self.descriptors.lock().insert(key, found.clone());
        Ok(found)
    }
}

/// Parse the raw `dependencies` table of a published package.
pub(crate) fn parse_dependencies<'a, I>(owner: &str, raw: I) -> Result<BTreeMap<String, VersionRange>>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut out = BTreeMap::new();
    for (name, range) in raw {
        let parsed = VersionRange::parse(range).map_err(|e| match e {
            EsyError::InvalidRangeSyntax { range, reason } => EsyError::InvalidRangeSyntax {
                range,
                reason: format!("{reason} (declared by {owner} for {name})"),
            },
            other => other,
        })?;
        out.insert(name.clone(), parsed);
    }
    Ok(out)
}

pub(crate) fn unavailable(name: &str, cause: impl std::fmt::Display) -> EsyError {
    EsyError::CatalogUnavailable { name: name.to_string(), cause: cause.to_string() }
}
