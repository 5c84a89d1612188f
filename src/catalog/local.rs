use super::{parse_dependencies, unavailable, PackageDescriptor, PackageSource, VersionCatalog};
use crate::error::{EsyError, Result};
use crate::fsutil::{copy_tree, safe_join};
use crate::installer::CancelToken;
use semver::Version;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A registry laid out on disk as `<root>/<name>/<version>/package.json`,
/// where each version directory holds the package's files.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

#[derive(Debug, Deserialize, Default)]
struct PublishedManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

impl LocalRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_dir(&self, name: &str) -> Result<PathBuf> {
        safe_join(&self.root, name).ok_or_else(|| EsyError::UnknownPackage { name: name.to_string() })
    }

    fn version_dir(&self, name: &str, version: &Version) -> Result<PathBuf> {
        Ok(self.package_dir(name)?.join(version.to_string()))
    }
}

impl VersionCatalog for LocalRegistry {
    fn list_versions(&self, name: &str) -> Result<BTreeSet<Version>> {
        let dir = self.package_dir(name)?;
        let entries = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EsyError::UnknownPackage { name: name.to_string() })
            }
            Err(e) => return Err(unavailable(name, format!("read {}: {e}", dir.display()))),
        };
        let mut out = BTreeSet::new();
        for ent in entries.flatten() {
            let p = ent.path();
            if !p.join("package.json").is_file() {
                continue;
            }
            if let Some(ver) = p.file_name().and_then(|o| o.to_str()).and_then(|s| Version::parse(s).ok()) {
                out.insert(ver);
            }
        }
        if out.is_empty() {
            return Err(EsyError::UnknownPackage { name: name.to_string() });
        }
        Ok(out)
    }

    fn describe(&self, name: &str, version: &Version) -> Result<PackageDescriptor> {
        let path = self.version_dir(name, version)?.join("package.json");
        let txt = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EsyError::UnknownVersion { name: name.to_string(), version: version.to_string() })
            }
            Err(e) => return Err(unavailable(name, format!("read {}: {e}", path.display()))),
        };
        let mf: PublishedManifest = serde_json::from_str(&txt)
            .map_err(|e| unavailable(name, format!("parse {}: {e}", path.display())))?;
        if let Some(declared) = mf.version.as_deref() {
            if Version::parse(declared).ok().as_ref() != Some(version) {
                return Err(unavailable(
                    name,
                    format!("{} declares version {declared}, expected {version}", path.display()),
                ));
            }
        }
        let owner = format!("{}@{version}", mf.name.as_deref().unwrap_or(name));
        Ok(PackageDescriptor {
            name: name.to_string(),
            version: version.clone(),
            dependencies: parse_dependencies(&owner, &mf.dependencies)?,
            dist: None,
        })
    }
}

impl PackageSource for LocalRegistry {
    fn fetch(&self, package: &PackageDescriptor, dest: &Path, cancel: &CancelToken) -> Result<()> {
        let from = self.version_dir(&package.name, &package.version)?;
        if !from.is_dir() {
            return Err(EsyError::UnknownVersion {
                name: package.name.clone(),
                version: package.version.to_string(),
            });
        }
        if !copy_tree(&from, dest, || !cancel.is_cancelled())? {
            return Err(EsyError::Cancelled);
        }
        Ok(())
    }
}
