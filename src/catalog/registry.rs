use super::{parse_dependencies, unavailable, Dist, PackageDescriptor, PackageSource, VersionCatalog};
use crate::error::{EsyError, IoResultExt, Result};
use crate::fsutil::{atomic_write, cache_root, ensure_dir};
use crate::installer::CancelToken;
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tar::{Archive, EntryType};

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// An npm-compatible HTTP registry.
#[derive(Debug, Clone)]
pub struct RegistryCatalog {
    registry: String,
    client: Client,
    meta: Arc<Mutex<HashMap<String, Arc<NpmMetadata>>>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NpmMetadata {
    #[serde(default)]
    pub versions: HashMap<String, NpmVersion>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NpmVersion {
    pub version: String,
    pub dist: NpmDist,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NpmDist {
    pub tarball: String,
    pub integrity: Option<String>,
}

impl RegistryCatalog {
    pub fn new(registry: Option<String>) -> Result<Self> {
        let registry = registry.unwrap_or_else(|| DEFAULT_REGISTRY.into());
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("esyi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| unavailable(&registry, e))?;
        Ok(Self {
            registry: registry.trim_end_matches('/').to_string(),
            client,
            meta: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn package_metadata(&self, name: &str) -> Result<Arc<NpmMetadata>> {
        if let Some(hit) = self.meta.lock().get(name).cloned() {
            return Ok(hit);
        }
        let url = format!("{}/{}", self.registry, name.replace('/', "%2F"));
        let resp = self.client.get(&url).send().map_err(|e| unavailable(name, format!("GET {url}: {e}")))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(EsyError::UnknownPackage { name: name.to_string() });
        }
        if !resp.status().is_success() {
            return Err(unavailable(name, format!("registry returned {} for {url}", resp.status())));
        }
        let meta: NpmMetadata = resp.json().map_err(|e| unavailable(name, format!("decode {url}: {e}")))?;
        let meta = Arc::new(meta);
        self.meta.lock().insert(name.to_string(), meta.clone());
        Ok(meta)
    }

    fn download_tarball(&self, name: &str, url: &str) -> Result<Vec<u8>> {
        let resp = self.client.get(url).send().map_err(|e| unavailable(name, format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(unavailable(name, format!("tarball fetch {url} status {}", resp.status())));
        }
        let bytes = resp.bytes().map_err(|e| unavailable(name, format!("read {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Tarball bytes from the download cache, or from the network on a miss.
    fn tarball_bytes(&self, package: &PackageDescriptor, dist: &Dist) -> Result<Vec<u8>> {
        let cached = tarball_cache_path(&package.name, &package.version);
        if let Ok(bytes) = fs::read(&cached) {
            if verify_integrity(&bytes, dist.integrity.as_deref()).is_ok() {
                return Ok(bytes);
            }
        }
        let bytes = self.download_tarball(&package.name, &dist.tarball)?;
        verify_integrity(&bytes, dist.integrity.as_deref()).map_err(|cause| EsyError::InstallationFailed {
            name: package.name.clone(),
            version: package.version.to_string(),
            cause,
        })?;
        // the cache is an optimisation; a failed write only costs a later re-download
        let _ = atomic_write(&cached, &bytes);
        Ok(bytes)
    }
}

impl VersionCatalog for RegistryCatalog {
    fn list_versions(&self, name: &str) -> Result<BTreeSet<Version>> {
        let meta = self.package_metadata(name)?;
        let out: BTreeSet<Version> = meta.versions.values().filter_map(|v| Version::parse(&v.version).ok()).collect();
        if out.is_empty() {
            return Err(EsyError::UnknownPackage { name: name.to_string() });
        }
        Ok(out)
    }

    fn describe(&self, name: &str, version: &Version) -> Result<PackageDescriptor> {
        let meta = self.package_metadata(name)?;
        let published = meta
            .versions
            .values()
            .find(|v| Version::parse(&v.version).ok().as_ref() == Some(version))
            .ok_or_else(|| EsyError::UnknownVersion { name: name.to_string(), version: version.to_string() })?;
        let owner = format!("{name}@{version}");
        Ok(PackageDescriptor {
            name: name.to_string(),
            version: version.clone(),
            dependencies: parse_dependencies(&owner, &published.dependencies)?,
            dist: Some(Dist { tarball: published.dist.tarball.clone(), integrity: published.dist.integrity.clone() }),
        })
    }
}

impl PackageSource for RegistryCatalog {
    fn fetch(&self, package: &PackageDescriptor, dest: &Path, cancel: &CancelToken) -> Result<()> {
        let dist = match &package.dist {
            Some(d) => d.clone(),
            None => self
                .describe(&package.name, &package.version)?
                .dist
                .ok_or_else(|| unavailable(&package.name, "no tarball published"))?,
        };
        let bytes = self.tarball_bytes(package, &dist)?;
        if cancel.is_cancelled() {
            return Err(EsyError::Cancelled);
        }
        extract_tarball(&bytes, dest, cancel)
    }
}

fn tarball_cache_path(name: &str, version: &Version) -> PathBuf {
    let mut root = cache_root();
    root.push("tarballs");
    for part in name.split('/') {
        root.push(part);
    }
    root.push(format!("{version}.tgz"));
    root
}

/// Check `bytes` against an `sha512-<base64>` integrity string; other algorithms are not checked.
fn verify_integrity(bytes: &[u8], integrity: Option<&str>) -> std::result::Result<(), String> {
    let Some(b64) = integrity.and_then(|i| i.strip_prefix("sha512-")) else {
        return Ok(());
    };
    let expected = STANDARD.decode(b64).map_err(|e| format!("decode integrity base64: {e}"))?;
    let digest = Sha512::digest(bytes);
    if expected != digest[..] {
        return Err(format!("integrity mismatch: expected sha512-{b64}, got sha512-{}", STANDARD.encode(digest)));
    }
    Ok(())
}

/// Unpack a gzipped npm tarball into `dest`, dropping the leading `package/` directory.
///
/// Only regular files and directories are extracted, and only when every path
/// component after the prefix is a plain name. Links, absolute paths and `..`
/// are skipped, so nothing can land outside `dest`.
pub(crate) fn extract_tarball(bytes: &[u8], dest: &Path, cancel: &CancelToken) -> Result<()> {
    ensure_dir(dest)?;
    let mut ar = Archive::new(GzDecoder::new(bytes));
    let entries = ar.entries().io_context(|| "read tarball entries".to_string())?;
    for entry in entries {
        if cancel.is_cancelled() {
            return Err(EsyError::Cancelled);
        }
        let mut e = entry.io_context(|| "read tarball entry".to_string())?;
        if !matches!(e.header().entry_type(), EntryType::Regular | EntryType::Directory) {
            continue;
        }
        let path = e.path().io_context(|| "read tarball entry path".to_string())?.into_owned();
        let mut comps = path.components().peekable();
        if comps.peek().map(|c| c.as_os_str()) == Some(OsStr::new("package")) {
            comps.next();
        }
        let mut stripped = PathBuf::new();
        let mut plain = true;
        for c in comps {
            match c {
                Component::Normal(part) => stripped.push(part),
                Component::CurDir => {}
                _ => plain = false,
            }
        }
        if !plain || stripped.as_os_str().is_empty() {
            continue;
        }
        let dest_path = dest.join(&stripped);
        if let Some(parent) = dest_path.parent() {
            ensure_dir(parent)?;
        }
        e.unpack(&dest_path).io_context(|| format!("unpack {}", dest_path.display()))?;
    }
    Ok(())
}
