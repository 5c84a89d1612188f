use crate::catalog::registry::DEFAULT_REGISTRY;
use crate::catalog::{LocalRegistry, PackageSource, RegistryCatalog, VersionCatalog};
use crate::error::Result;
use anyhow::Context;
use std::path::PathBuf;

pub const ENV_REGISTRY: &str = "ESYI_REGISTRY";
pub const ENV_LOCAL_REGISTRY: &str = "ESYI_LOCAL_REGISTRY";
pub const ENV_JOBS: &str = "ESYI_JOBS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Registry { url: String },
    Local { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source: SourceConfig,
    /// Upper bound on concurrent package fetches.
    pub jobs: usize,
}

/// Values given on the command line; they override the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub registry: Option<String>,
    pub local_registry: Option<PathBuf>,
    pub jobs: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::Registry { url: DEFAULT_REGISTRY.into() },
            jobs: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

impl Config {
    pub fn resolve(overrides: &Overrides) -> anyhow::Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Flags beat environment, environment beats defaults. A local registry
    /// beats a URL at the same level.
    pub fn resolve_with(overrides: &Overrides, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();
        if let Some(url) = env(ENV_REGISTRY).filter(|s| !s.trim().is_empty()) {
            cfg.source = SourceConfig::Registry { url };
        }
        if let Some(path) = env(ENV_LOCAL_REGISTRY).filter(|s| !s.trim().is_empty()) {
            cfg.source = SourceConfig::Local { path: PathBuf::from(path) };
        }
        if let Some(raw) = env(ENV_JOBS) {
            cfg.jobs = raw.trim().parse().with_context(|| format!("{ENV_JOBS}={raw} is not a number"))?;
        }
        if let Some(url) = &overrides.registry {
            cfg.source = SourceConfig::Registry { url: url.clone() };
        }
        if let Some(path) = &overrides.local_registry {
            cfg.source = SourceConfig::Local { path: path.clone() };
        }
        if let Some(jobs) = overrides.jobs {
            cfg.jobs = jobs;
        }
        if cfg.jobs == 0 {
            anyhow::bail!("jobs must be at least 1");
        }
        Ok(cfg)
    }

    pub fn open_backend(&self) -> Result<Backend> {
        Ok(match &self.source {
            SourceConfig::Registry { url } => Backend::Registry(RegistryCatalog::new(Some(url.clone()))?),
            SourceConfig::Local { path } => Backend::Local(LocalRegistry::new(path.clone())),
        })
    }
}

/// The configured package origin, usable both as catalog and as fetch source.
#[derive(Debug, Clone)]
pub enum Backend {
    Registry(RegistryCatalog),
    Local(LocalRegistry),
}

impl Backend {
    pub fn catalog(&self) -> &dyn VersionCatalog {
        match self {
            Backend::Registry(r) => r,
            Backend::Local(l) => l,
        }
    }

    pub fn source(&self) -> &dyn PackageSource {
        match self {
            Backend::Registry(r) => r,
            Backend::Local(l) => l,
        }
    }
}
