use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = EsyError> = std::result::Result<T, E>;

/// Every failure the solver, lock and installer can surface.
///
/// All of these abort the running `add`/`install` wholesale; the manifest and
/// installation record are left as they were before the operation started.
#[derive(Debug, Error)]
pub enum EsyError {
    #[error("invalid range '{range}': {reason}")]
    InvalidRangeSyntax { range: String, reason: String },

    #[error("unknown package '{name}'")]
    UnknownPackage { name: String },

    #[error("unknown version {name}@{version}")]
    UnknownVersion { name: String, version: String },

    #[error("catalog unavailable while looking up '{name}': {cause}")]
    CatalogUnavailable { name: String, cause: String },

    #[error("no version of '{name}' satisfies {range}")]
    NoSatisfyingVersion { name: String, range: String },

    #[error("unresolvable constraints for '{name}': {}", .ranges.join(", "))]
    UnresolvableConstraints { name: String, ranges: Vec<String> },

    #[error("failed to install {name}@{version}: {cause}")]
    InstallationFailed { name: String, version: String, cause: String },

    #[error("invalid package specifier '{spec}'")]
    InvalidSpecifier { spec: String },

    #[error("project is locked by another process ({})", .path.display())]
    ProjectLocked { path: PathBuf },

    #[error("invalid manifest {}: {cause}", .path.display())]
    Manifest { path: PathBuf, cause: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl EsyError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Only a lost catalog connection is worth retrying the whole operation for.
    pub fn is_transient(&self) -> bool {
        matches!(self, EsyError::CatalogUnavailable { .. })
    }

    /// The package this error is about, if any.
    pub fn package(&self) -> Option<&str> {
        match self {
            EsyError::UnknownPackage { name }
            | EsyError::UnknownVersion { name, .. }
            | EsyError::CatalogUnavailable { name, .. }
            | EsyError::NoSatisfyingVersion { name, .. }
            | EsyError::UnresolvableConstraints { name, .. }
            | EsyError::InstallationFailed { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Attach a context string to a raw io error.
pub(crate) trait IoResultExt<T> {
    fn io_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| EsyError::io(f(), e))
    }
}
