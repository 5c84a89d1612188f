use super::{DependencyGroup, Manifest};
use crate::catalog::VersionCatalog;
use crate::error::{EsyError, Result};
use crate::resolver::range::{select_best, VersionRange};
use semver::Version;

/// One `name[@range]` the user asked to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub name: String,
    pub range: Option<VersionRange>,
    pub group: DependencyGroup,
}

/// What `add` decided for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedDependency {
    pub name: String,
    pub group: DependencyGroup,
    pub selected: Version,
    pub persisted: VersionRange,
}

/// Split `name@range`, keeping the leading `@` of scoped names.
pub fn parse_spec(spec: &str, group: DependencyGroup) -> Result<AddRequest> {
    let spec = spec.trim();
    let (name, range) = match spec.rfind('@') {
        Some(idx) if idx > 0 => (&spec[..idx], Some(&spec[idx + 1..])),
        _ => (spec, None),
    };
    if name.is_empty() || name == "@" || name.ends_with('/') || name.contains(char::is_whitespace) {
        return Err(EsyError::InvalidSpecifier { spec: spec.to_string() });
    }
    let range = match range.map(str::trim) {
        None | Some("") => None,
        Some(r) => Some(VersionRange::parse(r)?),
    };
    Ok(AddRequest { name: name.to_string(), range, group })
}

/// Pick a version for every request and return the manifest with the new
/// constraints written in. Either every request succeeds or `manifest` is
/// returned to the caller unchanged (it is never touched).
pub fn add(
    manifest: &Manifest,
    requests: &[AddRequest],
    catalog: &dyn VersionCatalog,
) -> Result<(Manifest, Vec<AddedDependency>)> {
    let mut added = Vec::with_capacity(requests.len());
    for req in requests {
        let versions = catalog.list_versions(&req.name)?;
        let range = req.range.clone().unwrap_or_else(VersionRange::any);
        let selected = select_best(&req.name, &range, &versions)?;
        let persisted = match &req.range {
            Some(explicit) => explicit.clone(),
            None => VersionRange::caret(&selected),
        };
        added.push(AddedDependency { name: req.name.clone(), group: req.group, selected, persisted });
    }

    let mut updated = manifest.clone();
    for dep in &added {
        updated.group_mut(dep.group).insert(dep.name.clone(), dep.persisted.to_string());
    }
    Ok((updated, added))
}

/// Drop `names` from whichever groups hold them. Names held by no group are an error.
pub fn remove(manifest: &Manifest, names: &[String]) -> Result<(Manifest, Vec<(DependencyGroup, String)>)> {
    let mut updated = manifest.clone();
    let mut removed = Vec::new();
    for name in names {
        let mut found = false;
        for group in DependencyGroup::ALL {
            if updated.group(group).is_some_and(|t| t.contains_key(name)) {
                updated.group_mut(group).shift_remove(name);
                removed.push((group, name.clone()));
                found = true;
            }
        }
        if !found {
            return Err(EsyError::InvalidSpecifier { spec: name.clone() });
        }
    }
    Ok((updated, removed))
}
