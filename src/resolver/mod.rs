//! Breadth-first constraint solving over the dependency graph.
//!
//! Every name gets exactly one version. When two ranges on the same name
//! disagree the resolver first looks for a version satisfying all of them;
//! failing that the stronger constraint wins. Direct runtime constraints beat
//! direct development ones, direct beats transitive, and among transitive
//! constraints the one met first in traversal order wins. A change of
//! selection restarts the pass so nothing stale from the old version's
//! dependencies survives.

use crate::catalog::{MemoCatalog, PackageDescriptor, VersionCatalog};
use crate::error::{EsyError, Result};
use crate::manifest::{ConstraintSet, DependencyGroup};
use range::{select_best, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

pub mod range;

/// The solved assignment: one descriptor per package name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub packages: BTreeMap<String, PackageDescriptor>,
}

impl Resolution {
    pub fn get(&self, name: &str) -> Option<&PackageDescriptor> {
        self.packages.get(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// True when every direct constraint has an entry and every entry's
    /// dependencies are present. A persisted resolution failing this is unusable.
    pub fn covers(&self, constraints: &ConstraintSet) -> bool {
        constraints.iter().all(|(_, name, _)| self.packages.contains_key(name))
            && self
                .packages
                .values()
                .all(|p| p.dependencies.keys().all(|dep| self.packages.contains_key(dep)))
    }
}

/// Strength of a constraint; smaller wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Priority {
    rank: u8,
    seq: usize,
}

impl Priority {
    fn direct(group: DependencyGroup, seq: usize) -> Self {
        let rank = match group {
            DependencyGroup::Runtime => 0,
            DependencyGroup::Development => 1,
        };
        Self { rank, seq }
    }

    fn transitive(seq: usize) -> Self {
        Self { rank: 2, seq }
    }
}

struct Task {
    name: String,
    range: VersionRange,
    priority: Priority,
}

struct Selected {
    descriptor: PackageDescriptor,
    priority: Priority,
    ranges: Vec<VersionRange>,
}

#[derive(Clone)]
struct Preference {
    version: Version,
    priority: Priority,
}

enum Pass {
    Done(Resolution),
    Reselect { name: String, preference: Preference },
}

pub struct Resolver<'a> {
    catalog: MemoCatalog<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a dyn VersionCatalog) -> Self {
        Self { catalog: MemoCatalog::new(catalog) }
    }

    pub fn resolve(&self, constraints: &ConstraintSet) -> Result<Resolution> {
        let mut preferred: HashMap<String, Preference> = HashMap::new();
        let mut tried: HashSet<(String, Version)> = HashSet::new();
        loop {
            match self.pass(constraints, &preferred, &tried)? {
                Pass::Done(resolution) => return Ok(resolution),
                Pass::Reselect { name, preference } => {
                    tried.insert((name.clone(), preference.version.clone()));
                    preferred.insert(name, preference);
                }
            }
        }
    }

    fn pass(
        &self,
        constraints: &ConstraintSet,
        preferred: &HashMap<String, Preference>,
        tried: &HashSet<(String, Version)>,
    ) -> Result<Pass> {
        let mut seq = 0usize;
        let mut queue: VecDeque<Task> = VecDeque::new();
        for (group, name, range) in constraints.iter() {
            queue.push_back(Task { name: name.clone(), range: range.clone(), priority: Priority::direct(group, seq) });
            seq += 1;
        }

        let mut selected: BTreeMap<String, Selected> = BTreeMap::new();
        while let Some(task) = queue.pop_front() {
            if let Some(current) = selected.get_mut(&task.name) {
                current.ranges.push(task.range.clone());
                if task.range.satisfies(&current.descriptor.version) {
                    continue;
                }
                if let Some(preference) = self.reconcile(&task, current)? {
                    if tried.contains(&(task.name.clone(), preference.version.clone())) {
                        // every version that satisfies the ranges has already led back here
                        return Err(EsyError::UnresolvableConstraints {
                            name: task.name,
                            ranges: current.ranges.iter().map(ToString::to_string).collect(),
                        });
                    }
                    return Ok(Pass::Reselect { name: task.name, preference });
                }
                continue;
            }

            let (version, priority) = match preferred.get(&task.name) {
                Some(p) if p.priority <= task.priority || task.range.satisfies(&p.version) => {
                    (p.version.clone(), p.priority.min(task.priority))
                }
                _ => {
                    let versions = self.catalog.list_versions(&task.name)?;
                    (select_best(&task.name, &task.range, &versions)?, task.priority)
                }
            };
            let descriptor = self.catalog.describe(&task.name, &version)?;
            for (dep, range) in &descriptor.dependencies {
                queue.push_back(Task { name: dep.clone(), range: range.clone(), priority: Priority::transitive(seq) });
                seq += 1;
            }
            selected.insert(task.name, Selected { descriptor, priority, ranges: vec![task.range] });
        }

        let packages = selected.into_iter().map(|(name, s)| (name, s.descriptor)).collect();
        Ok(Pass::Done(Resolution { packages }))
    }

    /// Decide what `task.name` should be once `task.range` rejects the current
    /// selection. `None` keeps the current version and drops `task.range`.
    ///
    /// Tasks leave the queue in priority order, so the current selection always
    /// comes from a constraint at least as strong as `task`. The only way to
    /// honor both is a version inside every range seen so far.
    fn reconcile(&self, task: &Task, current: &Selected) -> Result<Option<Preference>> {
        let versions = self.catalog.list_versions(&task.name)?;
        let joint = versions.iter().filter(|v| current.ranges.iter().all(|r| r.satisfies(v))).max();
        Ok(joint.map(|v| Preference { version: v.clone(), priority: current.priority.min(task.priority) }))
    }
}
