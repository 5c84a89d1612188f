use crate::error::{EsyError, IoResultExt, Result};
use crate::fsutil::atomic_write;
use crate::resolver::range::VersionRange;
use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;

pub mod updates;

pub use updates::{add, parse_spec, remove, AddRequest, AddedDependency};

/// The project descriptor. Only the fields the solver cares about are typed;
/// everything else is carried through untouched, and writing it back keeps
/// the top-level keys in the order they were read.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub dependencies: Option<IndexMap<String, String>>,
    pub dev_dependencies: Option<IndexMap<String, String>>,
    pub extra: Map<String, Value>,
    key_order: Vec<String>,
}

impl Manifest {
    fn from_document(doc: Map<String, Value>) -> std::result::Result<Self, String> {
        let mut name = None;
        let mut version = None;
        let mut dependencies = None;
        let mut dev_dependencies = None;
        let mut extra = Map::new();
        let mut key_order = Vec::with_capacity(doc.len());
        for (key, value) in doc {
            key_order.push(key.clone());
            let field = key.as_str();
            match field {
                "name" => name = Some(string_field(field, value)?),
                "version" => version = Some(string_field(field, value)?),
                "dependencies" => dependencies = table_field(field, value)?,
                "devDependencies" => dev_dependencies = table_field(field, value)?,
                _ => {
                    extra.insert(key, value);
                }
            }
        }
        Ok(Self {
            name: name.ok_or("missing field `name`")?,
            version: version.ok_or("missing field `version`")?,
            dependencies,
            dev_dependencies,
            extra,
            key_order,
        })
    }

    fn to_document(&self) -> Map<String, Value> {
        let table = |t: &IndexMap<String, String>| {
            Value::Object(t.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
        };
        let mut typed: Vec<(&str, Option<Value>)> = vec![
            ("name", Some(Value::String(self.name.clone()))),
            ("version", Some(Value::String(self.version.clone()))),
            ("dependencies", self.dependencies.as_ref().map(table)),
            ("devDependencies", self.dev_dependencies.as_ref().map(table)),
        ];

        let mut doc = Map::new();
        for key in &self.key_order {
            let value = match typed.iter_mut().find(|(k, _)| k == key) {
                Some((_, slot)) => slot.take(),
                None => self.extra.get(key).cloned(),
            };
            if let Some(value) = value {
                doc.insert(key.clone(), value);
            }
        }
        for (key, value) in typed {
            if let Some(value) = value {
                doc.insert(key.to_string(), value);
            }
        }
        for (key, value) in &self.extra {
            if !doc.contains_key(key) {
                doc.insert(key.clone(), value.clone());
            }
        }
        doc
    }
}

fn string_field(field: &str, value: Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(format!("`{field}` must be a string, found {other}")),
    }
}

fn table_field(field: &str, value: Value) -> std::result::Result<Option<IndexMap<String, String>>, String> {
    serde_json::from_value(value).map_err(|e| format!("`{field}`: {e}"))
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let doc = Map::<String, Value>::deserialize(deserializer)?;
        Manifest::from_document(doc).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DependencyGroup {
    Runtime,
    Development,
}

impl DependencyGroup {
    /// Runtime first: it takes precedence when both groups constrain a name.
    pub const ALL: [DependencyGroup; 2] = [DependencyGroup::Runtime, DependencyGroup::Development];

    pub fn manifest_key(self) -> &'static str {
        match self {
            DependencyGroup::Runtime => "dependencies",
            DependencyGroup::Development => "devDependencies",
        }
    }
}

impl fmt::Display for DependencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.manifest_key())
    }
}

/// Parsed direct constraints, one table per group, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    runtime: IndexMap<String, VersionRange>,
    development: IndexMap<String, VersionRange>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, group: DependencyGroup) -> &IndexMap<String, VersionRange> {
        match group {
            DependencyGroup::Runtime => &self.runtime,
            DependencyGroup::Development => &self.development,
        }
    }

    pub fn insert(&mut self, group: DependencyGroup, name: impl Into<String>, range: VersionRange) {
        let table = match group {
            DependencyGroup::Runtime => &mut self.runtime,
            DependencyGroup::Development => &mut self.development,
        };
        table.insert(name.into(), range);
    }

    /// Every direct constraint, runtime group first.
    pub fn iter(&self) -> impl Iterator<Item = (DependencyGroup, &String, &VersionRange)> {
        DependencyGroup::ALL
            .into_iter()
            .flat_map(move |g| self.group(g).iter().map(move |(n, r)| (g, n, r)))
    }

    pub fn is_empty(&self) -> bool {
        self.runtime.is_empty() && self.development.is_empty()
    }
}

impl Manifest {
    pub fn new(name: String, version: String) -> Self {
        Self { name, version, dependencies: None, dev_dependencies: None, extra: Map::new(), key_order: Vec::new() }
    }

    pub fn group(&self, group: DependencyGroup) -> Option<&IndexMap<String, String>> {
        match group {
            DependencyGroup::Runtime => self.dependencies.as_ref(),
            DependencyGroup::Development => self.dev_dependencies.as_ref(),
        }
    }

    /// The table for `group`, created empty if the manifest had none.
    pub fn group_mut(&mut self, group: DependencyGroup) -> &mut IndexMap<String, String> {
        let slot = match group {
            DependencyGroup::Runtime => &mut self.dependencies,
            DependencyGroup::Development => &mut self.dev_dependencies,
        };
        slot.get_or_insert_with(IndexMap::new)
    }

    pub fn constraints(&self) -> Result<ConstraintSet> {
        let mut set = ConstraintSet::new();
        for group in DependencyGroup::ALL {
            let Some(table) = self.group(group) else { continue };
            for (name, raw) in table {
                let range = VersionRange::parse(raw).map_err(|e| match e {
                    EsyError::InvalidRangeSyntax { range, reason } => EsyError::InvalidRangeSyntax {
                        range,
                        reason: format!("{reason} ({group} entry '{name}')"),
                    },
                    other => other,
                })?;
                set.insert(group, name.clone(), range);
            }
        }
        Ok(set)
    }
}

pub fn load(path: &Path) -> Result<Manifest> {
    let data = fs::read_to_string(path).io_context(|| format!("read {}", path.display()))?;
    let m: Manifest = serde_json::from_str(&data)
        .map_err(|e| EsyError::Manifest { path: path.to_path_buf(), cause: e.to_string() })?;
    if m.name.is_empty() {
        return Err(EsyError::Manifest { path: path.to_path_buf(), cause: "name empty".into() });
    }
    Ok(m)
}

pub fn write(manifest: &Manifest, path: &Path) -> Result<()> {
    let mut data = serde_json::to_string_pretty(manifest)
        .map_err(|e| EsyError::Manifest { path: path.to_path_buf(), cause: e.to_string() })?;
    data.push('\n');
    atomic_write(path, data.as_bytes())
}
