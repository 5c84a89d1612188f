#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A project directory next to a local registry directory.
pub struct Fixture {
    temp: TempDir,
}

impl Fixture {
    pub fn new(manifest: Value) -> Self {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("registry")).unwrap();
        fs::create_dir_all(temp.path().join("project")).unwrap();
        let fx = Self { temp };
        fx.write_manifest(&manifest);
        fx
    }

    pub fn registry(&self) -> PathBuf {
        self.temp.path().join("registry")
    }

    pub fn project(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    pub fn publish(&self, name: &str, version: &str, deps: &[(&str, &str)]) {
        let dir = self.registry().join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        let deps: serde_json::Map<String, Value> =
            deps.iter().map(|(n, r)| (n.to_string(), json!(r))).collect();
        let pkg = json!({ "name": name, "version": version, "dependencies": deps });
        fs::write(dir.join("package.json"), pkg.to_string()).unwrap();
        fs::write(dir.join("index.js"), format!("module.exports = '{name}';\n")).unwrap();
    }

    pub fn write_manifest(&self, manifest: &Value) {
        fs::write(self.project().join("package.json"), serde_json::to_string_pretty(manifest).unwrap()).unwrap();
    }

    pub fn manifest(&self) -> Value {
        read_json(&self.project().join("package.json"))
    }

    pub fn installation(&self) -> Value {
        read_json(&self.project().join("_esy").join("installation.json"))
    }

    pub fn esy(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("esy").unwrap();
        cmd.current_dir(self.project())
            .env_remove("ESYI_REGISTRY")
            .env_remove("ESYI_JOBS")
            .env("ESYI_LOCAL_REGISTRY", self.registry())
            .env("NO_COLOR", "1");
        cmd
    }
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}
