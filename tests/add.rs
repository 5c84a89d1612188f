mod support;

use predicates::prelude::*;
use serde_json::json;
use support::Fixture;

const SOLVED: &str = "solving esy constraints: done";

fn fixture() -> Fixture {
    let fx = Fixture::new(json!({
        "name": "root",
        "version": "1.0.0",
        "esy": {},
        "dependencies": { "dep": "1.0.0" }
    }));
    fx.publish("dep", "1.0.0", &[]);
    fx.publish("new-dep", "1.0.0", &[]);
    fx.publish("new-dep", "2.0.0", &[("helper", "^1.0.0")]);
    fx.publish("helper", "1.2.0", &[]);
    fx.publish("lint", "0.9.0", &[]);
    fx
}

#[test]
fn add_without_range_saves_caret_of_newest() {
    let fx = fixture();
    fx.esy().arg("install").assert().success().stderr(predicate::str::contains(SOLVED));

    fx.esy()
        .args(["add", "new-dep"])
        .assert()
        .success()
        .stderr(predicate::str::contains(SOLVED));
    assert_eq!(fx.manifest()["dependencies"]["new-dep"], "^2.0.0");
    let record = fx.installation();
    assert_eq!(record["dependencies"]["new-dep"]["version"], "2.0.0");
    assert_eq!(record["packages"]["helper"]["version"], "1.2.0");

    fx.esy().arg("install").assert().success().stderr(predicate::str::contains(SOLVED).not());
}

#[test]
fn add_with_explicit_range() {
    let fx = fixture();
    fx.esy().args(["add", "new-dep@^1.0.0"]).assert().success();
    assert_eq!(fx.manifest()["dependencies"]["new-dep"], "^1.0.0");
    assert_eq!(fx.installation()["dependencies"]["new-dep"]["version"], "1.0.0");
    fx.esy().assert().success().stderr(predicate::str::contains(SOLVED).not());
}

#[test]
fn add_dev_dependency() {
    let fx = fixture();
    fx.esy().args(["add", "-D", "lint"]).assert().success();
    let manifest = fx.manifest();
    assert_eq!(manifest["devDependencies"]["lint"], "^0.9.0");
    assert!(manifest["dependencies"].get("lint").is_none());
    assert_eq!(manifest["esy"], json!({}));
    assert_eq!(fx.installation()["devDependencies"]["lint"]["version"], "0.9.0");
}

#[test]
fn add_several_at_once() {
    let fx = fixture();
    fx.esy().args(["add", "new-dep@^1.0.0", "lint"]).assert().success();
    let manifest = fx.manifest();
    assert_eq!(manifest["dependencies"]["new-dep"], "^1.0.0");
    assert_eq!(manifest["dependencies"]["lint"], "^0.9.0");
}

#[test]
fn add_unknown_package_fails_and_changes_nothing() {
    let fx = fixture();
    let before = fx.manifest();
    fx.esy()
        .args(["add", "no-such-package"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-package"));
    assert_eq!(fx.manifest(), before);
    assert!(!fx.project().join("_esy").join("installation.json").exists());
    fx.esy().args(["add", "new-dep"]).assert().success();
}

#[test]
fn add_with_unsatisfiable_range_fails() {
    let fx = fixture();
    fx.esy()
        .args(["add", "new-dep@^7.0.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("new-dep"));
    assert!(fx.manifest()["dependencies"].get("new-dep").is_none());
}

#[test]
fn remove_then_list() {
    let fx = fixture();
    fx.esy().args(["add", "new-dep"]).assert().success();
    fx.esy().args(["remove", "new-dep"]).assert().success();
    assert!(fx.manifest()["dependencies"].get("new-dep").is_none());
    fx.esy()
        .args(["ls", "--format", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dep").and(predicate::str::contains("new-dep").not()));
}
