use super::common::{read_json, FlakySource, Sandbox};
use crate::catalog::LocalRegistry;
use crate::error::EsyError;
use crate::events::{Event, RecordingReporter};
use crate::manifest::{parse_spec, DependencyGroup};
use crate::ops::{self, Context};
use serde_json::json;
use std::fs;

fn seed(sb: &Sandbox) {
    sb.publish("dep", "1.0.0", &[("shared", "^1.0.0")]);
    sb.publish("shared", "1.0.0", &[]);
    sb.publish("shared", "1.3.0", &[]);
    sb.publish("new-dep", "1.0.0", &[]);
    sb.publish("new-dep", "2.0.0", &[]);
    sb.publish("dev-dep", "0.4.1", &[]);
    sb.write_manifest(&json!({
        "name": "root",
        "version": "1.0.0",
        "dependencies": { "dep": "^1.0.0" }
    }));
}

fn ctx<'a>(sb: &Sandbox, registry: &'a LocalRegistry, reporter: &'a RecordingReporter) -> Context<'a> {
    Context { project: sb.project(), catalog: registry, source: registry, reporter, jobs: 2 }
}

fn specs(list: &[&str], group: DependencyGroup) -> Vec<crate::manifest::AddRequest> {
    list.iter().map(|s| parse_spec(s, group).unwrap()).collect()
}

#[test]
fn install_solves_once_then_reuses_lockfile() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();

    let first = RecordingReporter::new();
    let report = ops::install(&ctx(&sb, &registry, &first)).unwrap();
    assert!(report.solved);
    assert_eq!(first.solve_count(), 1);
    assert_eq!(report.resolution.get("shared").unwrap().version.to_string(), "1.3.0");
    assert!(sb.project().lockfile_path().is_file());
    let record = fs::read(sb.project().installation_path()).unwrap();

    let second = RecordingReporter::new();
    let report = ops::install(&ctx(&sb, &registry, &second)).unwrap();
    assert!(!report.solved);
    assert_eq!(report.fetched, 0);
    assert_eq!(second.solve_count(), 0);
    assert!(second.events().contains(&Event::UsingLockfile));
    assert_eq!(fs::read(sb.project().installation_path()).unwrap(), record);
}

#[test]
fn editing_the_manifest_triggers_a_new_solve() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();

    let mut manifest = sb.read_manifest();
    manifest["dependencies"]["new-dep"] = json!("^1.0.0");
    sb.write_manifest(&manifest);

    let reporter = RecordingReporter::new();
    let report = ops::install(&ctx(&sb, &registry, &reporter)).unwrap();
    assert_eq!(reporter.solve_count(), 1);
    assert_eq!(report.record.dependencies["new-dep"].version, "1.0.0");
}

#[test]
fn add_solves_and_following_install_does_not() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();

    let reporter = RecordingReporter::new();
    let report = ops::add(&ctx(&sb, &registry, &reporter), &specs(&["new-dep"], DependencyGroup::Runtime)).unwrap();
    assert_eq!(reporter.solve_count(), 1);
    assert_eq!(report.added[0].selected.to_string(), "2.0.0");
    assert_eq!(sb.read_manifest()["dependencies"]["new-dep"], "^2.0.0");
    let record = read_json(&sb.project().installation_path());
    assert_eq!(record["dependencies"]["new-dep"]["version"], "2.0.0");
    assert!(sb.project().store_dir().join("new-dep/2.0.0/index.js").is_file());

    let again = RecordingReporter::new();
    ops::install(&ctx(&sb, &registry, &again)).unwrap();
    assert_eq!(again.solve_count(), 0);
}

#[test]
fn add_with_range_and_dev_flag() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    let reporter = RecordingReporter::new();

    ops::add(&ctx(&sb, &registry, &reporter), &specs(&["new-dep@^1.0.0"], DependencyGroup::Runtime)).unwrap();
    ops::add(&ctx(&sb, &registry, &reporter), &specs(&["dev-dep"], DependencyGroup::Development)).unwrap();
    assert_eq!(reporter.solve_count(), 2);

    let manifest = sb.read_manifest();
    assert_eq!(manifest["dependencies"]["new-dep"], "^1.0.0");
    assert_eq!(manifest["devDependencies"]["dev-dep"], "^0.4.1");
    let record = read_json(&sb.project().installation_path());
    assert_eq!(record["dependencies"]["new-dep"]["version"], "1.0.0");
    assert_eq!(record["devDependencies"]["dev-dep"]["version"], "0.4.1");
    assert!(reporter.events().contains(&Event::ManifestUpdated {
        group: DependencyGroup::Development,
        name: "dev-dep".into(),
        range: "^0.4.1".into(),
    }));
}

#[test]
fn add_of_unknown_package_changes_nothing() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();
    let manifest_before = fs::read(sb.project().manifest_path()).unwrap();
    let record_before = fs::read(sb.project().installation_path()).unwrap();

    let err = ops::add(
        &ctx(&sb, &registry, &RecordingReporter::new()),
        &specs(&["new-dep", "no-such-dep"], DependencyGroup::Runtime),
    )
    .unwrap_err();
    assert!(matches!(err, EsyError::UnknownPackage { .. }));
    assert_eq!(fs::read(sb.project().manifest_path()).unwrap(), manifest_before);
    assert_eq!(fs::read(sb.project().installation_path()).unwrap(), record_before);
}

#[test]
fn failed_install_during_add_keeps_manifest() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    let manifest_before = fs::read(sb.project().manifest_path()).unwrap();

    let source = FlakySource::new(sb.registry(), "new-dep");
    let reporter = RecordingReporter::new();
    let context = Context { project: sb.project(), catalog: &registry, source: &source, reporter: &reporter, jobs: 1 };
    let err = ops::add(&context, &specs(&["new-dep"], DependencyGroup::Runtime)).unwrap_err();
    assert!(matches!(err, EsyError::InstallationFailed { .. }));
    assert_eq!(fs::read(sb.project().manifest_path()).unwrap(), manifest_before);
    assert!(!sb.project().installation_path().exists());
    assert!(!sb.project().lockfile_path().exists());

    // the lock was released, so a retry with a working source goes through
    ops::add(&ctx(&sb, &registry, &reporter), &specs(&["new-dep"], DependencyGroup::Runtime)).unwrap();
}

#[test]
fn remove_drops_dependency_and_prunes_store() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    let reporter = RecordingReporter::new();
    ops::add(&ctx(&sb, &registry, &reporter), &specs(&["new-dep"], DependencyGroup::Runtime)).unwrap();
    assert!(sb.project().store_dir().join("new-dep/2.0.0").is_dir());

    let report = ops::remove(&ctx(&sb, &registry, &reporter), &["new-dep".to_string()]).unwrap();
    assert_eq!(report.removed, vec![(DependencyGroup::Runtime, "new-dep".to_string())]);
    assert!(sb.read_manifest()["dependencies"].get("new-dep").is_none());
    assert!(!sb.project().store_dir().join("new-dep").exists());
    assert!(!report.install.record.packages.contains_key("new-dep"));
}

#[test]
fn held_lock_rejects_a_second_operation() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    let guard = sb.project().lock().unwrap();

    let err = ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap_err();
    assert!(matches!(err, EsyError::ProjectLocked { .. }));
    drop(guard);
    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();
}

#[test]
fn corrupt_lockfile_is_resolved_again() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();
    fs::write(sb.project().lockfile_path(), "garbage").unwrap();

    let reporter = RecordingReporter::new();
    ops::install(&ctx(&sb, &registry, &reporter)).unwrap();
    assert_eq!(reporter.solve_count(), 1);
}

/// Occupy the temp name `atomic_write` uses for `path`, so the next write to it fails.
fn block_writes_to(path: &std::path::Path) {
    fs::create_dir_all(path.with_extension(format!("tmp.{}", std::process::id()))).unwrap();
}

#[test]
fn failed_manifest_write_keeps_record_and_lockfile() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();
    let manifest_before = fs::read(sb.project().manifest_path()).unwrap();
    let record_before = fs::read(sb.project().installation_path()).unwrap();
    let lock_before = fs::read(sb.project().lockfile_path()).unwrap();

    block_writes_to(&sb.project().manifest_path());
    let err = ops::add(&ctx(&sb, &registry, &RecordingReporter::new()), &specs(&["new-dep"], DependencyGroup::Runtime))
        .unwrap_err();
    assert!(matches!(err, EsyError::Io { .. }));
    assert_eq!(fs::read(sb.project().manifest_path()).unwrap(), manifest_before);
    assert_eq!(fs::read(sb.project().installation_path()).unwrap(), record_before);
    assert_eq!(fs::read(sb.project().lockfile_path()).unwrap(), lock_before);
}

#[test]
fn failed_record_write_rolls_back_manifest_and_lockfile() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();
    let manifest_before = fs::read(sb.project().manifest_path()).unwrap();
    let record_before = fs::read(sb.project().installation_path()).unwrap();
    let lock_before = fs::read(sb.project().lockfile_path()).unwrap();

    block_writes_to(&sb.project().installation_path());
    let err = ops::remove(&ctx(&sb, &registry, &RecordingReporter::new()), &["dep".to_string()]).unwrap_err();
    assert!(matches!(err, EsyError::Io { .. }));
    assert_eq!(fs::read(sb.project().manifest_path()).unwrap(), manifest_before);
    assert_eq!(fs::read(sb.project().installation_path()).unwrap(), record_before);
    assert_eq!(fs::read(sb.project().lockfile_path()).unwrap(), lock_before);
}

#[test]
fn first_install_leaves_no_lockfile_when_record_write_fails() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    block_writes_to(&sb.project().installation_path());

    assert!(ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).is_err());
    assert!(!sb.project().lockfile_path().exists());
    assert!(!sb.project().installation_path().exists());
}

#[test]
fn lock_file_left_by_a_dead_process_does_not_block() {
    let sb = Sandbox::new();
    seed(&sb);
    let registry = sb.registry();
    let lock_path = sb.project().esy_dir().join(".lock");
    fs::create_dir_all(sb.project().esy_dir()).unwrap();
    fs::write(&lock_path, "4194303\n").unwrap();

    ops::install(&ctx(&sb, &registry, &RecordingReporter::new())).unwrap();
    assert!(sb.project().lock().is_ok());
}
