use crate::config::{Config, Overrides, SourceConfig, ENV_JOBS, ENV_LOCAL_REGISTRY, ENV_REGISTRY};
use crate::catalog::registry::DEFAULT_REGISTRY;
use std::collections::HashMap;
use std::path::PathBuf;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn defaults_to_public_registry() {
    let cfg = Config::resolve_with(&Overrides::default(), env_of(&[])).unwrap();
    assert_eq!(cfg.source, SourceConfig::Registry { url: DEFAULT_REGISTRY.into() });
    assert!(cfg.jobs >= 1);
}

#[test]
fn environment_then_flags() {
    let env = env_of(&[(ENV_REGISTRY, "http://mirror.test/"), (ENV_JOBS, "3")]);
    let cfg = Config::resolve_with(&Overrides::default(), &env).unwrap();
    assert_eq!(cfg.source, SourceConfig::Registry { url: "http://mirror.test/".into() });
    assert_eq!(cfg.jobs, 3);

    let flags = Overrides { local_registry: Some(PathBuf::from("/srv/pkgs")), jobs: Some(8), ..Default::default() };
    let cfg = Config::resolve_with(&flags, &env).unwrap();
    assert_eq!(cfg.source, SourceConfig::Local { path: PathBuf::from("/srv/pkgs") });
    assert_eq!(cfg.jobs, 8);
}

#[test]
fn local_registry_beats_url_at_same_level() {
    let env = env_of(&[(ENV_REGISTRY, "http://mirror.test/"), (ENV_LOCAL_REGISTRY, "/srv/pkgs")]);
    let cfg = Config::resolve_with(&Overrides::default(), env).unwrap();
    assert_eq!(cfg.source, SourceConfig::Local { path: PathBuf::from("/srv/pkgs") });
}

#[test]
fn rejects_bad_job_counts() {
    let err = Config::resolve_with(&Overrides::default(), env_of(&[(ENV_JOBS, "many")])).unwrap_err();
    assert!(err.to_string().contains(ENV_JOBS));

    let zero = Overrides { jobs: Some(0), ..Default::default() };
    assert!(Config::resolve_with(&zero, env_of(&[])).is_err());
}
