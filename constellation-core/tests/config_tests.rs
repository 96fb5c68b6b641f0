//! Config loading, layout resolution and discovery against real directory trees.

use assert_fs::prelude::*;
use constellation_core::{
    config::{load_at, CONFIG_FILE_NAME},
    discover, discover_with_config, Config, ConfigError, Layout,
};
use predicates::prelude::predicate;
use rstest::rstest;
use std::path::Path;

fn star(root: &assert_fs::TempDir, name: &str) {
    root.child(name)
        .child("scripts")
        .create_dir_all()
        .expect("mkdir");
}

// ---------------------------------------------------------------------------
// 1. Config errors
// ---------------------------------------------------------------------------

#[test]
fn missing_root_is_fatal() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let absent = root.path().join("nope");
    let err = load_at(&absent, None).unwrap_err();
    assert!(matches!(err, ConfigError::RootNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("--root"));
}

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child(CONFIG_FILE_NAME)
        .write_str("hub: [unclosed\n")
        .expect("write");

    let err = load_at(root.path(), None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains(CONFIG_FILE_NAME));
}

#[test]
fn explicit_config_must_exist() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = load_at(root.path(), Some(&root.path().join("other.yaml"))).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
}

#[test]
fn explicit_config_overrides_defaults() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let file = root.child("custom.yaml");
    file.write_str("hub: central\nmodule_suffix: -star\nexecutable_extensions: [sh]\n")
        .expect("write");

    let config = load_at(root.path(), Some(file.path())).expect("load");
    assert_eq!(config.hub, "central");
    assert_eq!(config.module_suffix, "-star");
    assert!(config.is_executable_name("x.SH"));
    assert!(!config.is_executable_name("x.py"));
    assert_eq!(config.scripts_dir, Config::default().scripts_dir);
}

#[test]
fn missing_hub_is_fatal() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = Layout::resolve(root.path(), &Config::default()).unwrap_err();
    assert!(matches!(err, ConfigError::HubNotFound { .. }), "got: {err}");
}

#[test]
fn layout_places_state_under_hub() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("hub").create_dir_all().expect("mkdir");
    let layout = Layout::resolve(root.path(), &Config::default()).expect("layout");
    assert_eq!(layout.target_dir, root.path().join("hub").join("scripts"));
    assert!(layout.backups_dir.starts_with(&layout.state_dir));
    assert!(layout.status_path.ends_with("signals/scripts_status.json"));
    root.child("hub")
        .child("scripts")
        .assert(predicate::path::missing());
}

// ---------------------------------------------------------------------------
// 2. Discovery
// ---------------------------------------------------------------------------

#[test]
fn discovery_is_sorted_and_excludes_hub() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    star(&root, "zeta-model");
    star(&root, "alpha-model");
    star(&root, "hub");
    star(&root, ".hidden-model");
    root.child("no-scripts-model").create_dir_all().expect("mkdir");
    root.child("plain").child("scripts").create_dir_all().expect("mkdir");

    let config = Config::default();
    let candidates =
        discover_with_config(root.path(), &config, &root.path().join("hub")).expect("discover");
    let names: Vec<_> = candidates.iter().map(|c| c.origin.0.as_str()).collect();
    assert_eq!(names, vec!["alpha-model", "zeta-model"]);
    assert_eq!(
        candidates[0].source_dir,
        root.path().join("alpha-model").join("scripts")
    );
}

#[rstest]
#[case("a-model", true)]
#[case("tools", true)]
#[case("a-modelx", false)]
fn custom_predicate_is_honoured(#[case] dir: &str, #[case] accepted: bool) {
    let root = assert_fs::TempDir::new().expect("tempdir");
    star(&root, dir);
    let predicate = |p: &Path| {
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        name.ends_with("-model") || name == "tools"
    };
    let candidates = discover(root.path(), &predicate, "scripts", &root.path().join("hub"))
        .expect("discover");
    assert_eq!(!candidates.is_empty(), accepted);
}
