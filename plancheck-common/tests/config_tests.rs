//! Integration tests for root folder resolution and TOML loading

use plancheck_common::config::{load_toml, resolve_root_folder};
use serde::Deserialize;
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TEST_ENV: &str = "PLANCHECK_TEST_ROOT_FOLDER";

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    std::env::set_var(TEST_ENV, "/from/env");

    let resolved = resolve_root_folder(Some(Path::new("/from/cli")), TEST_ENV, None);

    std::env::remove_var(TEST_ENV);
    assert_eq!(resolved, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_environment_beats_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("plancheck-analysis.toml");
    std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

    std::env::set_var(TEST_ENV, "/from/env");
    let resolved = resolve_root_folder(None, TEST_ENV, Some(&config_path));
    std::env::remove_var(TEST_ENV);

    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_config_file_used_when_no_cli_or_env() {
    std::env::remove_var(TEST_ENV);
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("plancheck-analysis.toml");
    std::fs::write(&config_path, "root_folder = \"/from/toml\"\n").unwrap();

    let resolved = resolve_root_folder(None, TEST_ENV, Some(&config_path));

    assert_eq!(resolved, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_falls_back_to_default() {
    std::env::remove_var(TEST_ENV);

    let resolved = resolve_root_folder(None, TEST_ENV, None);

    assert!(resolved.ends_with("plancheck") || resolved.ends_with("plancheck_data"));
}

#[derive(Debug, Deserialize)]
struct Sample {
    name: String,
    workers: usize,
}

#[test]
fn test_load_toml_parses_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sample.toml");
    std::fs::write(&path, "name = \"x\"\nworkers = 3\n").unwrap();

    let sample: Sample = load_toml(&path).unwrap();
    assert_eq!(sample.name, "x");
    assert_eq!(sample.workers, 3);
}

#[test]
fn test_load_toml_reports_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "name = ").unwrap();

    let err = load_toml::<Sample>(&path).unwrap_err();
    assert!(matches!(err, plancheck_common::Error::Config(_)));

    let missing = load_toml::<Sample>(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, plancheck_common::Error::Config(_)));
}
