//! Tests for root folder resolution and config file loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate IVP_ROOT_FOLDER are marked with #[serial].

use ivp_common::config::{
    database_path, default_root_folder, load_config_toml, resolve_root_folder, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/ivp-from-env");

    let root = resolve_root_folder(Some("/tmp/ivp-from-cli"), ROOT_FOLDER_ENV, false).unwrap();
    assert_eq!(root, PathBuf::from("/tmp/ivp-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/ivp-from-env");

    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, false).unwrap();
    assert_eq!(root, PathBuf::from("/tmp/ivp-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_falls_back_to_default_root_folder() {
    env::remove_var(ROOT_FOLDER_ENV);

    let root = resolve_root_folder(None, ROOT_FOLDER_ENV, false).unwrap();
    assert_eq!(root, default_root_folder());
    assert!(!root.as_os_str().is_empty());
}

#[test]
fn test_database_path_inside_root() {
    let path = database_path(Path::new("/srv/ivp"));
    assert_eq!(path, PathBuf::from("/srv/ivp/ivp.db"));
}

#[test]
fn test_load_explicit_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "root_folder = \"/data/ivp\"").unwrap();
    writeln!(file, "[difficulty]").unwrap();
    writeln!(file, "default_difficulty = \"hard\"").unwrap();

    let value = load_config_toml(Some(file.path())).unwrap().unwrap();
    assert_eq!(value.get("root_folder").and_then(|v| v.as_str()), Some("/data/ivp"));
    assert_eq!(
        value
            .get("difficulty")
            .and_then(|t| t.get("default_difficulty"))
            .and_then(|v| v.as_str()),
        Some("hard")
    );
}

#[test]
fn test_invalid_toml_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "root_folder = [unterminated").unwrap();

    let result = load_config_toml(Some(file.path()));
    assert!(matches!(result, Err(ivp_common::Error::Config(_))));
}

#[test]
fn test_missing_explicit_config_file_is_error() {
    let result = load_config_toml(Some(Path::new("/nonexistent/ivp/config.toml")));
    assert!(matches!(result, Err(ivp_common::Error::Io(_))));
}
