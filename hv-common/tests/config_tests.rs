//! Config loading and resolution tests
//!
//! Tests that manipulate HV_CONFIG are marked #[serial] so they never run
//! concurrently with each other.

use hv_common::config::{ConfigResolver, SessionConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_path() {
    let file = write_config("server_url = \"ws://env.test/ws\"\n");
    env::set_var(CONFIG_ENV_VAR, file.path());

    let resolver = ConfigResolver::new().with_user_config(None);
    assert_eq!(resolver.resolve(None), Some(file.path().to_path_buf()));

    let config = SessionConfig::load(None).unwrap();
    assert_eq!(config.server_url, "ws://env.test/ws");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_path_takes_precedence_over_env() {
    let env_file = write_config("fade_window_ms = 10\n");
    let cli_file = write_config("fade_window_ms = 80\n");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = SessionConfig::load(Some(cli_file.path())).unwrap();
    assert_eq!(config.fade_window_ms, 80);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    env::remove_var(CONFIG_ENV_VAR);

    let missing = PathBuf::from("/nonexistent/hv-test/config.toml");
    let config = SessionConfig::load(Some(&missing)).unwrap();
    assert_eq!(config, SessionConfig::default());
}

#[test]
#[serial]
fn test_invalid_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);

    let file = write_config("output_sample_rate = 0\n");
    assert!(SessionConfig::load(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_user_config_used_when_present() {
    env::remove_var(CONFIG_ENV_VAR);

    let file = write_config("settle_grace_ms = 750\n");
    let resolver = ConfigResolver::new().with_user_config(Some(file.path().to_path_buf()));
    let resolved = resolver.resolve(None).expect("user config resolved");

    let text = std::fs::read_to_string(resolved).unwrap();
    let config = SessionConfig::from_toml_str(&text).unwrap();
    assert_eq!(config.settle_grace_ms, 750);
}
