//! Binary tests: which subcommands read the config
//! Run with: cargo test --test cli_test

use std::path::Path;
use std::process::{Command, Output};

fn mirbot(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mirbot"))
        .arg("-c")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("MIRBOT_PORT")
        .output()
        .unwrap()
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_version_and_init_config_ignore_a_broken_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "bot: [unclosed\n");

    let out = mirbot(&config, &["version"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("mirbot v"));

    let out = mirbot(&config, &["init-config"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("command-prefix"));
}

#[test]
fn test_check_config_rejects_a_broken_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "bot: [unclosed\n");

    let out = mirbot(&config, &["check-config"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_invalid_port_variable_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "bot:\n  nick: mirbot\n");

    let out = mirbot(&config, &["check-config"]);
    assert_eq!(out.status.code(), Some(0));

    let out = Command::new(env!("CARGO_BIN_EXE_mirbot"))
        .arg("-c")
        .arg(&config)
        .arg("check-config")
        .env_remove("RUST_LOG")
        .env("MIRBOT_PORT", "not-a-port")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));

    let logged = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(logged.contains("MIRBOT_PORT"), "{}", logged);
}
