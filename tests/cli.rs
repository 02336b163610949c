//! Integration tests: run the nori binary and check exit codes and output.

use std::process::Command;

fn nori() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nori"));
    cmd.env("NORI_QUIET", "1");
    cmd
}

#[test]
fn test_help() {
    let out = nori().arg("--help").output().unwrap();
    assert!(out.status.success(), "nori --help should succeed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("install"));
    assert!(stdout.contains("versions"));
    assert!(stdout.contains("publish"));
}

#[test]
fn test_version() {
    let out = nori().arg("--version").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_install_rejects_nested_namespace_before_network() {
    let home = tempfile::tempdir().unwrap();
    let out = nori()
        .env("NORI_HOME", home.path())
        .env("NORI_REGISTRY_URL", "http://127.0.0.1:1")
        .args(["install", "a/b/c"])
        .output()
        .unwrap();
    assert!(!out.status.success(), "nori install a/b/c should fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid package spec"), "stderr was: {stderr}");
}

#[test]
fn test_install_requires_package() {
    let out = nori().arg("install").output().unwrap();
    assert!(!out.status.success(), "nori install with no package should fail");
}

#[test]
fn test_bare_invocation_prints_hint() {
    let out = nori().output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("nori --help"));
}
