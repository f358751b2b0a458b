//! Integration tests for the `dask-clusters` executable.

use cli_test_dir::*;

#[test]
fn help_flag() {
    let testdir = TestDir::new("dask-clusters", "help_flag");
    let output = testdir.cmd().arg("--help").expect_success();
    assert!(output.stdout_str().contains("dask-clusters"));
    assert!(output.stdout_str().contains("panel"));
}

#[test]
fn version_flag() {
    let testdir = TestDir::new("dask-clusters", "version_flag");
    let output = testdir.cmd().arg("--version").expect_success();
    assert!(output.stdout_str().contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn scale_flags_conflict() {
    let testdir = TestDir::new("dask-clusters", "scale_flags_conflict");
    let output = testdir
        .cmd()
        .args(&["--url", "http://127.0.0.1:9/"])
        .args(&["scale", "abc", "--workers", "3", "--adapt", "1", "4"])
        .expect_failure();
    assert!(output.stderr_str().contains("cannot be used with"));
}

#[test]
fn missing_url_is_reported() {
    let testdir = TestDir::new("dask-clusters", "missing_url_is_reported");
    let output = testdir
        .cmd()
        .env_remove("DASK_CLUSTERS_URL")
        .arg("list")
        .expect_failure();
    assert!(output.stderr_str().contains("DASK_CLUSTERS_URL"));
}

#[test]
fn unreachable_server_is_an_error() {
    let testdir = TestDir::new("dask-clusters", "unreachable_server_is_an_error");
    for args in &[&["list"][..], &["list", "--json"], &["stop", "abc"]] {
        let output = testdir
            .cmd()
            .args(&["--url", "http://127.0.0.1:9/"])
            .args(*args)
            .expect_failure();
        assert!(output.stdout_str().is_empty());
        assert!(!output.stderr_str().contains("no such cluster"));
    }
}
