//! Shared E2E test helpers for `vigil` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variables that would leak host settings into a test run.
const HOST_VARS: &[&str] = &[
    "RUST_LOG",
    "VIGIL_HIERARCHY",
    "VIGIL_CONFIG",
    "VIGIL_DEBUG",
    "VIGIL_INVARIANT_MODE",
    "VIGIL_OPEN_TIMEOUT_MS",
    "VIGIL_AUDIT_ORIGIN",
    "VIGIL_AUDIT_ENABLED",
];

/// Build a Command for the `vigil` binary with host settings cleared.
///
/// The global config is pointed at a path that never exists so the
/// operator's `~/.vigil/config.toml` cannot change results.
pub fn vigil_cmd() -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("vigil");
    cmd.timeout(TIMEOUT);
    for var in HOST_VARS {
        cmd.env_remove(var);
    }
    cmd.env("VIGIL_CONFIG", std::env::temp_dir().join("vigil-e2e-no-config.toml"));
    cmd
}

/// Path of the two-district fixture hierarchy.
pub fn fixture_hierarchy() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/hierarchy.toml")
}

/// Runs the command and parses stdout as JSON.
pub fn json_output(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is JSON")
}
