#![cfg(target_os = "linux")]
#![expect(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tau_core::sandbox::wrap;
use tau_protocol::EffectiveSandboxConfig;
use tau_protocol::FilesystemMode;
use tau_protocol::NetworkMode;
use tokio::process::Command;
use tokio::time::timeout;

/// `wrap()` emits `tau-linux-sandbox` as argv[0], trusting it to be
/// resolvable on `PATH` via the arg0 hard-link trick. These tests swap in
/// the freshly built binary path so they exercise the real thing without
/// requiring an installed `tau` alongside it.
async fn run_wrapped(effective: &EffectiveSandboxConfig, workspace: &std::path::Path, command: &[&str], timeout_ms: u64) -> (i32, String, String) {
    let command: Vec<String> = command.iter().map(|s| s.to_string()).collect();
    let out = wrap(&command, effective, workspace);
    assert!(out.success, "wrap failed: {:?}", out.error);
    let mut argv = out.wrapped_command.expect("successful wrap carries a command");
    argv[0] = env!("CARGO_BIN_EXE_tau-linux-sandbox").to_string();

    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn tau-linux-sandbox");

    let output = timeout(Duration::from_millis(timeout_ms), child.wait_with_output())
        .await
        .expect("sandboxed command timed out")
        .expect("wait on sandboxed command");

    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn read_only() -> EffectiveSandboxConfig {
    EffectiveSandboxConfig { filesystem_mode: FilesystemMode::ReadOnly, network_mode: NetworkMode::Deny, ..EffectiveSandboxConfig::default() }
}

#[tokio::test]
async fn test_root_read() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_wrapped(&read_only(), dir.path(), &["ls", "-l", "/bin"], 2_000).await;
    assert_eq!(code, 0, "stdout:\n{stdout}\nstderr:\n{stderr}");
}

#[tokio::test]
async fn test_root_write_denied() {
    let dir = tempfile::tempdir().unwrap();
    let tmpfile = PathBuf::from("/etc/should-not-be-writable-by-sandbox-test");
    let (code, _stdout, _stderr) = run_wrapped(
        &read_only(),
        dir.path(),
        &["bash", "-lc", &format!("echo blah > {}", tmpfile.display())],
        2_000,
    )
    .await;
    assert_ne!(code, 0);
}

#[tokio::test]
async fn test_writable_root() {
    let dir = tempfile::tempdir().unwrap();
    let effective = EffectiveSandboxConfig { filesystem_mode: FilesystemMode::WorkspaceWrite, network_mode: NetworkMode::Deny, ..EffectiveSandboxConfig::default() };
    let (code, stdout, stderr) = run_wrapped(&effective, dir.path(), &["bash", "-lc", "echo blah > test.txt && cat test.txt"], 2_000).await;
    assert_eq!(code, 0, "stdout:\n{stdout}\nstderr:\n{stderr}");
    assert!(stdout.contains("blah"));
}

#[tokio::test]
async fn test_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let result = timeout(Duration::from_millis(300), async {
        run_wrapped(&read_only(), dir.path(), &["sleep", "5"], 10_000).await
    })
    .await;
    assert!(result.is_err(), "expected the harness timeout to fire before the sandboxed sleep finished");
}

async fn assert_network_blocked(cmd: &[&str]) {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_wrapped(&read_only(), dir.path(), cmd, 5_000).await;
    assert_ne!(code, 0, "network sandbox FAILED - {cmd:?} exited 0\nstdout:\n{stdout}\nstderr:\n{stderr}");
}

#[tokio::test]
async fn sandbox_blocks_curl() {
    assert_network_blocked(&["curl", "-I", "http://openai.com"]).await;
}

#[tokio::test]
async fn sandbox_blocks_wget() {
    assert_network_blocked(&["wget", "-qO-", "http://openai.com"]).await;
}

#[tokio::test]
async fn sandbox_blocks_ping() {
    assert_network_blocked(&["ping", "-c", "1", "8.8.8.8"]).await;
}

#[tokio::test]
async fn sandbox_blocks_nc() {
    assert_network_blocked(&["nc", "-z", "127.0.0.1", "80"]).await;
}

#[tokio::test]
async fn sandbox_blocks_dev_tcp_redirection() {
    assert_network_blocked(&["bash", "-c", "echo hi > /dev/tcp/127.0.0.1/80"]).await;
}

#[tokio::test]
async fn sandbox_allows_network_with_allow_all() {
    let dir = tempfile::tempdir().unwrap();
    let effective = EffectiveSandboxConfig { network_mode: NetworkMode::AllowAll, ..read_only() };
    let (code, _stdout, stderr) = run_wrapped(&effective, dir.path(), &["bash", "-lc", "exec 3<>/dev/tcp/127.0.0.1/1 2>/dev/null; true"], 2_000).await;
    assert_eq!(code, 0, "stderr:\n{stderr}");
}
