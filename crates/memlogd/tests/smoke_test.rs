//! Smoke tests for the memlogd binary
//!
//! These tests start the real daemon on sockets in a temporary directory,
//! feed it through `memlogd send` and the client helpers, and read back with
//! `memlogd read` and the query client.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use memlogd_core::{LogMode, QueryClient, open_log_stream};
use tokio::time::timeout;

const BIN: &str = env!("CARGO_BIN_EXE_memlogd");
const PROMPT: Duration = Duration::from_secs(10);

/// A daemon running for the duration of a test
struct Daemon {
    _dir: tempfile::TempDir,
    log_socket: PathBuf,
    query_socket: PathBuf,
    child: Child,
}

impl Daemon {
    fn start(extra: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_socket = dir.path().join("log.sock");
        let query_socket = dir.path().join("query.sock");

        let child = Command::new(BIN)
            .arg("--socket-log")
            .arg(&log_socket)
            .arg("--socket-query")
            .arg(&query_socket)
            .arg("--no-echo")
            .args(extra)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to start memlogd");

        let daemon = Self {
            _dir: dir,
            log_socket,
            query_socket,
            child,
        };
        daemon.wait_for_sockets();
        daemon
    }

    fn wait_for_sockets(&self) {
        let deadline = Instant::now() + PROMPT;
        while !(self.log_socket.exists() && self.query_socket.exists()) {
            assert!(Instant::now() < deadline, "memlogd did not create its sockets");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn read(&self, args: &[&str]) -> Output {
        Command::new(BIN)
            .arg("read")
            .arg("--socket-query")
            .arg(&self.query_socket)
            .args(args)
            .output()
            .unwrap()
    }

    fn send(&self, tag: &str, command: &[&str]) -> Output {
        Command::new(BIN)
            .arg("send")
            .arg("--socket-log")
            .arg(&self.log_socket)
            .arg("--tag")
            .arg(tag)
            .arg("--")
            .args(command)
            .output()
            .unwrap()
    }

    /// Run `memlogd read` until `needle` appears in the dump
    fn wait_for_dump(&self, needle: &str) -> String {
        let deadline = Instant::now() + PROMPT;
        loop {
            let output = self.read(&[]);
            assert!(output.status.success());
            let text = String::from_utf8(output.stdout).unwrap();
            if text.contains(needle) {
                return text;
            }
            assert!(Instant::now() < deadline, "{needle:?} never appeared in:\n{text}");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn terminate(&mut self) -> std::process::ExitStatus {
        let status = Command::new("kill")
            .arg("-TERM")
            .arg(self.child.id().to_string())
            .status()
            .unwrap();
        assert!(status.success());

        let deadline = Instant::now() + PROMPT;
        loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                return status;
            }
            assert!(Instant::now() < deadline, "memlogd did not exit");
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn message_lines<'a>(dump: &'a str, tag: &str) -> Vec<&'a str> {
    dump.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ' ');
            let _ts = parts.next()?;
            (parts.next()? == tag).then(|| parts.next().unwrap_or_default())
        })
        .collect()
}

fn assert_gone(path: &Path) {
    assert!(!path.exists(), "{} was not removed", path.display());
}

// ============================================================================
// CLI round trip
// ============================================================================

#[test]
fn test_send_command_then_read() {
    let daemon = Daemon::start(&[]);

    let output = daemon.send("greeter", &["sh", "-c", "echo hello; echo world >&2"]);
    assert!(output.status.success(), "send failed: {output:?}");

    let dump = daemon.wait_for_dump("world");
    let messages = message_lines(&dump, "greeter");
    assert!(messages.contains(&"hello"));
    assert!(messages.contains(&"world"));
    assert!(dump.contains(" memlogd memlogd started"));
}

#[test]
fn test_send_failing_command_reports_status() {
    let daemon = Daemon::start(&[]);

    let output = daemon.send("failing", &["sh", "-c", "echo before failing; exit 3"]);
    assert!(!output.status.success());

    daemon.wait_for_dump("before failing");
}

#[test]
fn test_read_source_filter() {
    let daemon = Daemon::start(&[]);

    assert!(daemon.send("alpha", &["echo", "from alpha"]).status.success());
    assert!(daemon.send("beta", &["echo", "from beta"]).status.success());
    daemon.wait_for_dump("from beta");
    daemon.wait_for_dump("from alpha");

    let output = daemon.read(&["--source", "alpha"]);
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("from alpha"));
    assert!(!text.contains("from beta"));
}

#[test]
fn test_max_lines_bounds_dump() {
    let daemon = Daemon::start(&["--max-lines", "10"]);

    assert!(
        daemon
            .send("counter", &["sh", "-c", "i=0; while [ $i -lt 20 ]; do echo line$i; i=$((i+1)); done"])
            .status
            .success()
    );

    let dump = daemon.wait_for_dump("line19");
    assert_eq!(dump.lines().count(), 10);
    assert_eq!(
        message_lines(&dump, "counter"),
        (10..20).map(|i| format!("line{i}")).collect::<Vec<_>>()
    );
}

#[test]
fn test_sigterm_removes_sockets() {
    let mut daemon = Daemon::start(&[]);

    let status = daemon.terminate();
    assert!(status.success());
    assert_gone(&daemon.log_socket);
    assert_gone(&daemon.query_socket);
}

#[test]
fn test_sigterm_with_open_producer() {
    let mut daemon = Daemon::start(&[]);

    let mut held = open_log_stream(&daemon.log_socket, "held").unwrap();
    held.write_all(b"hello\n").unwrap();
    daemon.wait_for_dump("hello");

    // The producer stays open across shutdown
    let status = daemon.terminate();
    assert!(status.success());
    assert_gone(&daemon.log_socket);
    assert_gone(&daemon.query_socket);
    drop(held);
}

#[test]
fn test_many_idle_producers() {
    let daemon = Daemon::start(&[]);

    // More than tokio's default blocking pool size
    let idle: Vec<_> = (0..520)
        .map(|i| open_log_stream(&daemon.log_socket, &format!("idle{i}")).unwrap())
        .collect();

    let mut late = open_log_stream(&daemon.log_socket, "late").unwrap();
    late.write_all(b"late line\n").unwrap();

    let dump = daemon.wait_for_dump("late line");
    assert_eq!(message_lines(&dump, "late"), vec!["late line"]);
    drop(idle);
}

// ============================================================================
// Library clients against the binary
// ============================================================================

#[tokio::test]
async fn test_follow_client_sees_live_lines() {
    let daemon = Daemon::start(&[]);

    let mut follower = QueryClient::connect(&daemon.query_socket, LogMode::Follow)
        .await
        .unwrap();
    // Dumps are served in connection order, so once this returns the
    // follower is registered
    let _ = daemon.read(&[]);

    let mut stream = open_log_stream(&daemon.log_socket, "live").unwrap();
    stream.write_all(b"first\nsecond\n").unwrap();

    for expected in ["first", "second"] {
        let entry = timeout(PROMPT, follower.next_entry())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(entry.source, "live");
        assert_eq!(entry.message, expected);
    }
}

#[tokio::test]
async fn test_long_lines_truncated() {
    let daemon = Daemon::start(&["--max-line-len", "16"]);

    let mut stream = open_log_stream(&daemon.log_socket, "wide").unwrap();
    stream.write_all(&[b'x'; 100]).unwrap();
    stream.write_all(b"\nshort\n").unwrap();
    drop(stream);

    let dump = daemon.wait_for_dump("short");
    assert_eq!(message_lines(&dump, "wide"), vec!["x".repeat(16).as_str(), "short"]);
}
