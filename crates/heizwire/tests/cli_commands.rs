#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/heizwire-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn heizwire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_heizwire"))
        .args(["--log-level", "error"])
        .args(args)
        .env_remove("HEIZWIRE_PORT")
        .env_remove("HEIZWIRE_BAUD")
        .output()
        .expect("heizwire should run")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

#[test]
fn replay_prints_each_message_as_json() {
    let dir = unique_temp_dir("replay");
    let capture = dir.join("capture.bin");
    std::fs::write(&capture, b"A;22;1;%;B;22;1;%;trailing").expect("capture should be writable");

    let output = heizwire(&["--format", "json", "replay", capture.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let messages = json_lines(&output);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["body"], "A");
    assert_eq!(messages[0]["sequence"], 1);
    assert_eq!(messages[1]["body"], "B");
    assert_eq!(messages[1]["size"], 9);
}

#[test]
fn replay_with_custom_terminator_and_raw_output() {
    let dir = unique_temp_dir("replay-raw");
    let capture = dir.join("capture.txt");
    std::fs::write(&capture, b"one|two|thr").expect("capture should be writable");

    let output = heizwire(&[
        "--format",
        "raw",
        "replay",
        capture.to_str().unwrap(),
        "--terminator",
        "|",
    ]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"one|two|");
}

#[test]
fn replay_rejects_oversized_message() {
    let dir = unique_temp_dir("replay-cap");
    let capture = dir.join("capture.bin");
    std::fs::write(&capture, b"0123456789012345678901234567890123456789;22;1;%;")
        .expect("capture should be writable");

    let output = heizwire(&[
        "--format",
        "json",
        "replay",
        capture.to_str().unwrap(),
        "--max-message-size",
        "16",
    ]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("too large"));
}

#[test]
fn replay_missing_file_is_transport_error() {
    let output = heizwire(&["replay", "/nonexistent/heizwire/capture.bin"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn listen_without_port_is_config_error() {
    let dir = unique_temp_dir("listen-config");
    let config = dir.join("service.json");
    std::fs::write(&config, r#"{"serial_port": {"baud_rate": 57600}}"#)
        .expect("config should be writable");

    let output = heizwire(&["listen", "--config", config.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("location"));
}

#[test]
fn listen_with_zero_baud_is_config_error() {
    let output = heizwire(&["listen", "--port", "/dev/null", "--baud", "0"]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn listen_with_bad_duration_is_usage_error() {
    let output = heizwire(&["listen", "--port", "/dev/null", "--shutdown-timeout", "0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn listen_on_non_tty_is_transport_error() {
    let dir = unique_temp_dir("listen-file");
    let not_a_tty = dir.join("plain.bin");
    std::fs::write(&not_a_tty, b"").expect("file should be writable");

    let output = heizwire(&["listen", "--port", not_a_tty.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn replay_appends_log_events_to_log_file() {
    let dir = unique_temp_dir("log-file");
    let capture = dir.join("capture.bin");
    let log = dir.join("logs").join("heizwire.log");
    std::fs::write(&capture, b"A;22;1;%;").expect("capture should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_heizwire"))
        .args(["--log-level", "info", "--log-file", log.to_str().unwrap()])
        .args(["--format", "raw", "replay", capture.to_str().unwrap()])
        .output()
        .expect("heizwire should run");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(output.stdout, b"A;22;1;%;");

    let logged = std::fs::read_to_string(&log).expect("log file should exist");
    assert!(logged.contains("replay finished"), "log file: {logged}");
    assert!(String::from_utf8_lossy(&output.stderr).contains("replay finished"));
}

#[test]
fn version_prints_package_version() {
    let output = heizwire(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("heizwire {}", env!("CARGO_PKG_VERSION"))
    );
}
