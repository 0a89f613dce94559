/// Integration tests for the ollama-bench binary.
use httpmock::prelude::*;
use serde_json::json;
use std::process::{Command, Output};

fn bench(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ollama-bench"))
        .args(args)
        .env_remove("OLLAMA_HOST")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_run_prints_summary() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).body("Ollama is running");
    });
    server.mock(|when, then| {
        when.method(POST).path("/api/generate");
        then.status(200)
            .json_body(json!({ "eval_count": 3, "total_duration": 5_000_000u64 }));
    });

    let host = server.base_url();
    let output = bench(&[
        "run", "--model", "llama3:8b", "--host", &host, "-n", "6", "-c", "3", "--quiet",
    ]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8(output.stdout).unwrap();
    for key in [
        "timestamp",
        "model",
        "host",
        "concurrency",
        "requests",
        "prompt_len",
        "tokens",
        "p50_latency",
        "p95_latency",
        "rps",
        "error_rate",
        "total_time",
    ] {
        assert!(
            stdout.contains(&format!("{:>15}: ", key)),
            "summary should contain {}",
            key
        );
    }
    assert!(stdout.contains("       requests: 6"));
    assert!(stdout.contains("     error_rate: 0.0000"));
}

#[test]
fn test_run_json_output() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(POST).path("/api/generate");
        then.status(503).body("busy");
    });

    let host = server.base_url();
    let output = bench(&[
        "run", "--model", "m", "--host", &host, "-n", "2", "--format", "json", "--quiet",
    ]);

    assert!(
        output.status.success(),
        "Per-request failures should not change the exit code"
    );
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["error_rate"], 1.0);
    assert!(value["p50_latency"].is_null());
}

#[test]
fn test_invalid_request_count_exits_nonzero() {
    let output = bench(&["run", "--model", "m", "-n", "0", "--no-preflight"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Configuration error"));
}

#[test]
fn test_malformed_host_exits_nonzero() {
    let output = bench(&["run", "--model", "m", "--host", "localhost:11434"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Invalid host URL") || stderr.contains("must use http"));
}

#[test]
fn test_unreachable_host_exits_nonzero() {
    let output = bench(&["run", "--model", "m", "--host", "http://127.0.0.1:9", "--quiet"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("not reachable"));
}

#[test]
fn test_sweep_reports_levels() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(POST).path("/api/generate");
        then.status(200).json_body(json!({ "eval_count": 1 }));
    });

    let host = server.base_url();
    let output = bench(&[
        "sweep", "--model", "m", "--host", &host, "-c", "1", "2", "-n", "4",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("  1c | p95="));
    assert!(stdout.contains("  2c | p95="));
    assert!(stdout.contains("No degradation detected"));
}
