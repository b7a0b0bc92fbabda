//! End-to-end runs against a shell script standing in for the runtime CLI.

#![cfg(unix)]

use agentrun_adapters::ProcessConnector;
use agentrun_core::{ComparativeRunner, SessionDriver, Side, TIMEOUT_MARKER};
use agentrun_proto::{AgentConfig, Error};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn runtime(script: &str) -> ProcessConnector {
    ProcessConnector::new("sh")
        .with_args(["-c", script])
        .with_close_grace(Duration::from_secs(2))
}

const CREATE_FILE: &str = r#"
read -r create
read -r send
echo '{"type":"session.start","data":{"sessionId":"s-1","selectedModel":"gpt-5"}}'
echo 'runtime booting' >&2
echo '{"type":"permission.requested","data":{"requestId":"p-1","kind":"write","toolName":"create"}}'
read -r reply
echo "$reply"
echo '{"type":"tool.execution_start","data":{"toolCallId":"t1","toolName":"create","arguments":{"path":"out.txt"}}}'
printf 'hello' > out.txt
echo '{"type":"tool.execution_complete","data":{"toolCallId":"t1","success":true,"result":{"content":"created out.txt"}}}'
echo 'plain text the runtime printed'
echo '{"type":"assistant.message","data":{"content":"Created out.txt"}}'
echo '{"type":"session.idle","data":{}}'
"#;

#[tokio::test]
async fn test_full_session_over_stdio() {
    let dir = TempDir::new().unwrap();
    let config = AgentConfig::new("runtime").with_working_directory(dir.path());
    let driver = SessionDriver::new(runtime(CREATE_FILE));

    let result = driver.run(&config, "create out.txt").await.unwrap();

    assert!(result.success, "{result}");
    assert_eq!(result.model_used.as_deref(), Some("gpt-5"));
    assert_eq!(result.final_response(), Some("Created out.txt"));
    assert!(result.tool_was_called("create"));
    assert!(result.permission_requested);
    assert!(result.permissions[0].granted());
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hello");

    // The runtime echoed our reply back, so it arrived as a permission.reply envelope.
    let reply = result
        .raw_events
        .iter()
        .find(|e| e.kind == "permission.reply")
        .expect("reply echoed");
    assert_eq!(reply.data["requestId"], "p-1");
    assert_eq!(reply.data["approved"], true);

    assert!(result.raw_events.iter().any(|e| e.kind == "stdout.unparsed"));
}

#[tokio::test]
async fn test_runtime_exiting_early_is_a_disconnect() {
    let driver = SessionDriver::new(runtime(
        r#"read -r create; read -r send; echo '{"type":"assistant.message","data":{"content":"partial"}}'"#,
    ));
    let err = driver.run(&AgentConfig::new("a"), "task").await.unwrap_err();
    assert!(matches!(err, Error::Disconnected));
}

#[tokio::test]
async fn test_missing_runtime_is_a_connect_error() {
    let driver = SessionDriver::new(ProcessConnector::new("/nonexistent/agentrun-runtime"));
    let err = driver.run(&AgentConfig::new("a"), "task").await.unwrap_err();
    assert!(matches!(err, Error::Connect(_)));
}

#[tokio::test]
async fn test_hung_runtime_times_out_and_is_stopped() {
    let driver = SessionDriver::new(runtime(
        r#"read -r create; read -r send
echo '{"type":"tool.execution_start","data":{"toolCallId":"t1","toolName":"bash","arguments":{"command":"sleep 30"}}}'
exec sleep 30"#,
    ));
    let config = AgentConfig::new("a").with_timeout(Duration::from_millis(300));
    let started = Instant::now();

    let result = driver.run(&config, "task").await.unwrap();

    assert!(result.timed_out);
    assert_eq!(result.error.as_deref(), Some(TIMEOUT_MARKER));
    assert_eq!(result.open_tool_calls().len(), 1);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_paired_processes_write_to_their_own_directories() {
    let script = r#"
read -r create
read -r send
echo '{"type":"session.start","data":{}}'
pwd > where.txt
echo '{"type":"assistant.message","data":{"content":"ok"}}'
echo '{"type":"session.idle","data":{}}'
"#;
    let runner = ComparativeRunner::new(SessionDriver::new(runtime(script)));

    let pair = runner
        .run_pair(
            &AgentConfig::new("baseline"),
            &AgentConfig::new("treatment").with_model("gpt-5"),
            "where are you",
        )
        .await
        .unwrap();

    assert!(pair.baseline.success);
    assert!(pair.treatment.success);
    for side in [Side::Baseline, Side::Treatment] {
        let dir = pair.workspace(side).path();
        let written = std::fs::read_to_string(dir.join("where.txt")).unwrap();
        assert_eq!(std::path::Path::new(written.trim()), dir);
    }
    assert_ne!(
        pair.workspace(Side::Baseline).path(),
        pair.workspace(Side::Treatment).path()
    );
}
