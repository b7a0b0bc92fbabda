//! Replays recorded JSONL sessions through the driver and the normalizer.

use agentrun_core::testing::{Script, ScriptedConnector, write_jsonl};
use agentrun_core::{EventNormalizer, SessionDriver};
use agentrun_proto::{AgentConfig, PermissionStatus, RunResult, SubagentStatus};
use std::io::Cursor;
use std::path::PathBuf;

fn fixture(name: &str) -> Script {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    Script::from_file(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

fn normalize(script: &Script) -> RunResult {
    let mut normalizer = EventNormalizer::default();
    for event in script.session_events() {
        normalizer.consume(event);
    }
    normalizer.finalize()
}

#[tokio::test]
async fn test_create_file_fixture() {
    let driver = SessionDriver::new(ScriptedConnector::new(fixture("create_file.jsonl")));
    let result = driver
        .run(&AgentConfig::new("replay"), "Create hello.py that prints hello")
        .await
        .unwrap();

    assert!(result.success, "{}", result);
    assert_eq!(result.model_used.as_deref(), Some("gpt-5"));
    assert_eq!(result.final_response(), Some("done"));
    assert_eq!(result.turns.len(), 2);

    let call = &result.tool_calls_for("create_file")[0];
    assert_eq!(call.id, "1");
    assert_eq!(call.arguments["path"], "hello.py");
    assert_eq!(call.result.as_deref(), Some("ok"));
    assert_eq!(call.duration_ms, Some(12.5));

    assert_eq!(result.reasoning_traces.len(), 1);
    assert!(result.permission_requested);
    assert_eq!(result.permissions[0].status, PermissionStatus::Granted);
    let replies = driver.connector().replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].request_id, "perm-1");
    assert!(replies[0].approved);

    let usage = &result.usage[0];
    assert_eq!((usage.input_tokens, usage.output_tokens, usage.cache_read_tokens), (1200, 80, 400));
    assert_eq!(usage.reported_cost, Some(1.0));
    assert!((result.total_cost_usd() - 0.00235).abs() < 1e-9);

    // the unrecognized session.usage_info event is kept verbatim
    assert_eq!(result.raw_events.len(), 12);
    assert!(result.raw_events.iter().any(|e| e.kind == "session.usage_info"));
    assert!(result.anomalies.is_empty());
}

#[tokio::test]
async fn test_transport_reset_fixture() {
    let driver = SessionDriver::new(ScriptedConnector::new(fixture("transport_reset.jsonl")));
    let result = driver.run(&AgentConfig::new("replay"), "Run the tests").await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("transport reset"));
    let call = &result.tool_calls_for("run_command")[0];
    assert_eq!(call.id, "2");
    assert!(call.result.is_none());
    assert_eq!(result.open_tool_calls().len(), 1);
}

#[test]
fn test_subagent_fixture() {
    let result = normalize(&fixture("subagent_delegation.jsonl"));

    assert!(result.success);
    assert_eq!(result.subagent_invocations.len(), 2);

    let reviewer = &result.subagent_invocations[0];
    assert_eq!(reviewer.name, "code-reviewer");
    assert_eq!(reviewer.id, "sa-1");
    assert_eq!(reviewer.status, SubagentStatus::Completed);
    assert_eq!(reviewer.duration_ms, Some(2300.0));

    let writer = &result.subagent_invocations[1];
    assert_eq!(writer.status, SubagentStatus::Failed);
    assert_eq!(writer.error.as_deref(), Some("tool budget exhausted"));

    assert_eq!(result.usage.len(), 2);
    assert_eq!(result.total_tokens(), 1320);
    assert_eq!(result.reasoning_traces, vec!["reading app.py"]);
    assert_eq!(result.turns.len(), 2);
    assert_eq!(result.turns[0].tool_calls[0].name, "view");
    assert_eq!(
        result.final_response(),
        Some("Review done; tests could not be written.")
    );
}

#[test]
fn test_raw_log_round_trips_to_identical_result() {
    for name in ["create_file.jsonl", "transport_reset.jsonl", "subagent_delegation.jsonl"] {
        let first = normalize(&fixture(name));

        let mut recording = Vec::new();
        write_jsonl(&mut recording, &first.raw_events).unwrap();
        let replayed = normalize(&Script::from_reader(Cursor::new(recording)).unwrap());

        assert_eq!(first, replayed, "replay of {} diverged", name);
    }
}
