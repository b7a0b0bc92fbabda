//! Paired baseline/treatment runs.

use agentrun_core::testing::{Script, ScriptedConnector};
use agentrun_core::{ComparativeRunner, PairError, PairExecution, SessionDriver, Side};
use agentrun_proto::{AgentConfig, Error, SessionEvent};
use std::collections::BTreeSet;
use std::path::Path;

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn writer_script(file: &str, reply: &str) -> Script {
    Script::new()
        .write_file(file, format!("written by {}", reply))
        .event(SessionEvent::tool_started("1", "create_file", serde_json::json!({"path": file})))
        .event(SessionEvent::tool_completed("1", "ok"))
        .event(SessionEvent::text(reply))
        .event(SessionEvent::session_completed())
}

fn runner(connector: ScriptedConnector) -> ComparativeRunner<ScriptedConnector> {
    ComparativeRunner::new(SessionDriver::new(connector))
}

#[tokio::test]
async fn test_sides_never_see_each_others_files() {
    let connector = ScriptedConnector::new(Script::new())
        .with_script("baseline", writer_script("baseline.txt", "baseline done"))
        .with_script("treatment", writer_script("treatment.txt", "treatment done"));
    let runner = runner(connector);

    let pair = runner
        .run_pair(
            &AgentConfig::new("baseline"),
            &AgentConfig::new("treatment"),
            "write a file",
        )
        .await
        .unwrap();

    assert!(pair.baseline.success);
    assert!(pair.treatment.success);
    assert_eq!(pair.baseline.final_response(), Some("baseline done"));
    assert_eq!(pair.treatment.final_response(), Some("treatment done"));

    let baseline_dir = pair.workspace(Side::Baseline).path();
    let treatment_dir = pair.workspace(Side::Treatment).path();
    assert_ne!(baseline_dir, treatment_dir);
    assert!(pair.workspace(Side::Baseline).is_temporary());
    assert_eq!(file_names(baseline_dir), BTreeSet::from(["baseline.txt".to_string()]));
    assert_eq!(file_names(treatment_dir), BTreeSet::from(["treatment.txt".to_string()]));

    // each session was opened with its own working directory
    let opened = runner.driver().connector().opened_configs();
    let dirs: BTreeSet<_> = opened
        .iter()
        .map(|c| c.working_directory.clone().unwrap())
        .collect();
    assert_eq!(dirs.len(), 2);
    assert_eq!(runner.driver().connector().sent_tasks().len(), 2);
}

#[tokio::test]
async fn test_configured_directories_are_used_when_disjoint() {
    let root = tempfile::tempdir().unwrap();
    let baseline = AgentConfig::new("baseline").with_working_directory(root.path().join("a"));
    let treatment = AgentConfig::new("treatment").with_working_directory(root.path().join("b"));
    let connector = ScriptedConnector::new(Script::new())
        .with_script("baseline", writer_script("out.txt", "a"))
        .with_script("treatment", writer_script("out.txt", "b"));

    let pair = runner(connector)
        .with_execution(PairExecution::Sequential)
        .run_pair(&baseline, &treatment, "task")
        .await
        .unwrap();

    assert!(!pair.workspace(Side::Baseline).is_temporary());
    let a = std::fs::read_to_string(root.path().join("a/out.txt")).unwrap();
    let b = std::fs::read_to_string(root.path().join("b/out.txt")).unwrap();
    assert_eq!(a, "written by a");
    assert_eq!(b, "written by b");
}

#[tokio::test]
async fn test_overlapping_directories_fail_before_any_session() {
    let root = tempfile::tempdir().unwrap();
    let baseline = AgentConfig::new("baseline").with_working_directory(root.path());
    let treatment =
        AgentConfig::new("treatment").with_working_directory(root.path().join("nested"));
    let runner = runner(ScriptedConnector::new(writer_script("x.txt", "x")));

    let err = runner.run_pair(&baseline, &treatment, "task").await.unwrap_err();

    assert!(matches!(err, PairError::Workspace(_)));
    assert!(runner.driver().connector().opened_configs().is_empty());
}

#[tokio::test]
async fn test_one_side_failing_fails_the_pair() {
    let connector = ScriptedConnector::new(writer_script("x.txt", "fine")).refusing("treatment");
    let runner = runner(connector);

    let err = runner
        .run_pair(
            &AgentConfig::new("baseline"),
            &AgentConfig::new("treatment"),
            "task",
        )
        .await
        .unwrap_err();

    match err {
        PairError::Session { side, source } => {
            assert_eq!(side, Side::Treatment);
            assert!(matches!(source, Error::Connect(_)));
        }
        other => panic!("Expected Session error, got {:?}", other),
    }
    // the healthy side still ran to completion and was closed
    assert_eq!(runner.driver().connector().closed_sessions(), 1);
}

#[tokio::test]
async fn test_sequential_pair_stops_after_baseline_failure() {
    let connector = ScriptedConnector::new(writer_script("x.txt", "fine"))
        .with_script("baseline", Script::new().disconnect());
    let runner = runner(connector).with_execution(PairExecution::Sequential);

    let err = runner
        .run_pair(
            &AgentConfig::new("baseline"),
            &AgentConfig::new("treatment"),
            "task",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PairError::Session { side: Side::Baseline, .. }));
    assert_eq!(runner.driver().connector().opened_configs().len(), 1);
}

#[tokio::test]
async fn test_each_side_gets_its_own_policy() {
    let script = Script::new().events([
        SessionEvent::confirmation("p1", "shell", Some("bash")),
        SessionEvent::session_completed(),
    ]);
    let runner = runner(ScriptedConnector::new(script));

    let pair = runner
        .run_pair(
            &AgentConfig::new("baseline"),
            &AgentConfig::new("treatment").with_auto_confirm(false),
            "task",
        )
        .await
        .unwrap();

    assert!(pair.baseline.permissions[0].granted());
    assert!(!pair.treatment.permissions[0].granted());
    assert!(pair.treatment.permission_requested);
    assert_eq!(runner.driver().connector().replies().len(), 1);
}
