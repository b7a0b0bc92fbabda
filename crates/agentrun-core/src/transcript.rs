//! Human-readable transcript of a run, for reviewers and LLM judges.

use agentrun_proto::{RunResult, ToolCall};
use serde_json::Value;

/// Arguments and results longer than this are cut off.
pub const MAX_FIELD_CHARS: usize = 2000;

const TRUNCATION_NOTE: &str = "\n... (truncated)";

/// Renders `result` as a plain-text transcript.
pub fn render(result: &RunResult) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "## Agent Session (model={})",
        result.model_used.as_deref().unwrap_or("default")
    ));
    lines.push(format!(
        "Duration: {:.0}ms | Turns: {} | Success: {}",
        result.duration_ms,
        result.turns.len(),
        result.success
    ));
    if let Some(error) = &result.error {
        lines.push(format!("Error: {}", error));
    }
    lines.push(String::new());

    if !result.reasoning_traces.is_empty() {
        lines.push("### Reasoning Traces".to_string());
        for (i, trace) in result.reasoning_traces.iter().enumerate() {
            lines.push(format!("  [{}] {}", i + 1, trace));
        }
        lines.push(String::new());
    }

    lines.push("### Conversation".to_string());
    for (i, turn) in result.turns.iter().enumerate() {
        lines.push(format!("--- Turn {} [{}] ---", i + 1, turn.role));
        if !turn.content.is_empty() {
            lines.push(turn.content.clone());
        }
        for call in &turn.tool_calls {
            push_tool_call(&mut lines, call);
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn push_tool_call(lines: &mut Vec<String>, call: &ToolCall) {
    let args = match &call.arguments {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    lines.push(format!("  >> Tool: {}", call.name));
    lines.push(format!("     Args: {}", truncate(&args)));
    if let Some(result) = &call.result {
        lines.push(format!("     Result: {}", truncate(result)));
    }
    if let Some(error) = &call.error {
        lines.push(format!("     Error: {}", error));
    }
}

/// Cuts `s` to [`MAX_FIELD_CHARS`] characters, on a char boundary.
fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_FIELD_CHARS) {
        Some((byte_index, _)) => format!("{}{}", &s[..byte_index], TRUNCATION_NOTE),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_proto::{Role, Turn};
    use serde_json::json;

    fn sample() -> RunResult {
        let mut turn = Turn::new(Role::Assistant, "Creating the file");
        turn.tool_calls.push(ToolCall {
            id: "1".into(),
            name: "create_file".into(),
            arguments: json!({"path": "hello.py"}),
            result: Some("ok".into()),
            error: None,
            duration_ms: None,
        });
        turn.tool_calls.push(ToolCall {
            id: "2".into(),
            name: "bash".into(),
            arguments: json!("python hello.py"),
            result: None,
            error: Some("exit 1".into()),
            duration_ms: None,
        });
        RunResult {
            success: false,
            error: Some("timeout".into()),
            model_used: Some("gpt-5".into()),
            duration_ms: 1234.4,
            turns: vec![Turn::new(Role::User, "make hello.py"), turn],
            reasoning_traces: vec!["Plan first".into()],
            ..RunResult::default()
        }
    }

    #[test]
    fn test_render_sections() {
        let text = render(&sample());
        assert!(text.starts_with("## Agent Session (model=gpt-5)\n"));
        assert!(text.contains("Duration: 1234ms | Turns: 2 | Success: false"));
        assert!(text.contains("Error: timeout"));
        assert!(text.contains("### Reasoning Traces\n  [1] Plan first"));
        assert!(text.contains("--- Turn 1 [user] ---\nmake hello.py"));
        assert!(text.contains("--- Turn 2 [assistant] ---\nCreating the file"));
        assert!(text.contains("  >> Tool: create_file\n     Args: {\n  \"path\": \"hello.py\"\n}"));
        assert!(text.contains("     Result: ok"));
        assert!(text.contains("     Args: python hello.py"));
        assert!(text.contains("     Error: exit 1"));
    }

    #[test]
    fn test_no_reasoning_section_when_empty() {
        let result = RunResult {
            success: true,
            ..RunResult::default()
        };
        let text = render(&result);
        assert!(!text.contains("Reasoning Traces"));
        assert!(!text.contains("Error:"));
        assert!(text.contains("model=default"));
    }

    #[test]
    fn test_truncate_long_values() {
        let long = "é".repeat(MAX_FIELD_CHARS + 10);
        let cut = truncate(&long);
        assert!(cut.ends_with("... (truncated)"));
        assert_eq!(cut.chars().filter(|c| *c == 'é').count(), MAX_FIELD_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}
