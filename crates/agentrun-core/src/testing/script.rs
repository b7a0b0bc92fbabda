//! Scripted event sequences.

use agentrun_proto::{RawEvent, SessionEvent};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One action of a scripted runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Deliver an event.
    Event(SessionEvent),
    /// Wait before the next step.
    Delay(Duration),
    /// Write a file, relative paths resolved against the session's
    /// working directory.
    WriteFile { path: PathBuf, contents: String },
    /// Fail the transport.
    Disconnect,
    /// Never deliver anything again.
    Stall,
}

/// An ordered list of steps. Reaching the end closes the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, event: SessionEvent) -> Self {
        self.steps.push(Step::Event(event));
        self
    }

    pub fn events(mut self, events: impl IntoIterator<Item = SessionEvent>) -> Self {
        self.steps.extend(events.into_iter().map(Step::Event));
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Delay(duration));
        self
    }

    pub fn write_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.steps.push(Step::WriteFile {
            path: path.into(),
            contents: contents.into(),
        });
        self
    }

    pub fn disconnect(mut self) -> Self {
        self.steps.push(Step::Disconnect);
        self
    }

    pub fn stall(mut self) -> Self {
        self.steps.push(Step::Stall);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// The events of this script, without the other steps.
    pub fn session_events(&self) -> Vec<SessionEvent> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// Loads a script from a JSONL event log.
    ///
    /// Each non-blank line is a `{"type", "data"}` envelope; extra fields such
    /// as a recorder timestamp are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is not a JSON
    /// envelope.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Loads a script from JSONL data. See [`from_file`](Self::from_file).
    ///
    /// # Errors
    ///
    /// Returns an error on read failure or an invalid line.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut script = Self::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawEvent = serde_json::from_str(&line).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {}: {}", index + 1, e),
                )
            })?;
            script = script.event(SessionEvent::decode(raw));
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_from_reader_skips_blank_lines_and_ignores_ts() {
        let jsonl = r#"{"ts":1000,"type":"assistant.message","data":{"content":"hi"}}

{"type":"session.idle","data":{}}
"#;
        let script = Script::from_reader(Cursor::new(jsonl)).unwrap();
        assert_eq!(
            script.session_events(),
            vec![SessionEvent::text("hi"), SessionEvent::session_completed()]
        );
    }

    #[test]
    fn test_from_reader_reports_bad_line() {
        let jsonl = "{\"type\":\"session.idle\",\"data\":{}}\nnot json\n";
        let err = Script::from_reader(Cursor::new(jsonl)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().starts_with("line 2:"));
    }

    #[test]
    fn test_builder_keeps_step_order() {
        let script = Script::new()
            .event(SessionEvent::text("a"))
            .delay(Duration::from_millis(5))
            .write_file("out.txt", "x")
            .disconnect();
        assert_eq!(script.steps().len(), 4);
        assert!(matches!(script.steps()[1], Step::Delay(_)));
        assert_eq!(script.steps()[3], Step::Disconnect);
    }
}
