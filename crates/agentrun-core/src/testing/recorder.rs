//! JSONL recording of raw session events.
//!
//! Each line is a [`Record`]: `{"ts": <unix ms>, "type": ..., "data": ...}`.
//! The `type`/`data` pair is the runtime's own envelope, so a recording loads
//! straight back into a [`Script`](super::Script) for replay.

use agentrun_proto::RawEvent;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// A timestamped event line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unix timestamp in milliseconds when the event was recorded.
    pub ts: u64,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl Record {
    /// Creates a record for `event` stamped with the current time.
    pub fn new(event: &RawEvent) -> Self {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            ts,
            kind: event.kind.clone(),
            data: event.data.clone(),
        }
    }
}

/// Writes events to a JSONL output as they arrive.
///
/// Each record is flushed immediately so a crashed run still leaves a
/// readable prefix behind.
pub struct SessionRecorder<W> {
    writer: Mutex<W>,
}

impl<W: Write> SessionRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the output fails.
    pub fn record(&self, event: &RawEvent) -> io::Result<()> {
        let line = serde_json::to_string(&Record::new(event))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line)?;
        writer.flush()
    }

    /// Appends every event in order.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn record_all<'a>(&self, events: impl IntoIterator<Item = &'a RawEvent>) -> io::Result<()> {
        events.into_iter().try_for_each(|e| self.record(e))
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Writes a complete raw event log, e.g. `RunResult::raw_events`.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_jsonl<W: Write>(writer: W, events: &[RawEvent]) -> io::Result<()> {
    let recorder = SessionRecorder::new(writer);
    recorder.record_all(events)
}
