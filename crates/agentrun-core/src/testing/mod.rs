//! Test doubles for deterministic session tests.
//!
//! A [`Script`] is an ordered list of steps a fake runtime performs.
//! [`ScriptedConnector`] serves scripts as sessions and records what the
//! driver sent, so tests can assert on both sides of the conversation.
//! [`SessionRecorder`] writes raw event logs as JSONL that `Script` can load
//! back for replay.

mod recorder;
mod script;
mod scripted_connector;

pub use recorder::{Record, SessionRecorder, write_jsonl};
pub use script::{Script, Step};
pub use scripted_connector::ScriptedConnector;
