//! UI Flow Testing Agent
//!
//! A sequential loop over a language model and an MCP tool server:
//! - Context: append-only log re-sent to the model every turn
//! - Runner: model → tool → repeat until the sentinel
//! - Transcript: persisted record of tool calls
//! - Streaming: run progress as SSE frames

pub mod context;
pub mod runner;
pub mod streaming;
pub mod transcript;

pub use context::{Context, ContextEntry, CLOSING_NOTICE, SENTINEL};
pub use runner::{system_instruction, Agent, RunEvent, RunOutcome};
pub use streaming::{run_event_stream, StreamFrame};
pub use transcript::{Transcript, TranscriptEntry, TranscriptStore};
