//! Run context
//!
//! Append-only log of everything that happened in a run. The whole log is
//! rendered into every prompt, so it only ever grows.

use serde_json::Value;

/// Completion phrase the model is told to emit
pub const SENTINEL: &str = "Analysis Done";

/// Appended to the final text before it is streamed
pub const CLOSING_NOTICE: &str = "Returning the report now..";

/// One entry of the run context
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEntry {
    /// Free text from the model
    Utterance(String),
    /// Error marker fed back to the model
    Error(String),
    /// Tool invocation and its stringified result
    ToolCall {
        name: String,
        args: Value,
        result: String,
    },
    /// Sentinel seen; the run is over
    Sentinel,
}

impl ContextEntry {
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error(format!("Error: {}", message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Ordered context for one run
#[derive(Debug, Clone, Default)]
pub struct Context {
    entries: Vec<ContextEntry>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            ContextEntry::Error(msg) => Some(msg.as_str()),
            _ => None,
        })
    }

    pub fn tool_calls(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, ContextEntry::ToolCall { .. }))
            .count()
    }

    /// Render the log as the text appended to the prompt
    pub fn render(&self) -> String {
        let items: Vec<String> = self.entries.iter().map(render_entry).collect();
        format!("[{}]", items.join(", "))
    }
}

fn render_entry(entry: &ContextEntry) -> String {
    match entry {
        ContextEntry::Utterance(text) | ContextEntry::Error(text) => quote(text),
        ContextEntry::ToolCall { name, args, result } => serde_json::json!({
            "name": name,
            "args": args,
            "result": result,
        })
        .to_string(),
        ContextEntry::Sentinel => quote(SENTINEL),
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}
