//! Run transcript
//!
//! The externally visible record of a run: every tool call with its
//! arguments and result, plus raw model replies when verbose.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::TranscriptConfig;
use crate::error::Result;
use crate::model::ModelReply;

/// One transcript record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    ToolCall {
        tool_name: String,
        args: Value,
        result: String,
    },
    ModelReply {
        #[serde(flatten)]
        reply: ModelReply,
    },
}

/// Transcript of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tool_call(&mut self, tool_name: &str, args: &Value, result: &str) {
        self.entries.push(TranscriptEntry::ToolCall {
            tool_name: tool_name.to_string(),
            args: args.clone(),
            result: result.to_string(),
        });
    }

    pub fn record_reply(&mut self, reply: &ModelReply) {
        self.entries.push(TranscriptEntry::ModelReply {
            reply: reply.clone(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Tool call entries only
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &Value, &str)> {
        self.entries.iter().filter_map(|e| match e {
            TranscriptEntry::ToolCall {
                tool_name,
                args,
                result,
            } => Some((tool_name.as_str(), args, result.as_str())),
            TranscriptEntry::ModelReply { .. } => None,
        })
    }

    /// Compact JSON, as streamed to the client
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// JSON with four-space indentation, as written to disk
    pub fn to_pretty_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Writes transcripts to disk
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    config: TranscriptConfig,
}

impl TranscriptStore {
    pub fn new(config: TranscriptConfig) -> Self {
        Self { config }
    }

    pub fn verbose(&self) -> bool {
        self.config.verbose
    }

    /// File the transcript of `run_id` goes to
    pub fn path_for(&self, run_id: &str) -> PathBuf {
        match &self.config.fixed_name {
            Some(name) => self.config.dir.join(name),
            None => self.config.dir.join(format!("transcript-{}.json", run_id)),
        }
    }

    /// Persist a transcript, returning where it was written
    pub async fn write(&self, run_id: &str, transcript: &Transcript) -> Result<PathBuf> {
        let path = self.path_for(run_id);
        ensure_parent(&path).await?;
        tokio::fs::write(&path, transcript.to_pretty_json()?).await?;

        info!(
            "Transcript written: run={}, entries={}, path={}",
            run_id,
            transcript.entries().len(),
            path.display()
        );
        Ok(path)
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}
