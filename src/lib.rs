//! UI Flow Testing Agent
//!
//! Drives a browser-automation MCP server through Gemini function calling and
//! streams progress to HTTP clients as server-sent events.
//!
//! # Architecture
//!
//! ```text
//! HTTP client ──► /test (SSE) ──► Agent loop ──► Gemini API
//!                                    │
//!                                    ├── Schema sanitizer (once per run)
//!                                    ├── MCP session (stdio, per run)
//!                                    │     └── npx @executeautomation/playwright-mcp-server
//!                                    └── Transcript (JSON file per run)
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod gemini;
pub mod http;
pub mod mcp;
pub mod model;
pub mod schema;

pub use agent::{run_event_stream, Agent, RunEvent, RunOutcome, StreamFrame};
pub use config::{Config, LoopPolicy, ServerConfig, ToolServerConfig, TranscriptConfig};
pub use error::AgentError;
pub use gemini::GeminiClient;
pub use http::{AgentServer, AppState};
pub use mcp::{StdioConnector, StdioSession, ToolConnector, ToolDescriptor, ToolSession};
pub use model::{FunctionCall, FunctionDeclaration, ModelClient, ModelReply, ModelRequest, ModelResponse};
pub use schema::clean_schema;
