//! Configuration management
//!
//! Built once at process start and shared read-only by every run.

use anyhow::Result;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TOOL_COMMAND: &str = "npx";
pub const DEFAULT_TOOL_ARGS: &[&str] = &["-y", "@executeautomation/playwright-mcp-server"];

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key (runs are refused without it)
    pub gemini_api_key: Option<String>,

    /// Gemini API base URL
    pub gemini_api_base: String,

    /// Model id
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Tool process launch parameters
    pub tool_server: ToolServerConfig,

    /// Retry and iteration policy for the conversation loop
    pub policy: LoopPolicy,

    /// Where transcripts are written
    pub transcript: TranscriptConfig,

    /// HTTP listener settings
    pub server: ServerConfig,
}

/// Command used to launch the MCP tool server for each run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TOOL_COMMAND.to_string(),
            args: DEFAULT_TOOL_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ToolServerConfig {
    /// Human readable command line, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Loop policy
///
/// The defaults keep the loop unbounded with no backoff: a run only ends when
/// the model emits the sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopPolicy {
    /// Maximum model round trips per run (None = unbounded)
    pub max_iterations: Option<usize>,
    /// Sleep after an iteration that recorded an error
    pub retry_backoff: Duration,
}

/// Transcript persistence settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptConfig {
    /// Directory transcripts are written into
    pub dir: PathBuf,
    /// Fixed file name shared by all runs; per-run names when unset
    pub fixed_name: Option<String>,
    /// Also record raw model replies
    pub verbose: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            fixed_name: None,
            verbose: false,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: 127.0.0.1)
    pub bind_addr: IpAddr,
    /// Port number (default: 8000)
    pub port: u16,
    /// Enable request logging
    pub log_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
            log_requests: true,
        }
    }
}

impl ServerConfig {
    /// Get the socket address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Check if bound to localhost only
    pub fn is_localhost(&self) -> bool {
        self.bind_addr.is_loopback()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            tool_server: ToolServerConfig::default(),
            policy: LoopPolicy::default(),
            transcript: TranscriptConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.gemini_api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty());

        if let Some(base) = lookup("GEMINI_API_BASE") {
            config.gemini_api_base = base.trim_end_matches('/').to_string();
        }

        if let Some(model) = lookup("AGENT_MODEL") {
            config.model = model;
        }

        if let Some(temperature) = lookup("AGENT_TEMPERATURE") {
            config.temperature = temperature
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid AGENT_TEMPERATURE '{}': {}", temperature, e))?;
        }

        if let Some(command) = lookup("AGENT_TOOL_COMMAND") {
            config.tool_server.command = command;
        }

        if let Some(args) = lookup("AGENT_TOOL_ARGS") {
            config.tool_server.args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Some(max) = lookup("AGENT_MAX_ITERATIONS") {
            let max: usize = max
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid AGENT_MAX_ITERATIONS '{}': {}", max, e))?;
            config.policy.max_iterations = (max > 0).then_some(max);
        }

        if let Some(ms) = lookup("AGENT_RETRY_BACKOFF_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid AGENT_RETRY_BACKOFF_MS '{}': {}", ms, e))?;
            config.policy.retry_backoff = Duration::from_millis(ms);
        }

        if let Some(dir) = lookup("AGENT_TRANSCRIPT_DIR") {
            config.transcript.dir = PathBuf::from(dir);
        }

        config.transcript.fixed_name = lookup("AGENT_TRANSCRIPT_FILE").filter(|n| !n.is_empty());

        if let Some(val) = lookup("AGENT_TRANSCRIPT_VERBOSE") {
            config.transcript.verbose = parse_flag(&val);
        }

        if let Some(addr) = lookup("AGENT_BIND_ADDR") {
            config.server.bind_addr = addr
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid AGENT_BIND_ADDR '{}': {}", addr, e))?;
        }

        if let Some(port) = lookup("AGENT_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid AGENT_PORT '{}': {}", port, e))?;
        }

        if let Some(val) = lookup("AGENT_LOG_REQUESTS") {
            config.server.log_requests = parse_flag(&val);
        }

        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set - /test will refuse to start runs");
        }

        Ok(config)
    }
}

fn parse_flag(val: &str) -> bool {
    val == "true" || val == "1"
}
