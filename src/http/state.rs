//! Shared handler state

use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::agent::Agent;
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::mcp::StdioConnector;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// None when the model credential is missing
    pub agent: Option<Arc<Agent>>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Application version
    pub version: &'static str,
}

impl AppState {
    pub fn new(agent: Option<Arc<Agent>>) -> Self {
        Self {
            agent,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Wire the Gemini client and the stdio tool launcher from config
    pub fn from_config(config: &Config) -> Self {
        let agent = match GeminiClient::from_config(config) {
            Ok(model) => Some(Arc::new(Agent::new(
                config,
                Arc::new(model),
                Arc::new(StdioConnector::new(config.tool_server.clone())),
            ))),
            Err(e) => {
                warn!("Runs disabled: {}", e);
                None
            }
        };
        Self::new(agent)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
