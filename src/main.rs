//! UI Flow Testing Agent - Entry Point
//!
//! Modes:
//! - Default: HTTP server (`/test`, `/health`)
//! - --run / -r <prompt>: one run, frames printed to stdout

use futures_util::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uiflow_agent::{run_event_stream, AgentServer, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let run_prompt = args
        .iter()
        .position(|a| a == "--run" || a == "-r")
        .map(|i| args.get(i + 1).cloned());

    if help_mode {
        println!("uiflow-agent v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: uiflow-agent [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --run, -r <prompt>  Run one UI flow test and print SSE frames");
        println!("  --help, -h          Show this help");
        println!();
        println!("Default: Run the HTTP server");
        println!();
        println!("Environment variables:");
        println!("  GEMINI_API_KEY            Gemini API key");
        println!("  GEMINI_API_BASE           Gemini API base URL");
        println!("  AGENT_MODEL               Model id (default: gemini-2.0-flash)");
        println!("  AGENT_TEMPERATURE         Sampling temperature (default: 0)");
        println!("  AGENT_TOOL_COMMAND        Tool server command (default: npx)");
        println!("  AGENT_TOOL_ARGS           Tool server args");
        println!("  AGENT_MAX_ITERATIONS      Loop cap (default: unbounded)");
        println!("  AGENT_RETRY_BACKOFF_MS    Sleep after failed iterations (default: 0)");
        println!("  AGENT_TRANSCRIPT_DIR      Transcript directory (default: .)");
        println!("  AGENT_TRANSCRIPT_FILE     Fixed transcript file name");
        println!("  AGENT_TRANSCRIPT_VERBOSE  Record raw model replies");
        println!("  AGENT_BIND_ADDR           HTTP bind address (default: 127.0.0.1)");
        println!("  AGENT_PORT                HTTP port (default: 8000)");
        println!("  AGENT_LOG_REQUESTS        HTTP request tracing (default: true)");
        println!("  AGENT_LOG_FORMAT          'json' for JSON logs");
        return Ok(());
    }

    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);
    let json_logs = std::env::var("AGENT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // stderr keeps stdout clean for --run frames
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let state = AppState::from_config(&config);

    match run_prompt {
        Some(Some(prompt)) => {
            info!("uiflow-agent v{} - single run", env!("CARGO_PKG_VERSION"));

            let agent = state
                .agent
                .clone()
                .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

            let mut frames = run_event_stream(Arc::clone(&agent), prompt);
            let mut stdout = std::io::stdout();
            while let Some(frame) = frames.next().await {
                stdout.write_all(frame.encode().as_bytes())?;
                stdout.flush()?;
            }
        }
        Some(None) => anyhow::bail!("--run requires a prompt"),
        None => {
            info!("uiflow-agent v{}", env!("CARGO_PKG_VERSION"));
            info!("Tool server: {}", config.tool_server.command_line());

            AgentServer::new(config.server.clone(), state).run().await?;
        }
    }

    Ok(())
}
