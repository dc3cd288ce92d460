//! Run Event Stream
//!
//! Turns a run into an ordered sequence of server-sent-event frames:
//! - every run event becomes a `data:` frame
//! - run failures and panics become a `data: Error: ...` frame
//! - a single close frame always comes last
//!
//! The run executes on its own task; a supervising task awaits it and sends
//! the close frame whatever the outcome.

use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use super::runner::{Agent, RunEvent};

/// Frame buffer between the run and the HTTP response
const FRAME_BUFFER: usize = 64;

/// A single SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Data(String),
    Close,
}

impl StreamFrame {
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Data(format!("Error: {}", message))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close)
    }

    /// Wire encoding: each payload line prefixed with `data: `, blank line after
    pub fn encode(&self) -> String {
        match self {
            Self::Data(payload) => {
                let mut out = String::with_capacity(payload.len() + 8);
                for line in payload.split('\n') {
                    out.push_str("data: ");
                    out.push_str(line.strip_suffix('\r').unwrap_or(line));
                    out.push('\n');
                }
                out.push('\n');
                out
            }
            Self::Close => "event: close\ndata: \n\n".to_string(),
        }
    }
}

impl From<RunEvent> for StreamFrame {
    fn from(event: RunEvent) -> Self {
        Self::Data(event.into_text())
    }
}

/// Start a run for `prompt` and stream its frames
pub fn run_event_stream(agent: Arc<Agent>, prompt: String) -> ReceiverStream<StreamFrame> {
    let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(supervise(agent, prompt, frames_tx));
    ReceiverStream::new(frames_rx)
}

async fn supervise(agent: Arc<Agent>, prompt: String, frames: mpsc::Sender<StreamFrame>) {
    let (events_tx, mut events_rx) = mpsc::channel::<RunEvent>(FRAME_BUFFER);

    let run = tokio::spawn(async move { agent.run(&prompt, &events_tx).await });

    // Ends once the run task drops its sender, on success, error or panic
    while let Some(event) = events_rx.recv().await {
        let _ = frames.send(event.into()).await;
    }

    let failure = match run.await {
        Ok(Ok(outcome)) => {
            info!(
                "Run {} finished in {}ms: iterations={}, model_calls={}, tool_calls={}",
                outcome.run_id,
                outcome.elapsed_ms(),
                outcome.iterations,
                outcome.model_calls,
                outcome.tool_calls
            );
            None
        }
        Ok(Err(e)) => {
            error!("Error in run: {}", e);
            Some(StreamFrame::error(e))
        }
        Err(e) => {
            let message = join_error_message(e);
            error!("Run task aborted: {}", message);
            Some(StreamFrame::error(message))
        }
    };

    if let Some(frame) = failure {
        let _ = frames.send(frame).await;
    }

    info!("Session closed.");
    let _ = frames.send(StreamFrame::Close).await;
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "run panicked".to_string()
    }
}
