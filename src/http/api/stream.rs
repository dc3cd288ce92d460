//! Server-Sent Events (SSE) run stream
//!
//! `/test` starts a run and streams its frames until the close event.
//! Problems found before the stream exists (bad body, no credential) are
//! answered with a JSON error payload instead.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::agent::{run_event_stream, StreamFrame};
use crate::error::AgentError;
use crate::http::state::AppState;

/// Body of a `/test` request
#[derive(Debug, Clone, Deserialize)]
pub struct TestRequest {
    pub prompt: String,
}

/// Structured error payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    fn respond(code: StatusCode, message: impl Into<String>) -> Response {
        let message = message.into();
        warn!("Rejecting /test request: {}", message);
        (
            code,
            Json(ErrorResponse {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}

/// Idle time before a heartbeat comment is sent
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// SSE comment line, ignored by clients
const HEARTBEAT: &str = ":heartbeat\n\n";

/// Encoded SSE body: every frame through `StreamFrame::encode`, with
/// heartbeat comments while the run is quiet. Ends after the close frame.
pub fn sse_body(frames: ReceiverStream<StreamFrame>) -> impl Stream<Item = Result<String, Infallible>> + Send {
    let heartbeat = interval_at(Instant::now() + KEEP_ALIVE, KEEP_ALIVE);

    stream::unfold(
        (frames, heartbeat, false),
        |(mut frames, mut heartbeat, closed): (ReceiverStream<StreamFrame>, Interval, bool)| async move {
            if closed {
                return None;
            }
            tokio::select! {
                biased;
                frame = frames.next() => {
                    let frame = frame?;
                    let closed = frame.is_close();
                    heartbeat.reset();
                    Some((Ok::<_, Infallible>(frame.encode()), (frames, heartbeat, closed)))
                }
                _ = heartbeat.tick() => Some((Ok::<_, Infallible>(HEARTBEAT.to_string()), (frames, heartbeat, false))),
            }
        },
    )
}

/// GET|POST /test - run a UI flow test and stream progress
pub async fn test_flow(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TestRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return ErrorResponse::respond(rejection.status(), rejection.body_text()),
    };

    if request.prompt.trim().is_empty() {
        return ErrorResponse::respond(StatusCode::BAD_REQUEST, "prompt must not be empty");
    }

    let Some(agent) = state.agent.clone() else {
        return ErrorResponse::respond(
            StatusCode::SERVICE_UNAVAILABLE,
            AgentError::MissingApiKey.to_string(),
        );
    };

    info!("Starting UI flow test ({} chars)", request.prompt.len());

    let frames = run_event_stream(agent, request.prompt);

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(sse_body(frames)),
    )
        .into_response()
}
