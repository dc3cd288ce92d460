//! HTTP Surface
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             Agent Server                 │
//! ├──────────────────────────────────────────┤
//! │  GET  /health  → Liveness                │
//! │  GET  /test    → Run a UI flow (SSE)     │
//! │  POST /test    → Same, for HTTP clients  │
//! │                  that drop GET bodies    │
//! └──────────────────────────────────────────┘
//! ```

pub mod api;
pub mod server;
pub mod state;

pub use api::{api_router, ErrorResponse, HealthResponse, TestRequest};
pub use server::AgentServer;
pub use state::AppState;
