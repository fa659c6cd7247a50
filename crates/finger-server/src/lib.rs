// Finger Server - HTTP/WebSocket surface for the agent runtime broker
//
// Thin boundary over finger-runtime: axum routes translate JSON to the
// core's request types and back; the WebSocket server fans out every
// bus event and carries the input-lock frames.

pub mod env;
pub mod http;
pub mod ws;

use finger_runtime::AgentRuntime;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// The assembled runtime broker
    pub runtime: Arc<AgentRuntime>,

    /// Resolved server environment
    pub env: env::ServerEnv,
}

pub use env::ServerEnv;
