//! Server environment configuration
//!
//! Everything the daemon reads from the process environment, with the
//! documented defaults. Ports may also arrive via CLI flags; the flags
//! win.

use std::path::PathBuf;

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 9999;

/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 9998;

/// Default HTTP body limit
pub const DEFAULT_BODY_LIMIT: &str = "20mb";

/// Default ask-tool timeout
pub const DEFAULT_ASK_TOOL_TIMEOUT_MS: u64 = 120_000;

/// Resolved server environment
#[derive(Debug, Clone)]
pub struct ServerEnv {
    /// HTTP port (`PORT`)
    pub port: u16,

    /// WebSocket port (`WS_PORT`)
    pub ws_port: u16,

    /// Finger home directory (`FINGER_HOME`)
    pub home: PathBuf,

    /// HTTP body limit in bytes (`FINGER_HTTP_BODY_LIMIT`)
    pub body_limit_bytes: usize,

    /// Ask-tool timeout (`FINGER_ASK_TOOL_TIMEOUT_MS`)
    pub ask_tool_timeout_ms: u64,

    /// Default dispatch source for `/api/v1/message`
    /// (`FINGER_PRIMARY_ORCHESTRATOR_TARGET`)
    pub primary_orchestrator_target: String,

    /// Whether `/api/v1/message` may dispatch straight to agents
    /// (`FINGER_ALLOW_DIRECT_AGENT_ROUTE`)
    pub allow_direct_agent_route: bool,
}

impl ServerEnv {
    /// Read the environment, falling back to documented defaults
    pub fn from_env() -> Self {
        let home = std::env::var("FINGER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home());
        Self {
            port: parse_var("PORT").unwrap_or(DEFAULT_HTTP_PORT),
            ws_port: parse_var("WS_PORT").unwrap_or(DEFAULT_WS_PORT),
            home,
            body_limit_bytes: std::env::var("FINGER_HTTP_BODY_LIMIT")
                .ok()
                .and_then(|v| parse_body_limit(&v))
                .unwrap_or_else(|| parse_body_limit(DEFAULT_BODY_LIMIT).unwrap()),
            ask_tool_timeout_ms: parse_var("FINGER_ASK_TOOL_TIMEOUT_MS")
                .unwrap_or(DEFAULT_ASK_TOOL_TIMEOUT_MS),
            primary_orchestrator_target: std::env::var("FINGER_PRIMARY_ORCHESTRATOR_TARGET")
                .unwrap_or_else(|_| "orchestrator".to_string()),
            allow_direct_agent_route: std::env::var("FINGER_ALLOW_DIRECT_AGENT_ROUTE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(true),
        }
    }

    /// Path of the persisted orchestration config
    pub fn orchestration_config_path(&self) -> PathBuf {
        self.home.join("orchestration.json")
    }
}

fn default_home() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".finger"))
        .unwrap_or_else(|_| PathBuf::from(".finger"))
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parse a human body-limit string: plain bytes, `kb`, `mb`, or `gb`
pub fn parse_body_limit(raw: &str) -> Option<usize> {
    let raw = raw.trim().to_lowercase();
    let (number, multiplier) = if let Some(stripped) = raw.strip_suffix("gb") {
        (stripped, 1024 * 1024 * 1024)
    } else if let Some(stripped) = raw.strip_suffix("mb") {
        (stripped, 1024 * 1024)
    } else if let Some(stripped) = raw.strip_suffix("kb") {
        (stripped, 1024)
    } else if let Some(stripped) = raw.strip_suffix('b') {
        (stripped, 1)
    } else {
        (raw.as_str(), 1)
    };
    number
        .trim()
        .parse::<usize>()
        .ok()
        .map(|n| n.saturating_mul(multiplier))
}
