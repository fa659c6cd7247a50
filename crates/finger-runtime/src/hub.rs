//! Message hub - module-addressed request/reply
//!
//! Modules register a handler under an id; the hub presents a uniform
//! awaitable regardless of handler shape. The blocking-send path used
//! by the HTTP boundary layers an overall timeout plus bounded
//! exponential-backoff retries on top; the scheduler's own execution
//! path sends once and reports the failure.

use async_trait::async_trait;
use dashmap::DashMap;
use finger_core::{FingerError, FingerResult, ModuleDescriptor};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default overall timeout for blocking sends (10 minutes)
pub const DEFAULT_BLOCKING_TIMEOUT_MS: u64 = 600_000;

/// Default retry bound for blocking sends
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default base delay for exponential backoff
pub const DEFAULT_RETRY_BASE_MS: u64 = 750;

/// Backoff delay ceiling
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Handler a module registers with the hub
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Handle one payload and produce a reply
    async fn handle(&self, payload: Value) -> FingerResult<Value>;
}

/// Function-backed handler for closures and tests
pub struct FnModuleHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ModuleHandler for FnModuleHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = FingerResult<Value>> + Send,
{
    async fn handle(&self, payload: Value) -> FingerResult<Value> {
        (self.0)(payload).await
    }
}

struct Registration {
    descriptor: ModuleDescriptor,
    handler: Arc<dyn ModuleHandler>,
}

/// Route predicate evaluated against a payload
pub struct Route {
    /// Route name, for logging
    pub name: String,
    /// Module the route resolves to
    pub module_id: String,
    /// Predicate; the default fallback route always matches
    pub predicate: Box<dyn Fn(&Value) -> bool + Send + Sync>,
}

/// Retry/timeout knobs for blocking sends
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Overall deadline for a blocking send
    pub blocking_timeout_ms: u64,
    /// Retry attempts after the first failure
    pub max_retries: u32,
    /// Base backoff delay, doubled per attempt
    pub retry_base_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            blocking_timeout_ms: DEFAULT_BLOCKING_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
        }
    }
}

impl HubConfig {
    /// Read overrides from `FINGER_BLOCKING_MESSAGE_*` environment variables
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.parse().ok())
        }
        let defaults = Self::default();
        Self {
            blocking_timeout_ms: parse("FINGER_BLOCKING_MESSAGE_TIMEOUT_MS")
                .unwrap_or(defaults.blocking_timeout_ms),
            max_retries: parse("FINGER_BLOCKING_MESSAGE_MAX_RETRIES")
                .unwrap_or(defaults.max_retries),
            retry_base_ms: parse("FINGER_BLOCKING_MESSAGE_RETRY_BASE_MS")
                .unwrap_or(defaults.retry_base_ms),
        }
    }
}

/// Backoff delay for the given retry attempt (1-based), doubling from
/// the base and capped at 30 seconds.
pub fn backoff_delay_ms(attempt: u32, base_ms: u64) -> u64 {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Classify a failure message as retryable.
///
/// Retryable: connect/reset/timeout indicators and 5xx statuses.
/// Non-retryable: 4xx other than 408/409/425/429, and quota/auth
/// failures (`daily_cost_limit_exceeded`, `insufficient_quota`,
/// `unauthorized`, `forbidden`).
pub fn is_retryable_error(message: &str) -> bool {
    let msg = message.to_lowercase();

    for marker in [
        "daily_cost_limit_exceeded",
        "insufficient_quota",
        "unauthorized",
        "forbidden",
    ] {
        if msg.contains(marker) {
            return false;
        }
    }

    if let Some(status) = first_http_status(&msg) {
        return match status {
            500..=599 => true,
            408 | 409 | 425 | 429 => true,
            400..=499 => false,
            _ => false,
        };
    }

    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connect")
        || msg.contains("connection reset")
        || msg.contains("reset by peer")
        || msg.contains("econnreset")
        || msg.contains("econnrefused")
}

fn first_http_status(msg: &str) -> Option<u16> {
    let bytes = msg.as_bytes();
    let mut i = 0;
    while i + 2 < bytes.len() {
        if bytes[i].is_ascii_digit()
            && bytes[i + 1].is_ascii_digit()
            && bytes[i + 2].is_ascii_digit()
            && (i == 0 || !bytes[i - 1].is_ascii_digit())
            && (i + 3 >= bytes.len() || !bytes[i + 3].is_ascii_digit())
        {
            let status: u16 = msg[i..i + 3].parse().ok()?;
            if (100..=599).contains(&status) {
                return Some(status);
            }
        }
        i += 1;
    }
    None
}

/// Request/reply hub over named modules
pub struct MessageHub {
    modules: DashMap<String, Registration>,
    routes: RwLock<Vec<Route>>,
    config: HubConfig,
}

impl MessageHub {
    /// Create a hub with the given retry configuration
    pub fn new(config: HubConfig) -> Self {
        Self {
            modules: DashMap::new(),
            routes: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Register (or replace) a module handler
    pub fn register_module(&self, descriptor: ModuleDescriptor, handler: Arc<dyn ModuleHandler>) {
        debug!("registering module: {}", descriptor.id);
        self.modules.insert(
            descriptor.id.clone(),
            Registration {
                descriptor,
                handler,
            },
        );
    }

    /// Remove a module registration
    pub fn unregister_module(&self, module_id: &str) -> bool {
        self.modules.remove(module_id).is_some()
    }

    /// Whether a module is registered
    pub fn is_registered(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    /// Snapshot of all registered module descriptors
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        let mut descriptors: Vec<ModuleDescriptor> = self
            .modules
            .iter()
            .map(|r| r.value().descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    /// Add a route predicate; earlier routes win
    pub fn add_route(&self, route: Route) {
        self.routes.write().push(route);
    }

    /// Resolve a payload to a module id via route predicates, falling
    /// back to the given default module (the always-matching route).
    pub fn resolve_route(&self, payload: &Value, default_module_id: &str) -> String {
        for route in self.routes.read().iter() {
            if (route.predicate)(payload) {
                debug!("route '{}' matched -> {}", route.name, route.module_id);
                return route.module_id.clone();
            }
        }
        default_module_id.to_string()
    }

    /// Send a payload to a module and await its reply
    pub async fn send_to_module(&self, module_id: &str, payload: Value) -> FingerResult<Value> {
        let handler = self
            .modules
            .get(module_id)
            .map(|r| r.value().handler.clone())
            .ok_or_else(|| FingerError::not_found("module not found"))?;
        handler.handle(payload).await
    }

    /// Blocking send with the configured overall timeout and bounded
    /// exponential-backoff retries on retryable failures.
    pub async fn send_to_module_blocking(
        &self,
        module_id: &str,
        payload: Value,
    ) -> FingerResult<Value> {
        let deadline = Duration::from_millis(self.config.blocking_timeout_ms);
        let attempt_loop = async {
            let mut attempt: u32 = 0;
            loop {
                match self.send_to_module(module_id, payload.clone()).await {
                    Ok(reply) => return Ok(reply),
                    Err(err) => {
                        let message = err.to_string();
                        attempt += 1;
                        if attempt > self.config.max_retries || !is_retryable_error(&message) {
                            return Err(err);
                        }
                        let delay = backoff_delay_ms(attempt, self.config.retry_base_ms);
                        warn!(
                            "send to module '{}' failed (attempt {}): {}; retrying in {}ms",
                            module_id, attempt, message, delay
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        };

        match tokio::time::timeout(deadline, attempt_loop).await {
            Ok(result) => result,
            Err(_) => Err(FingerError::transport(format!(
                "blocking send to module '{}' timed out after {}ms",
                module_id, self.config.blocking_timeout_ms
            ))),
        }
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn echo_handler() -> Arc<dyn ModuleHandler> {
        Arc::new(FnModuleHandler(|payload: Value| async move {
            Ok(serde_json::json!({ "echo": payload }))
        }))
    }

    #[tokio::test]
    async fn test_send_to_registered_module() {
        let hub = MessageHub::default();
        hub.register_module(ModuleDescriptor::agent("executor-loop"), echo_handler());

        let reply = hub
            .send_to_module("executor-loop", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(reply["echo"]["text"], "hi");
    }

    #[tokio::test]
    async fn test_send_to_missing_module() {
        let hub = MessageHub::default();
        let err = hub
            .send_to_module("ghost", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "module not found");
    }

    #[tokio::test]
    async fn test_route_resolution_falls_back() {
        let hub = MessageHub::default();
        hub.add_route(Route {
            name: "review".to_string(),
            module_id: "reviewer-loop".to_string(),
            predicate: Box::new(|payload| payload.get("review").is_some()),
        });

        assert_eq!(
            hub.resolve_route(&serde_json::json!({"review": true}), "executor-loop"),
            "reviewer-loop"
        );
        assert_eq!(
            hub.resolve_route(&serde_json::json!({"text": "hi"}), "executor-loop"),
            "executor-loop"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_send_retries_transient_failures() {
        let hub = MessageHub::new(HubConfig {
            blocking_timeout_ms: 120_000,
            max_retries: 5,
            retry_base_ms: 750,
        });

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        hub.register_module(
            ModuleDescriptor::agent("flaky"),
            Arc::new(FnModuleHandler(move |_payload: Value| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(FingerError::transport("connection reset by peer"))
                    } else {
                        Ok(serde_json::json!({"ok": true}))
                    }
                }
            })),
        );

        let reply = hub
            .send_to_module_blocking("flaky", Value::Null)
            .await
            .unwrap();
        assert_eq!(reply["ok"], true);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_blocking_send_gives_up_on_non_retryable() {
        let hub = MessageHub::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        hub.register_module(
            ModuleDescriptor::agent("denied"),
            Arc::new(FnModuleHandler(move |_payload: Value| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FingerError::transport("unauthorized"))
                }
            })),
        );

        assert!(hub
            .send_to_module_blocking("denied", Value::Null)
            .await
            .is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay_ms(1, 750), 750);
        assert_eq!(backoff_delay_ms(2, 750), 1_500);
        assert_eq!(backoff_delay_ms(3, 750), 3_000);
        assert_eq!(backoff_delay_ms(10, 750), MAX_BACKOFF_MS);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable_error("connection reset by peer"));
        assert!(is_retryable_error("request timed out"));
        assert!(is_retryable_error("upstream returned status 503"));
        assert!(is_retryable_error("status 429 too many requests"));
        assert!(is_retryable_error("status 408 request timeout"));

        assert!(!is_retryable_error("status 404 not found"));
        assert!(!is_retryable_error("status 400 bad request"));
        assert!(!is_retryable_error("daily_cost_limit_exceeded"));
        assert!(!is_retryable_error("insufficient_quota for model"));
        assert!(!is_retryable_error("unauthorized"));
        assert!(!is_retryable_error("forbidden"));
        assert!(!is_retryable_error("malformed payload"));
    }
}
