//! HTTP/JSON API routes
//!
//! Every handler translates JSON into the core's request types and
//! returns the core's discriminated result objects. Component errors
//! map to 400 for caller mistakes and 500 for internal trouble; the
//! core never panics across this boundary.

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use finger_core::{
    AgentRole, ControlRequest, DeployRequest, DispatchRequest, EventKind, FingerError,
    OrchestrationConfig, TaskPayload,
};
use finger_runtime::{load_orchestration_config, save_orchestration_config, CatalogLayer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/message", post(post_message))
        .route("/api/v1/agents/runtime-view", get(get_runtime_view))
        .route("/api/v1/agents/dispatch", post(post_dispatch))
        .route("/api/v1/agents/control", post(post_control))
        .route("/api/v1/agents/deploy", post(post_deploy))
        .route("/api/v1/agents/catalog", get(get_catalog))
        .route("/api/v1/tools", get(get_tools))
        .route(
            "/api/v1/tools/agents/:id/policy",
            get(get_tool_policy).put(put_tool_policy),
        )
        .route("/api/v1/workflow/pause", post(post_workflow_pause))
        .route("/api/v1/workflow/resume", post(post_workflow_resume))
        .route("/api/v1/workflow/input", post(post_workflow_input))
        .route("/api/v1/sessions/:id", get(get_session))
        .route("/api/v1/sessions/:id/messages", get(get_session_messages))
        .route("/api/v1/orchestration/config", post(post_orchestration_config))
        .route(
            "/api/v1/orchestration/config/switch",
            post(post_orchestration_switch),
        )
        .route("/api/v1/input-lock/:session_id", get(get_input_lock))
        .layer(RequestBodyLimitLayer::new(state.env.body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_status(err: &FingerError) -> StatusCode {
    if err.is_caller_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_body(err: &FingerError) -> Json<Value> {
    Json(json!({ "error": err.to_string() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest {
    target: String,
    message: TaskPayload,
    #[serde(default)]
    blocking: bool,
    #[serde(default)]
    session_id: Option<String>,
}

/// `POST /api/v1/message` - dispatch to a deployed agent, or send
/// straight to a module when no deployment matches
async fn post_message(
    State(state): State<AppState>,
    Json(body): Json<MessageRequest>,
) -> (StatusCode, Json<Value>) {
    if body.target.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "target is required" })),
        );
    }

    let is_deployed_agent = state
        .runtime
        .scheduler
        .latest_deployment(&body.target)
        .is_some();

    if is_deployed_agent && state.env.allow_direct_agent_route {
        let request = DispatchRequest {
            source_agent_id: "user".to_string(),
            target_agent_id: body.target.clone(),
            task: body.message,
            session_id: body.session_id,
            workflow_id: None,
            metadata: None,
            blocking: body.blocking,
            queue_on_busy: true,
            max_queue_wait_ms: None,
            assignment: None,
        };
        let result = state.runtime.scheduler.dispatch(request).await;
        let status = if result.ok {
            StatusCode::OK
        } else {
            StatusCode::BAD_REQUEST
        };
        return (
            status,
            Json(json!({
                "success": result.ok,
                "result": result.result,
                "error": result.error,
                "dispatchId": result.dispatch_id,
            })),
        );
    }

    // Module route: the payload goes to the hub as-is.
    if !state.runtime.hub.is_registered(&body.target) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "target module not found or not started" })),
        );
    }
    let payload = match body.message {
        TaskPayload::Text(text) => json!({ "text": text, "sessionId": body.session_id }),
        TaskPayload::Object(mut map) => {
            if let Some(session_id) = &body.session_id {
                map.entry("sessionId".to_string())
                    .or_insert_with(|| json!(session_id));
            }
            Value::Object(map)
        }
    };

    if body.blocking {
        match state
            .runtime
            .hub
            .send_to_module_blocking(&body.target, payload)
            .await
        {
            Ok(result) => (
                StatusCode::OK,
                Json(json!({ "success": true, "result": result })),
            ),
            Err(err) => (error_status(&err), error_body(&err)),
        }
    } else {
        let hub = state.runtime.hub.clone();
        let target = body.target.clone();
        tokio::spawn(async move {
            if let Err(err) = hub.send_to_module(&target, payload).await {
                tracing::warn!("background send to module '{}' failed: {}", target, err);
            }
        });
        (StatusCode::OK, Json(json!({ "success": true })))
    }
}

/// `GET /api/v1/agents/runtime-view`
async fn get_runtime_view(State(state): State<AppState>) -> Json<Value> {
    Json(state.runtime.scheduler.runtime_view())
}

/// `POST /api/v1/agents/dispatch`
async fn post_dispatch(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> Json<Value> {
    let result = state.runtime.scheduler.dispatch(request).await;
    Json(serde_json::to_value(result).unwrap_or(Value::Null))
}

/// `POST /api/v1/agents/control`
async fn post_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Json<Value> {
    let result = state.runtime.control.handle(request).await;
    Json(serde_json::to_value(result).unwrap_or(Value::Null))
}

/// `POST /api/v1/agents/deploy` - resolves the target session from the
/// agent's role when none is supplied: orchestrators land in the root
/// session, everyone else in a runtime child
async fn post_deploy(
    State(state): State<AppState>,
    Json(request): Json<DeployRequest>,
) -> (StatusCode, Json<Value>) {
    let session_id = match &request.session_id {
        Some(session_id) => session_id.clone(),
        None => {
            let root = state.runtime.sessions.ensure_orchestrator_root_session();
            let role = state
                .runtime
                .scheduler
                .definitions()
                .get(&request.agent_id)
                .map(|d| d.role)
                .unwrap_or(AgentRole::Executor);
            if role == AgentRole::Orchestrator {
                root.id
            } else {
                state
                    .runtime
                    .sessions
                    .ensure_runtime_child_session(&root, &request.agent_id)
                    .id
            }
        }
    };

    let view = state.runtime.scheduler.runtime_view();
    match state.runtime.scheduler.deploy(&request, &session_id) {
        Ok(deployment) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "deployment": deployment,
                "startupTargets": view["startupTargets"],
                "startupTemplates": view["startupTemplates"],
            })),
        ),
        Err(err) => (
            error_status(&err),
            Json(json!({
                "success": false,
                "error": err.to_string(),
                "startupTargets": view["startupTargets"],
                "startupTemplates": view["startupTemplates"],
            })),
        ),
    }
}

/// `GET /api/v1/agents/catalog?layer=summary|execution|governance|full`
async fn get_catalog(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let layer = CatalogLayer::parse(params.get("layer").map(|s| s.as_str()));
    Json(state.runtime.scheduler.catalog(layer))
}

/// `GET /api/v1/tools`
async fn get_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.runtime.tool_gate.tools() }))
}

/// `GET /api/v1/tools/agents/:id/policy`
async fn get_tool_policy(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Json<Value> {
    Json(json!({
        "agentId": agent_id,
        "policy": state.runtime.tool_gate.agent_policy(&agent_id),
        "access": state.runtime.tool_gate.resolve_tool_access(&agent_id),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolPolicyBody {
    #[serde(default)]
    whitelist: Option<Vec<String>>,
    #[serde(default)]
    blacklist: Option<Vec<String>>,
}

/// `PUT /api/v1/tools/agents/:id/policy` - atomic list replacement
async fn put_tool_policy(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<ToolPolicyBody>,
) -> Json<Value> {
    if let Some(whitelist) = body.whitelist {
        state
            .runtime
            .tool_gate
            .set_agent_tool_whitelist(&agent_id, whitelist);
    }
    if let Some(blacklist) = body.blacklist {
        state
            .runtime
            .tool_gate
            .set_agent_tool_blacklist(&agent_id, blacklist);
    }
    Json(json!({
        "agentId": agent_id,
        "access": state.runtime.tool_gate.resolve_tool_access(&agent_id),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowControlBody {
    #[serde(default)]
    workflow_id: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    hard: bool,
}

async fn workflow_control(
    state: &AppState,
    action: &str,
    body: WorkflowControlBody,
) -> (StatusCode, Json<Value>) {
    let request = ControlRequest {
        action: action.to_string(),
        target_agent_id: None,
        session_id: body.session_id,
        workflow_id: body.workflow_id,
        provider_id: None,
        hard: body.hard,
    };
    let result = state.runtime.control.handle(request).await;
    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(serde_json::to_value(result).unwrap_or(Value::Null)))
}

/// `POST /api/v1/workflow/pause`
async fn post_workflow_pause(
    State(state): State<AppState>,
    Json(body): Json<WorkflowControlBody>,
) -> (StatusCode, Json<Value>) {
    workflow_control(&state, "pause", body).await
}

/// `POST /api/v1/workflow/resume`
async fn post_workflow_resume(
    State(state): State<AppState>,
    Json(body): Json<WorkflowControlBody>,
) -> (StatusCode, Json<Value>) {
    workflow_control(&state, "resume", body).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowInputBody {
    session_id: String,
    text: String,
    #[serde(default)]
    client_id: Option<String>,
}

/// `POST /api/v1/workflow/input` - user input into a waiting workflow
async fn post_workflow_input(
    State(state): State<AppState>,
    Json(body): Json<WorkflowInputBody>,
) -> Json<Value> {
    state.runtime.bus.emit(
        EventKind::UserMessage,
        Some(body.session_id.clone()),
        None,
        json!({
            "sessionId": body.session_id,
            "text": body.text,
            "clientId": body.client_id,
        }),
    );
    Json(json!({ "success": true }))
}

/// `GET /api/v1/sessions/:id`
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.runtime.sessions.get(&session_id) {
        Some(record) => (
            StatusCode::OK,
            Json(serde_json::to_value(record).unwrap_or(Value::Null)),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "session not found" })),
        ),
    }
}

/// `GET /api/v1/sessions/:id/messages` - transcript storage is an
/// external collaborator; the broker serves the session shell
async fn get_session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.runtime.sessions.get(&session_id) {
        Some(_) => (
            StatusCode::OK,
            Json(json!({ "sessionId": session_id, "messages": [] })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "session not found" })),
        ),
    }
}

/// `POST /api/v1/orchestration/config` - validate, apply, persist
async fn post_orchestration_config(
    State(state): State<AppState>,
    Json(config): Json<OrchestrationConfig>,
) -> (StatusCode, Json<Value>) {
    match state.runtime.applier.apply(&config) {
        Ok(outcome) => {
            let path = state.env.orchestration_config_path();
            if let Err(err) = save_orchestration_config(&path, &config) {
                return (error_status(&err), error_body(&err));
            }
            info!("orchestration config applied and persisted");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "outcome": outcome })),
            )
        }
        Err(err) => (error_status(&err), error_body(&err)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchBody {
    active_profile_id: String,
}

/// `POST /api/v1/orchestration/config/switch` - re-apply the persisted
/// config under a different active profile
async fn post_orchestration_switch(
    State(state): State<AppState>,
    Json(body): Json<SwitchBody>,
) -> (StatusCode, Json<Value>) {
    let path = state.env.orchestration_config_path();
    let mut config = match load_orchestration_config(&path) {
        Ok(config) => config,
        Err(err) => return (error_status(&err), error_body(&err)),
    };
    config.active_profile_id = body.active_profile_id;
    match state.runtime.applier.apply(&config) {
        Ok(outcome) => {
            if let Err(err) = save_orchestration_config(&path, &config) {
                return (error_status(&err), error_body(&err));
            }
            (
                StatusCode::OK,
                Json(json!({ "success": true, "outcome": outcome })),
            )
        }
        Err(err) => (error_status(&err), error_body(&err)),
    }
}

/// `GET /api/v1/input-lock/:sessionId`
async fn get_input_lock(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let lock = state.runtime.input_locks.state(&session_id);
    Json(serde_json::to_value(lock).unwrap_or(Value::Null))
}
