//! Demo HTTP control surface (`SPEC_FULL.md` §6 "Demo control surface").
//!
//! Stands in for "the HTTP control surface that toggles tracing" the spec
//! lists as an external collaborator (§1). Every route is a thin wrapper
//! over one of the four control entry points in `trace::registry` /
//! `trace::context`; this module carries no authentication (§7 Non-goals:
//! authorization is out of scope) and no persistence. Shaped after
//! `cognitod::api`'s `AppState` + `all_routes(Arc<AppState>)` pattern.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use log::warn;
use serde::Deserialize;

use crate::config::Config;
use crate::engine::Output;
use crate::metrics::Metrics;
use crate::trace::registry::LimitKind;
use crate::trace::{new_context, NewContextArgs, TraceRegistry};

/// Shared state every route handler receives via `State`.
pub struct AppState {
    pub registry: Arc<TraceRegistry>,
    pub config: Config,
    /// The outer engine's registered outputs, scanned during `context_new`
    /// for the recognized telemetry sink (spec §4.3 step 5). Read-only from
    /// this module's point of view — nothing here ever mutates it.
    pub outer_outputs: Vec<Arc<dyn Output>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, outer_outputs: Vec<Arc<dyn Output>>) -> Self {
        Self {
            registry: Arc::new(TraceRegistry::new()),
            config,
            outer_outputs,
            metrics: Arc::new(Metrics::new()),
        }
    }
}

#[derive(Deserialize)]
pub struct ContextNewRequest {
    pub output_kind: String,
    #[serde(default = "default_trace_prefix")]
    pub trace_prefix: String,
    #[serde(default)]
    pub output_user_data: String,
    #[serde(default)]
    pub output_properties: HashMap<String, String>,
}

fn default_trace_prefix() -> String {
    "t".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKindRequest {
    Time,
    Count,
}

#[derive(Deserialize)]
pub struct SetLimitRequest {
    pub kind: LimitKindRequest,
    pub arg: u64,
}

/// `POST /inputs/:name/trace` — spec §6 `context_new`.
async fn context_new(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<ContextNewRequest>,
) -> impl IntoResponse {
    let result = new_context(
        &state.registry,
        &state.config,
        &state.outer_outputs,
        NewContextArgs {
            host_input: &name,
            output_kind: &req.output_kind,
            trace_prefix: &req.trace_prefix,
            output_user_data: &req.output_user_data,
            output_properties: req.output_properties,
        },
    );
    match result {
        Ok(()) => {
            state.metrics.record_context_created();
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"status": "created", "host_input": name})),
            )
        }
        Err(err) => {
            warn!("context_new({name}) failed: {err}");
            let status = match err {
                crate::trace::TraceError::Disabled => StatusCode::FORBIDDEN,
                crate::trace::TraceError::ConfigurationMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(serde_json::json!({"error": err.to_string()})))
        }
    }
}

/// `DELETE /inputs/:name/trace` — spec §6 `context_destroy`.
async fn context_destroy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    state.registry.request_destroy(&name);
    state.metrics.record_context_destroyed();
    StatusCode::NO_CONTENT
}

/// `POST /inputs/:name/trace/limit` — spec §6 `context_set_limit`.
async fn set_limit(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<SetLimitRequest>,
) -> impl IntoResponse {
    let kind = match req.kind {
        LimitKindRequest::Time => LimitKind::Time(req.arg),
        LimitKindRequest::Count => LimitKind::Count(req.arg),
    };
    match state.registry.set_limit(&name, kind) {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            warn!("set_limit({name}) failed: {err}");
            StatusCode::NOT_FOUND
        }
    }
}

/// `GET /inputs/:name/trace/hit-limit` — spec §6 `context_hit_limit`.
async fn hit_limit(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<serde_json::Value> {
    let hit = state.registry.context_hit_limit(&name);
    if hit {
        state.metrics.record_limit_hit();
    }
    Json(serde_json::json!({"host_input": name, "hit": hit}))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub fn all_routes(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/inputs/{name}/trace", post(context_new).delete(context_destroy))
        .route("/inputs/{name}/trace/limit", post(set_limit))
        .route("/inputs/{name}/trace/hit-limit", get(hit_limit))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        all_routes(Arc::new(AppState::new(Config::default(), Vec::new())))
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let response = router()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn context_lifecycle_over_http() {
        let app = router();
        let body = serde_json::json!({"output_kind": "null", "trace_prefix": "t"}).to_string();
        let create = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/inputs/demo/trace")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(create.status(), StatusCode::CREATED);

        let hit = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/inputs/demo/trace/hit-limit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(hit.status(), StatusCode::OK);

        let destroy = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/inputs/demo/trace")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(destroy.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn context_new_on_disabled_config_is_forbidden() {
        let state = Arc::new(AppState::new(
            Config {
                enable_trace: false,
                ..Config::default()
            },
            Vec::new(),
        ));
        let app = all_routes(state);
        let body = serde_json::json!({"output_kind": "null"}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/inputs/demo/trace")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
