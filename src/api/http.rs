//! HTTP API Server
//!
//! JSON endpoints polled by browsers: state reads and updates, leader
//! claims, heartbeats, presence listing, reset and health.

use std::future::Future;
use std::sync::Arc;
use axum::{
    extract::{DefaultBodyLimit, Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::Millis;
use crate::config::ApiConfig;
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::state::PresenceSnapshot;

/// Request fields consumed by a state update and never merged into state
const POST_STATE_ROUTING_FIELDS: &[&str] = &["browserId", "heartbeatTs"];

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    coordinator: Arc<Coordinator>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, coordinator: Arc<Coordinator>) -> Self {
        Self { config, coordinator }
    }

    /// Create the router
    pub fn router(config: &ApiConfig, coordinator: Arc<Coordinator>) -> Router {
        let router = Router::new()
            // Browser operations
            .route("/api/state", get(handle_get_state).post(handle_post_state))
            .route("/api/claim-leader", post(handle_claim_leader))
            .route("/api/heartbeat", post(handle_heartbeat))
            .route("/api/browsers", get(handle_browsers))
            // Admin operations
            .route("/api/reset", post(handle_reset))
            .route("/health", get(handle_health))
            .with_state(coordinator)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CatchPanicLayer::new())
                    .layer(DefaultBodyLimit::max(config.max_body_bytes)),
            );

        if config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(&self.config, Arc::clone(&self.coordinator));

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// Query string for state reads
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateQuery {
    pub browser_id: Option<String>,
    pub tag: Option<String>,
}

/// Leadership claim request
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLeaderRequest {
    pub browser_id: Option<String>,
    pub timestamp: Option<Millis>,
    #[serde(default)]
    pub force: bool,
    pub tag: Option<String>,
}

/// Heartbeat request
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub browser_id: Option<String>,
    pub tag: Option<String>,
    #[serde(default)]
    pub is_leader_claim: bool,
}

/// Response carrying a success flag and the presence snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub success: bool,
    pub browsers: PresenceSnapshot,
}

/// Leadership claim response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimLeaderResponse {
    pub success: bool,
    pub leader_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub browsers: PresenceSnapshot,
}

/// Reset response
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Error wrapper mapping coordinator errors onto HTTP statuses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!("Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code: self.0.code().to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============ Handlers ============

async fn handle_get_state(
    State(coordinator): State<Arc<Coordinator>>,
    Query(query): Query<StateQuery>,
) -> ApiResult<crate::coordinator::StateView> {
    let view = coordinator
        .get_state(query.browser_id.as_deref(), query.tag.as_deref())
        .await?;
    Ok(Json(view))
}

async fn handle_post_state(
    State(coordinator): State<Arc<Coordinator>>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<PresenceResponse> {
    let (browser_id, heartbeat_ts, payload) = split_state_update(body)?;

    let browsers = coordinator
        .post_state(browser_id.as_deref(), heartbeat_ts, &payload)
        .await?;

    Ok(Json(PresenceResponse {
        success: true,
        browsers,
    }))
}

async fn handle_claim_leader(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<ClaimLeaderRequest>,
) -> ApiResult<ClaimLeaderResponse> {
    let result = coordinator
        .claim_leader(
            req.browser_id.as_deref(),
            req.timestamp,
            req.force,
            req.tag.as_deref(),
        )
        .await?;

    let reason = match result.outcome {
        crate::state::ClaimOutcome::Rejected { reason, .. } => Some(reason),
        _ => None,
    };

    Ok(Json(ClaimLeaderResponse {
        success: reason.is_none(),
        leader_id: result.leader_id,
        reason,
        browsers: result.browsers,
    }))
}

async fn handle_heartbeat(
    State(coordinator): State<Arc<Coordinator>>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<PresenceResponse> {
    let browsers = coordinator
        .heartbeat(req.browser_id.as_deref(), req.tag.as_deref(), req.is_leader_claim)
        .await?;

    Ok(Json(PresenceResponse {
        success: true,
        browsers,
    }))
}

async fn handle_browsers(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    Json(coordinator.browsers().await)
}

async fn handle_reset(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    coordinator.reset().await;
    Json(ResetResponse {
        success: true,
        message: "State reset to defaults".to_string(),
    })
}

async fn handle_health(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    Json(coordinator.health().await)
}

// ============ Helpers ============

/// Split a state update body into caller id, heartbeat timestamp and the
/// payload to merge
fn split_state_update(
    body: serde_json::Value,
) -> Result<(Option<String>, Option<Millis>, serde_json::Value)> {
    let serde_json::Value::Object(mut fields) = body else {
        return Err(Error::MalformedPayload("request body must be a JSON object".into()));
    };

    let browser_id = fields
        .get("browserId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let heartbeat_ts = match fields.get("heartbeatTs") {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(value.as_u64().ok_or_else(|| {
            Error::MalformedPayload(format!(
                "heartbeatTs must be a non-negative integer, got {}",
                value
            ))
        })?),
    };

    for field in POST_STATE_ROUTING_FIELDS {
        fields.remove(*field);
    }

    Ok((browser_id, heartbeat_ts, serde_json::Value::Object(fields)))
}
