//! HTTP route definitions

use std::time::{Duration, Instant};

use axum::{
    extract::{Extension, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use governor::clock::{Clock, DefaultClock};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{snapshot::EntityView, AgentView};
use crate::gateway::{RejectReason, SubmitOutcome};
use crate::http::middleware::{require_auth, AuthenticatedAgent};
use crate::scheduler::{AdmissionError, JoinProfile, MatchPhase, MatchStatus, PlayerHandle};
use crate::store::MatchResult;
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::handler::ws_handler;
use crate::ws::protocol::AgentCommand;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_NAME_LEN: usize = 32;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = match &state.config.client_origin {
        // Support multiple origins (comma-separated in CLIENT_ORIGIN)
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            CorsLayer::new().allow_origin(allowed)
        }
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler));

    // Agent routes (bearer token required)
    let agent_routes = Router::new()
        .route("/api/join", post(join_handler))
        .route("/api/state", get(state_handler))
        .route("/api/action", post(action_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(agent_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors)
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

// ============================================================================
// Health and status
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    match_id: Uuid,
    phase: MatchPhase,
    participants: usize,
    subscribers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.scheduler.status();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        match_id: status.match_id,
        phase: status.phase,
        participants: status.participants,
        subscribers: state.fanout.subscriber_count(),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: MatchStatus,
    server_time: u64,
    last_result: Option<MatchResult>,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.scheduler.status(),
        server_time: unix_millis(),
        last_result: state.scheduler.last_result().map(|r| (*r).clone()),
    })
}

// ============================================================================
// Agent endpoints
// ============================================================================

#[derive(Deserialize)]
struct JoinRequest {
    #[serde(default)]
    display_name: Option<String>,
    /// Opaque cosmetic/strategy metadata
    #[serde(default)]
    cosmetic: Option<serde_json::Value>,
}

async fn join_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAgent>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<PlayerHandle>, AppError> {
    if let Err(not_until) = state.join_limiter.check_key(&auth.agent_id) {
        return Err(AppError::RateLimited {
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
        });
    }

    let display_name = req
        .display_name
        .or_else(|| auth.claims.name.clone())
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("agent-{}", &auth.agent_id.simple().to_string()[..8]));
    if display_name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "display_name longer than {MAX_NAME_LEN} characters"
        )));
    }

    let cosmetic = state.cosmetics.resolve(auth.agent_id, req.cosmetic).await;
    let handle = state.scheduler.admit(
        auth.agent_id,
        JoinProfile {
            display_name,
            cosmetic,
        },
    )?;

    Ok(Json(handle))
}

#[derive(Serialize)]
struct StateResponse {
    phase: MatchPhase,
    #[serde(flatten)]
    view: AgentView,
}

async fn state_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAgent>,
) -> Json<StateResponse> {
    let slot = state.scheduler.current();
    let remaining_ms = slot.remaining_ms(unix_millis());

    Json(StateResponse {
        phase: slot.phase(),
        view: slot.latest().view_for(&auth.agent_id, remaining_ms),
    })
}

#[derive(Deserialize)]
struct ActionRequest {
    /// Defaults to the caller's own entity
    #[serde(default)]
    entity_id: Option<Uuid>,
    #[serde(flatten)]
    command: AgentCommand,
}

#[derive(Serialize)]
struct ActionResponse {
    accepted: bool,
    /// An earlier command in the same tick window was overwritten
    replaced: bool,
    tick: u64,
    /// Kinematic state as of the latest tick
    me: Option<EntityView>,
}

async fn action_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAgent>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let slot = state.scheduler.current();
    let entity_id = req.entity_id.unwrap_or(auth.agent_id);

    let outcome = state.gateway.submit(
        slot.as_ref(),
        auth.agent_id,
        entity_id,
        &req.command,
        Instant::now(),
        unix_millis(),
    );

    match outcome {
        SubmitOutcome::Accepted { replaced } => {
            let latest = slot.latest();
            Ok(Json(ActionResponse {
                accepted: true,
                replaced,
                tick: latest.tick,
                me: latest.entity(&entity_id).cloned(),
            }))
        }
        SubmitOutcome::RateLimited { retry_after } => Err(AppError::RateLimited { retry_after }),
        SubmitOutcome::Rejected(reason) => {
            info!(
                agent_id = %auth.agent_id,
                action = req.command.name(),
                reason = reason.code(),
                "Action rejected"
            );
            Err(AppError::Rejected(reason))
        }
    }
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Rejected(RejectReason),

    #[error("Too many requests, retry in {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Admission(e) => e.code(),
            AppError::Rejected(reason) => reason.code(),
            AppError::RateLimited { .. } => "rate_limited",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Admission(_) => StatusCode::CONFLICT,
            AppError::Rejected(reason) => match reason {
                RejectReason::NotOwner | RejectReason::NotJoined => StatusCode::FORBIDDEN,
                RejectReason::NotAlive | RejectReason::MatchNotRunning => StatusCode::CONFLICT,
                RejectReason::WrongArena | RejectReason::InvalidShape => StatusCode::BAD_REQUEST,
            },
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        if let AppError::RateLimited { retry_after } = &self {
            let retry_after_ms = retry_after.as_millis() as u64;
            body["retry_after_ms"] = retry_after_ms.into();
            // Retry-After is whole seconds, rounded up
            let secs = retry_after_ms.div_ceil(1000).max(1);
            return (
                self.status(),
                [(header::RETRY_AFTER, secs.to_string())],
                Json(body),
            )
                .into_response();
        }

        (self.status(), Json(body)).into_response()
    }
}
