use axum::{
    Json, Router,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::auth;
use crate::agent::ChatPipeline;
use crate::config::AstralConfig;
use crate::error::{ChatError, ValidationError};
use crate::types::{ChatReply, ChatRequest, MemoryItem, NewMemory};

const DEFAULT_MEMORY_LIMIT: usize = 5;
const MAX_MEMORY_LIMIT: usize = 100;

pub struct AppState {
    pub token: Option<String>,
    pub pipeline: ChatPipeline,
}

impl AppState {
    pub fn new(pipeline: ChatPipeline, token: Option<String>) -> Self {
        Self { token, pipeline }
    }
}

pub async fn run(config: AstralConfig, token: Option<String>) -> anyhow::Result<()> {
    let is_loopback = is_loopback(&config.gateway.bind);

    if !is_loopback && token.is_none() {
        anyhow::bail!(
            "Auth token required when binding to non-loopback address. \
             Set --token or ASTRAL_TOKEN env var."
        );
    }

    let pipeline = ChatPipeline::from_config(&config)?;
    let state = Arc::new(AppState::new(pipeline, token));
    let app = build_router(state, &config.gateway.cors_origins);

    let bind = config.gateway.bind.as_str();
    let listener = tokio::net::TcpListener::bind((bind, config.gateway.port)).await?;
    let addr = listener.local_addr()?;

    info!("astral gateway listening on {addr}");
    if is_loopback {
        info!("bound to loopback, local access only");
    } else {
        warn!("bound to {addr}, bearer token required on API routes");
    }

    axum::serve(listener, app).await?;
    Ok(())
}

/// All HTTP routes. `/health` is always open; the API routes require the
/// bearer token when one is configured.
pub fn build_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .route("/chat", post(chat))
        .route("/memory", get(list_memory).post(add_memory))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_token,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn is_loopback(bind: &str) -> bool {
    match bind.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback(),
        Err(_) => bind.eq_ignore_ascii_case("localhost"),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !auth::verify_bearer(presented, state.token.as_deref()) {
        warn!(path = %request.uri().path(), "rejected request without valid token");
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

async fn health() -> &'static str {
    "ok"
}

async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = payload?;
    let reply = state.pipeline.chat(request).await?;
    Ok(Json(reply))
}

#[derive(Debug, Deserialize)]
struct MemoryQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_memory(
    State(state): State<Arc<AppState>>,
    params: Result<Query<MemoryQuery>, QueryRejection>,
) -> Result<Json<Vec<MemoryItem>>, ApiError> {
    let Query(params) = params?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_MEMORY_LIMIT)
        .min(MAX_MEMORY_LIMIT);
    let query = params.query.unwrap_or_default();
    Ok(Json(state.pipeline.memory().retrieve_relevant(&query, limit)))
}

async fn add_memory(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewMemory>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = payload?;
    let (role, text) = body.parse()?;
    state.pipeline.memory().append(role, text);
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Error body returned by every API route: `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Malformed { status: StatusCode, message: String },
    Validation(ValidationError),
    Upstream,
    Unauthorized,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Validation(e) => ApiError::Validation(e),
            // Provider details are logged by the pipeline, never returned.
            ChatError::Provider(_) => ApiError::Upstream,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Malformed { status, message } => (status, message),
            ApiError::Validation(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ApiError::Upstream => (
                StatusCode::BAD_GATEWAY,
                "completion provider unavailable".to_string(),
            ),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
