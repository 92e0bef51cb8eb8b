use axum::{
    body::Bytes,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{MessageResponse, QueryRequest, QueryResponse, StatusResponse};
use crate::error::ApiError;
use agent_core::AgentAdapter;

pub const API_KEY_HEADER: &str = "x-api-key";

// Shared, read-only for the life of the process
#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<AgentAdapter>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(adapter: AgentAdapter, api_key: Option<String>) -> Self {
        Self {
            adapter: Arc::new(adapter),
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/agent/query", post(query_agent))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(health_check))
        .route("/healthz", get(health_check))
        .route("/hello", get(hello))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- HANDLERS ---

async fn health_check() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn hello() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello from Cloud Run!",
    })
}

async fn query_agent(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    let question = parse_question(&body)?;
    let answer = state.adapter.ask(&question).await?;

    info!("Answered question with {} chars", answer.chars().count());
    Ok(Json(QueryResponse { question, answer }))
}

// Empty, non-JSON, non-string and blank all count as "missing"
fn parse_question(body: &[u8]) -> Result<String, ApiError> {
    serde_json::from_slice::<QueryRequest>(body)
        .ok()
        .and_then(|req| req.question)
        .filter(|q| !q.trim().is_empty())
        .ok_or(ApiError::MissingQuestion)
}

// --- AUTH ---

async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Fail closed when the secret itself is missing.
    let Some(expected) = state.api_key.as_deref() else {
        warn!("Rejected {}: API_KEY is not configured", req.uri().path());
        return Err(ApiError::ServerKeyMissing);
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !constant_time_eq(provided, expected) {
        warn!("Rejected {}: bad or missing {}", req.uri().path(), API_KEY_HEADER);
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
