use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fr_api_contract::validation::validate_generate_request;
use fr_api_contract::{GenerateRequest, GenerateResponse};
use fr_client_api::FlowRun;
use tracing::{error, info};

use crate::service::ApiError;
use crate::sse::{proxy_events, sse_response};

pub use crate::service::AppState;

/// Health endpoint path.
pub const HEALTH_PATH: &str = "/health";
/// Prompt endpoint path.
pub const GENERATE_PATH: &str = "/generate";

pub fn health_routes() -> Router<AppState> {
    Router::new().route(HEALTH_PATH, get(health))
}

pub fn generate_routes() -> Router<AppState> {
    Router::new().route(GENERATE_PATH, post(generate))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(generate_routes())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn generate(
    State(st): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_generate_request(&req)?;

    let request = st
        .target
        .request(req.prompt, req.input_type, req.output_type, req.stream);

    let run = st.api.start_run(&request).await.map_err(|e| {
        error!(error = %e, "Error generating response");
        ApiError::from(e)
    })?;

    match run {
        FlowRun::Completed(response) => {
            let message = response.message_text()?.to_string();
            Ok(Json(GenerateResponse {
                message,
                session_id: response.session_id.clone(),
            })
            .into_response())
        }
        FlowRun::Streaming { response, events } => {
            info!(session_id = ?response.session_id, "proxying flow stream");
            Ok(sse_response(proxy_events(events)))
        }
    }
}
