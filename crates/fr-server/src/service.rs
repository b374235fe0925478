use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fr_api_contract::{ApiContractError, ErrorBody};
use fr_client_api::{ClientApiError, FlowApi};
use fr_config::FlowTarget;
use std::sync::Arc;

/// Message every failed `/generate` call carries in its `error` field
pub const GENERATE_FAILED: &str = "Error generating response";

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn FlowApi>,
    pub target: Arc<FlowTarget>,
}

impl AppState {
    pub fn new(api: Arc<dyn FlowApi>, target: FlowTarget) -> Self {
        Self {
            api,
            target: Arc::new(target),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("flow service unreachable: {0}")]
    Transport(String),

    #[error("flow service returned {status} {status_text}")]
    RemoteService {
        status: u16,
        status_text: String,
        detail: Option<String>,
    },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("flow service timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Transport(_)
            | ApiError::RemoteService { .. }
            | ApiError::MalformedResponse(_)
            | ApiError::Stream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Transport(_) => "transport",
            ApiError::RemoteService { .. } => "remote_service",
            ApiError::MalformedResponse(_) => "malformed_response",
            ApiError::Stream(_) => "stream",
            ApiError::Timeout => "timeout",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (detail, upstream_status) = match self {
            ApiError::RemoteService { status, detail, .. } => (detail.clone(), Some(*status)),
            ApiError::Timeout => (None, None),
            other => (Some(other.to_string()), None),
        };
        ErrorBody {
            error: GENERATE_FAILED.to_string(),
            kind: self.kind().to_string(),
            detail,
            upstream_status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<ClientApiError> for ApiError {
    fn from(e: ClientApiError) -> Self {
        let detail = e.detail();
        match e {
            ClientApiError::Transport(msg) => ApiError::Transport(msg),
            ClientApiError::RemoteService {
                status,
                status_text,
                ..
            } => ApiError::RemoteService {
                status,
                status_text,
                detail,
            },
            ClientApiError::MalformedResponse(msg) => ApiError::MalformedResponse(msg),
            ClientApiError::Stream(msg) => ApiError::Stream(msg),
            ClientApiError::Timeout => ApiError::Timeout,
            ClientApiError::Unexpected(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ApiContractError> for ApiError {
    fn from(e: ApiContractError) -> Self {
        match e {
            ApiContractError::MalformedResponse(msg) => ApiError::MalformedResponse(msg),
            ApiContractError::Validation(errors) => ApiError::BadRequest(errors.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
