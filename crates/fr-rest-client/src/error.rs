//! Error types for the flow run client

use fr_api_contract::ApiContractError;
use fr_client_api::{error_detail, ClientApiError};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when using the flow run client
#[derive(Debug, Error)]
pub enum RestClientError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("API contract error: {0}")]
    ApiContract(#[from] ApiContractError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Remote service returned {} {status_text}: {body}", .status.as_u16())]
    RemoteService {
        status: StatusCode,
        status_text: String,
        body: serde_json::Value,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("SSE stream error: {0}")]
    Stream(String),

    #[error("Malformed stream event: {0}")]
    MalformedEvent(String),

    #[error("Operation timed out")]
    Timeout,
}

impl RestClientError {
    /// Classify a reqwest failure, separating deadlines from other transport faults
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }

    /// `detail` (or `message`) field of a remote error body, if any
    pub fn detail(&self) -> Option<String> {
        match self {
            RestClientError::RemoteService { body, .. } => error_detail(body),
            _ => None,
        }
    }
}

impl From<RestClientError> for ClientApiError {
    fn from(err: RestClientError) -> Self {
        match err {
            RestClientError::Transport(e) => ClientApiError::Transport(e.to_string()),
            RestClientError::RemoteService {
                status,
                status_text,
                body,
            } => ClientApiError::RemoteService {
                status: status.as_u16(),
                status_text,
                body,
            },
            RestClientError::MalformedResponse(message) => {
                ClientApiError::MalformedResponse(message)
            }
            RestClientError::ApiContract(ApiContractError::MalformedResponse(message)) => {
                ClientApiError::MalformedResponse(message)
            }
            RestClientError::Stream(message) => ClientApiError::Stream(message),
            RestClientError::MalformedEvent(message) => ClientApiError::Stream(message),
            RestClientError::Timeout => ClientApiError::Timeout,
            other => ClientApiError::Unexpected(other.to_string()),
        }
    }
}

/// Result type alias for flow client operations
pub type RestClientResult<T> = Result<T, RestClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detail_from_json_body() {
        let err = RestClientError::RemoteService {
            status: StatusCode::NOT_FOUND,
            status_text: "Not Found".to_string(),
            body: json!({ "detail": "not found" }),
        };

        assert_eq!(err.detail().as_deref(), Some("not found"));
        assert_eq!(
            err.to_string(),
            r#"Remote service returned 404 Not Found: {"detail":"not found"}"#
        );
    }

    #[test]
    fn test_detail_from_raw_body() {
        let err = RestClientError::RemoteService {
            status: StatusCode::BAD_GATEWAY,
            status_text: "Bad Gateway".to_string(),
            body: json!("upstream down"),
        };

        assert_eq!(err.detail().as_deref(), Some("upstream down"));
        assert_eq!(RestClientError::Timeout.detail(), None);
    }

    #[test]
    fn test_conversion_keeps_kind() {
        let err: ClientApiError = RestClientError::RemoteService {
            status: StatusCode::NOT_FOUND,
            status_text: "Not Found".to_string(),
            body: json!({ "detail": "not found" }),
        }
        .into();
        assert!(matches!(err, ClientApiError::RemoteService { status: 404, .. }));

        let err: ClientApiError =
            RestClientError::ApiContract(ApiContractError::malformed("no outputs")).into();
        assert!(matches!(err, ClientApiError::MalformedResponse(_)));

        let err: ClientApiError = RestClientError::Timeout.into();
        assert!(matches!(err, ClientApiError::Timeout));
    }
}
