//! Client API trait for running remote flows

use async_trait::async_trait;
use fr_api_contract::*;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote service returned {status} {status_text}: {body}")]
    RemoteService {
        status: u16,
        status_text: String,
        body: serde_json::Value,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("timed out")]
    Timeout,
    #[error("unexpected: {0}")]
    Unexpected(String),
}

pub type ClientApiResult<T> = Result<T, ClientApiError>;

impl ClientApiError {
    /// Human-readable detail of a remote error body
    pub fn detail(&self) -> Option<String> {
        match self {
            ClientApiError::RemoteService { body, .. } => error_detail(body),
            _ => None,
        }
    }
}

/// `detail` (or `message`) of an error body; a bare string body is its own detail
pub fn error_detail(body: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match body {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("detail")
            .or_else(|| map.get("message"))
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        _ => None,
    }
}

/// Events of an attached stream; the stream ends after `Closed` or an error
pub type FlowEvents = BoxStream<'static, ClientApiResult<StreamEvent>>;

/// Result of starting a flow run
pub enum FlowRun {
    /// No stream was requested or granted; the envelope is final
    Completed(RunResponse),
    /// The service granted a stream and it has been attached
    Streaming {
        response: RunResponse,
        events: FlowEvents,
    },
}

impl std::fmt::Debug for FlowRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowRun::Completed(response) => f.debug_tuple("Completed").field(response).finish(),
            FlowRun::Streaming { response, .. } => f
                .debug_struct("Streaming")
                .field("response", response)
                .finish_non_exhaustive(),
        }
    }
}

#[async_trait]
pub trait FlowApi: Send + Sync {
    async fn start_run(&self, request: &RunRequest) -> ClientApiResult<FlowRun>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_detail() {
        assert_eq!(error_detail(&json!({ "detail": "not found" })).as_deref(), Some("not found"));
        assert_eq!(error_detail(&json!({ "message": "boom" })).as_deref(), Some("boom"));
        assert_eq!(
            error_detail(&json!({ "detail": [{ "loc": ["body"] }] })).as_deref(),
            Some(r#"[{"loc":["body"]}]"#)
        );
        assert_eq!(error_detail(&json!("raw text")).as_deref(), Some("raw text"));
        assert_eq!(error_detail(&json!(42)), None);
        assert_eq!(ClientApiError::Timeout.detail(), None);
    }
}
