use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use fr_api_contract::StreamEvent;
use fr_client_api::FlowEvents;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{debug, warn};

use crate::service::ApiError;

pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}

/// Unnamed `data:` frame
pub fn data_frame(data: &str) -> Bytes {
    Bytes::from(format!("data: {data}\n\n"))
}

pub fn event_frame(event: &str, data: &str) -> Bytes {
    Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
}

fn error_frame(err: ApiError) -> Bytes {
    let payload = serde_json::to_string(&err.body())
        .unwrap_or_else(|_| format!(r#"{{"kind":"{}"}}"#, err.kind()));
    event_frame("error", &payload)
}

/// Re-encode upstream flow events as SSE frames for the caller.
///
/// Updates become `data:` frames, the upstream close becomes `event: close`
/// and a failure becomes a single `event: error` frame. The response ends
/// after either terminal frame. Dropping the returned stream drops `events`,
/// which detaches from the upstream.
pub fn proxy_events(events: FlowEvents) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    async_stream::stream! {
        let mut events = events;
        while let Some(item) = events.next().await {
            match item {
                Ok(StreamEvent::Update(update)) => {
                    yield Ok(data_frame(&update.to_string()));
                }
                Ok(StreamEvent::Closed(message)) => {
                    debug!(%message, "upstream stream closed");
                    yield Ok(event_frame("close", &message));
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "upstream stream failed");
                    yield Ok(error_frame(ApiError::from(e)));
                    return;
                }
            }
        }
    }
}
