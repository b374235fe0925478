//! Server-Sent Events (SSE) streaming support

use eventsource_client as es;
use fr_api_contract::{StreamEvent, STREAM_CLOSED_MESSAGE};
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::auth::AuthConfig;
use crate::error::{RestClientError, RestClientResult};

/// What to do with a `message` event whose payload is not JSON
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MalformedEventPolicy {
    /// Log a warning and keep reading
    #[default]
    Skip,
    /// Deliver `MalformedEvent` and tear the stream down
    Fail,
}

/// Options applied to every attached stream
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Upper bound on the stream's lifetime
    pub max_duration: Option<Duration>,
    pub malformed_events: MalformedEventPolicy,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(600)),
            malformed_events: MalformedEventPolicy::Skip,
        }
    }
}

/// SSE event stream for one flow run
///
/// Yields updates until the server sends `close`, the connection fails, or
/// the lifetime deadline passes. Dropping the stream tears the connection
/// down.
pub struct FlowEventStream {
    receiver: mpsc::Receiver<RestClientResult<StreamEvent>>,
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl FlowEventStream {
    /// Open a push connection to `stream_url`
    ///
    /// `auth` is only sent when given; callers pass it for URLs on the
    /// service's own origin.
    pub fn connect(
        stream_url: &Url,
        auth: Option<&AuthConfig>,
        options: &StreamOptions,
    ) -> RestClientResult<Self> {
        let client = build_client(stream_url, auth)?;
        let (tx, rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(pump_events(
            client,
            tx,
            cancel.clone(),
            options.clone(),
        ));

        Ok(FlowEventStream {
            receiver: rx,
            cancel,
            _handle: handle,
        })
    }

    /// Detach from the stream without delivering any further events
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for FlowEventStream {
    type Item = RestClientResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Buffered events are discarded once cancelled.
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

impl Drop for FlowEventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn build_client(stream_url: &Url, auth: Option<&AuthConfig>) -> RestClientResult<impl es::Client> {
    let mut builder = es::ClientBuilder::for_url(stream_url.as_str())
        .map_err(|e| RestClientError::Stream(format!("invalid stream URL: {:?}", e)))?;

    if let Some(auth) = auth {
        let headers = auth.headers().map_err(|e| RestClientError::Auth(e.to_string()))?;
        for (name, value) in headers.iter() {
            let value = value.to_str().map_err(|e| RestClientError::Auth(e.to_string()))?;
            builder = builder
                .header(name.as_str(), value)
                .map_err(|e| RestClientError::Auth(format!("{:?}", e)))?;
        }
    }

    Ok(builder
        .reconnect(es::ReconnectOptions::reconnect(false).build())
        .build())
}

async fn deadline_passed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn pump_events<C: es::Client>(
    client: C,
    tx: mpsc::Sender<RestClientResult<StreamEvent>>,
    cancel: CancellationToken,
    options: StreamOptions,
) {
    let mut events = client.stream();
    let deadline = options.max_duration.map(|limit| Instant::now() + limit);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("stream detached");
                return;
            }
            _ = deadline_passed(deadline) => {
                warn!("stream exceeded its lifetime, closing");
                let _ = tx.send(Err(RestClientError::Timeout)).await;
                return;
            }
            next = events.next() => next,
        };

        match next {
            Some(Ok(es::SSE::Event(event))) => match event.event_type.as_str() {
                "message" => match serde_json::from_str::<Value>(&event.data) {
                    Ok(update) => {
                        if tx.send(Ok(StreamEvent::Update(update))).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => match options.malformed_events {
                        MalformedEventPolicy::Skip => {
                            warn!(error = %e, data = %event.data, "skipping malformed stream event");
                        }
                        MalformedEventPolicy::Fail => {
                            let _ = tx
                                .send(Err(RestClientError::MalformedEvent(e.to_string())))
                                .await;
                            return;
                        }
                    },
                },
                "close" => {
                    let _ = tx
                        .send(Ok(StreamEvent::Closed(STREAM_CLOSED_MESSAGE.to_string())))
                        .await;
                    return;
                }
                other => debug!(event_type = other, "ignoring stream event"),
            },
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(error = ?e, "Stream Error");
                let _ = tx.send(Err(RestClientError::Stream(format!("{:?}", e)))).await;
                return;
            }
            None => {
                error!("stream ended without a close event");
                let _ = tx
                    .send(Err(RestClientError::Stream(
                        "stream ended without a close event".to_string(),
                    )))
                    .await;
                return;
            }
        }
    }
}

/// Receiver of stream callbacks
///
/// Exactly one of `on_close` / `on_error` is called, after which no further
/// calls are made.
pub trait StreamHandler: Send + 'static {
    fn on_update(&mut self, update: Value);
    fn on_close(&mut self, message: String);
    fn on_error(&mut self, error: &RestClientError);
}

/// `StreamHandler` built from three closures
pub struct StreamCallbacks<U, C, E> {
    on_update: U,
    on_close: C,
    on_error: E,
}

impl<U, C, E> StreamCallbacks<U, C, E>
where
    U: FnMut(Value) + Send + 'static,
    C: FnMut(String) + Send + 'static,
    E: FnMut(&RestClientError) + Send + 'static,
{
    pub fn new(on_update: U, on_close: C, on_error: E) -> Self {
        Self {
            on_update,
            on_close,
            on_error,
        }
    }
}

impl<U, C, E> StreamHandler for StreamCallbacks<U, C, E>
where
    U: FnMut(Value) + Send + 'static,
    C: FnMut(String) + Send + 'static,
    E: FnMut(&RestClientError) + Send + 'static,
{
    fn on_update(&mut self, update: Value) {
        (self.on_update)(update)
    }

    fn on_close(&mut self, message: String) {
        (self.on_close)(message)
    }

    fn on_error(&mut self, error: &RestClientError) {
        (self.on_error)(error)
    }
}

/// Handle to a stream whose events are being delivered to a `StreamHandler`
pub struct StreamHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl StreamHandle {
    /// Stop delivery, including events already buffered; no terminal
    /// callback is made
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait until the handler has received its terminal callback (or the
    /// stream was cancelled)
    pub async fn wait(self) -> RestClientResult<()> {
        self.join
            .await
            .map_err(|e| RestClientError::Stream(format!("stream task failed: {}", e)))
    }
}

/// Drive `events` on a background task, feeding `handler`
pub fn dispatch<H: StreamHandler>(mut events: FlowEventStream, mut handler: H) -> StreamHandle {
    let cancel = events.cancellation_token();

    let join = tokio::spawn(async move {
        while let Some(item) = events.next().await {
            match item {
                Ok(StreamEvent::Update(update)) => handler.on_update(update),
                Ok(StreamEvent::Closed(message)) => {
                    handler.on_close(message);
                    break;
                }
                Err(e) => {
                    handler.on_error(&e);
                    break;
                }
            }
        }
    });

    StreamHandle { cancel, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callbacks_forward_to_closures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
        let mut handler = StreamCallbacks::new(
            move |update: Value| a.lock().unwrap().push(format!("update {}", update)),
            move |message: String| b.lock().unwrap().push(format!("close {}", message)),
            move |error: &RestClientError| c.lock().unwrap().push(format!("error {}", error)),
        );

        handler.on_update(json!({ "chunk": "hello" }));
        handler.on_close("Stream closed".to_string());
        handler.on_error(&RestClientError::Timeout);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                r#"update {"chunk":"hello"}"#.to_string(),
                "close Stream closed".to_string(),
                "error Operation timed out".to_string(),
            ]
        );
    }

    fn buffered_stream(items: Vec<RestClientResult<StreamEvent>>) -> FlowEventStream {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.try_send(item).unwrap();
        }
        FlowEventStream {
            receiver: rx,
            cancel: CancellationToken::new(),
            _handle: tokio::spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await
            }),
        }
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
        let handler = StreamCallbacks::new(
            move |update: Value| a.lock().unwrap().push(format!("update {}", update)),
            move |message: String| b.lock().unwrap().push(format!("close {}", message)),
            move |error: &RestClientError| c.lock().unwrap().push(format!("error {}", error)),
        );

        let events = buffered_stream(vec![
            Ok(StreamEvent::Update(json!({ "chunk": "a" }))),
            Ok(StreamEvent::Update(json!({ "chunk": "b" }))),
            Ok(StreamEvent::Closed("Stream closed".to_string())),
        ]);
        events.cancel();

        let handle = dispatch(events, handler);
        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("dispatch did not stop")
            .unwrap();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_delivers_until_close() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (seen.clone(), seen.clone(), seen.clone());
        let handler = StreamCallbacks::new(
            move |update: Value| a.lock().unwrap().push(format!("update {}", update)),
            move |message: String| b.lock().unwrap().push(format!("close {}", message)),
            move |error: &RestClientError| c.lock().unwrap().push(format!("error {}", error)),
        );

        let events = buffered_stream(vec![
            Ok(StreamEvent::Update(json!({ "chunk": "a" }))),
            Ok(StreamEvent::Closed("Stream closed".to_string())),
            Ok(StreamEvent::Update(json!({ "chunk": "late" }))),
        ]);

        dispatch(events, handler).wait().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![r#"update {"chunk":"a"}"#.to_string(), "close Stream closed".to_string()]
        );
    }

    #[test]
    fn test_default_options() {
        let options = StreamOptions::default();
        assert_eq!(options.malformed_events, MalformedEventPolicy::Skip);
        assert_eq!(options.max_duration, Some(Duration::from_secs(600)));
    }
}
