//! REST client for the remote flow run service
//!
//! This crate provides the HTTP client used to invoke a hosted flow: an
//! authenticated JSON POST primitive, session initiation, and SSE streaming
//! for incremental output.

pub mod auth;
pub mod client;
pub mod error;
pub mod sse;

pub use auth::*;
pub use client::*;
pub use error::*;
pub use sse::{
    FlowEventStream, MalformedEventPolicy, StreamCallbacks, StreamHandle, StreamHandler,
    StreamOptions,
};

use async_trait::async_trait;
use fr_api_contract::RunRequest;
use fr_client_api::{ClientApiError, ClientApiResult, FlowApi, FlowRun};
use futures::StreamExt;

#[async_trait]
impl FlowApi for client::FlowClient {
    async fn start_run(&self, request: &RunRequest) -> ClientApiResult<FlowRun> {
        Ok(match self.begin_run(request).await? {
            (response, None) => FlowRun::Completed(response),
            (response, Some(events)) => FlowRun::Streaming {
                response,
                events: events.map(|item| item.map_err(ClientApiError::from)).boxed(),
            },
        })
    }
}
