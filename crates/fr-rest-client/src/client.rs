//! Main flow run client implementation

use fr_api_contract::validation::validate_run_request;
use fr_api_contract::*;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

use crate::auth::AuthConfig;
use crate::error::{RestClientError, RestClientResult};
use crate::sse::{dispatch, FlowEventStream, StreamHandle, StreamHandler, StreamOptions};

/// Tunables for a `FlowClient`
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline for a single request/response round trip
    pub request_timeout: Option<Duration>,
    pub stream: StreamOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(120)),
            stream: StreamOptions::default(),
        }
    }
}

/// Outcome of `FlowClient::run_flow`
pub enum RunOutcome {
    /// The envelope is the final answer
    Completed(RunResponse),
    /// A stream was attached; updates arrive through the handler
    Streaming {
        response: RunResponse,
        stream: StreamHandle,
    },
}

impl RunOutcome {
    pub fn response(&self) -> &RunResponse {
        match self {
            RunOutcome::Completed(response) => response,
            RunOutcome::Streaming { response, .. } => response,
        }
    }
}

/// Client for the remote flow run service
#[derive(Debug, Clone)]
pub struct FlowClient {
    http_client: HttpClient,
    base_url: Url,
    auth: AuthConfig,
    options: ClientOptions,
}

impl FlowClient {
    /// Create a new client
    pub fn new(base_url: Url, auth: AuthConfig, options: ClientOptions) -> RestClientResult<Self> {
        let mut builder = HttpClient::builder().user_agent(concat!("flowrun/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            http_client,
            base_url,
            auth,
            options,
        })
    }

    /// Create a client from a base URL string with default options
    pub fn from_url(base_url: &str, auth: AuthConfig) -> RestClientResult<Self> {
        let base_url = Url::parse(base_url)?;
        Self::new(base_url, auth, ClientOptions::default())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the authentication config
    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Authenticated JSON POST to `base_url` + `path`
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RestClientResult<Value> {
        self.post_with_headers(path, body, HeaderMap::new()).await
    }

    /// Authenticated JSON POST with extra headers; auth and content type
    /// replace any caller-supplied values
    pub async fn post_with_headers<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        headers: HeaderMap,
    ) -> RestClientResult<Value> {
        let url = self.resolve(path)?;
        self.post_url(url, body, headers).await
    }

    /// Start a flow run and return the initial envelope
    ///
    /// With `stream` set this returns once the service has provisioned the
    /// stream, not once the stream has finished.
    pub async fn initiate_session(&self, request: &RunRequest) -> RestClientResult<RunResponse> {
        validate_run_request(request)?;
        let url = self.run_url(request)?;
        let envelope = self.post_url(url, &request.body(), HeaderMap::new()).await?;
        Ok(RunResponse::from_value(envelope)?)
    }

    /// Attach to a stream URL returned by the service and feed `handler`
    pub fn handle_stream<H: StreamHandler>(
        &self,
        stream_url: &str,
        handler: H,
    ) -> RestClientResult<StreamHandle> {
        let events = self.open_stream(stream_url)?;
        Ok(dispatch(events, handler))
    }

    /// Open a stream URL as a `Stream` of events
    pub fn open_stream(&self, stream_url: &str) -> RestClientResult<FlowEventStream> {
        let url = self.base_url.join(stream_url)?;
        FlowEventStream::connect(&url, self.auth_for(&url), &self.options.stream)
    }

    /// Credentials only go to the service's own origin
    fn auth_for(&self, url: &Url) -> Option<&AuthConfig> {
        (url.origin() == self.base_url.origin()).then_some(&self.auth)
    }

    /// Initiate a run and, when a stream was requested and granted, attach it
    ///
    /// Failures before a stream is attached are reported to `handler.on_error`
    /// exactly once and returned; no stream is attached in that case. The
    /// streaming variant returns as soon as the stream is attached.
    pub async fn run_flow<H: StreamHandler>(
        &self,
        request: &RunRequest,
        mut handler: H,
    ) -> RestClientResult<RunOutcome> {
        match self.begin_run(request).await {
            Ok((response, None)) => Ok(RunOutcome::Completed(response)),
            Ok((response, Some(events))) => Ok(RunOutcome::Streaming {
                response,
                stream: dispatch(events, handler),
            }),
            Err(e) => {
                handler.on_error(&e);
                Err(e)
            }
        }
    }

    /// Initiate a run and open its stream when one was requested and granted
    pub(crate) async fn begin_run(
        &self,
        request: &RunRequest,
    ) -> RestClientResult<(RunResponse, Option<FlowEventStream>)> {
        let response = self.initiate_session(request).await.map_err(|e| {
            error!(error = %e, "Error initiating session");
            e
        })?;
        log_init_response(&response);

        if !request.stream {
            return Ok((response, None));
        }

        let stream_url = match response.stream_url()? {
            Some(url) => url.to_string(),
            None => return Ok((response, None)),
        };

        info!(stream_url = %stream_url, "Streaming from stream URL");
        let events = self.open_stream(&stream_url)?;
        Ok((response, Some(events)))
    }

    fn resolve(&self, path: &str) -> RestClientResult<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Ok(Url::parse(&joined)?)
    }

    /// `{base}/lf/{namespace}/api/v1/run/{flow}?stream={bool}`
    pub fn run_url(&self, request: &RunRequest) -> RestClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RestClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend([
                "lf",
                request.namespace_id.as_str(),
                "api",
                "v1",
                "run",
                request.flow_id.as_str(),
            ]);
        url.query_pairs_mut()
            .clear()
            .append_pair("stream", if request.stream { "true" } else { "false" });
        Ok(url)
    }

    async fn post_url<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
        headers: HeaderMap,
    ) -> RestClientResult<Value> {
        let mut headers = match self.auth_for(&url) {
            Some(auth) => auth
                .apply(headers)
                .map_err(|e| RestClientError::Auth(e.to_string()))?,
            None => {
                warn!(url = %url, "withholding credentials from foreign origin");
                headers
            }
        };
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let result: RestClientResult<Value> = async {
            let response = self
                .http_client
                .post(url.clone())
                .headers(headers)
                .body(serde_json::to_vec(body)?)
                .send()
                .await
                .map_err(RestClientError::from_transport)?;
            self.handle_response(response).await
        }
        .await;

        if let Err(e) = &result {
            error!(url = %url, error = %e, "Request Error");
        }
        result
    }

    async fn handle_response(&self, response: Response) -> RestClientResult<Value> {
        let status = response.status();
        let text = response.text().await.map_err(RestClientError::from_transport)?;
        let parsed = serde_json::from_str::<Value>(&text);

        if status.is_success() {
            return parsed.map_err(|e| {
                RestClientError::MalformedResponse(format!("response body is not JSON: {}", e))
            });
        }

        Err(RestClientError::RemoteService {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: parsed.unwrap_or(Value::String(text)),
        })
    }
}

/// Logs the full initial envelope of a run
fn log_init_response(response: &RunResponse) {
    info!(
        session_id = response.session_id.as_deref().unwrap_or("-"),
        "Init Response: {}",
        serde_json::to_string_pretty(response).unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let base_url = "https://api.langflow.astra.datastax.com";
        let client = tokio_test::assert_ok!(FlowClient::from_url(base_url, AuthConfig::default()));

        assert_eq!(client.base_url().to_string(), format!("{}/", base_url));
    }

    #[test]
    fn test_run_url_building() {
        let client = FlowClient::from_url("https://flows.example.com", AuthConfig::default()).unwrap();
        let request = RunRequest::new("fe95c51b", "494a8fcf", "hi");

        assert_eq!(
            client.run_url(&request).unwrap().as_str(),
            "https://flows.example.com/lf/494a8fcf/api/v1/run/fe95c51b?stream=false"
        );
        assert_eq!(
            client.run_url(&request.with_stream(true)).unwrap().as_str(),
            "https://flows.example.com/lf/494a8fcf/api/v1/run/fe95c51b?stream=true"
        );
    }

    #[test]
    fn test_run_url_keeps_base_path_and_encodes_ids() {
        let client = FlowClient::from_url("http://localhost:7860/proxy/", AuthConfig::default()).unwrap();
        let request = RunRequest::new("my flow", "ns", "hi");

        assert_eq!(
            client.run_url(&request).unwrap().as_str(),
            "http://localhost:7860/proxy/lf/ns/api/v1/run/my%20flow?stream=false"
        );
    }

    #[test]
    fn test_resolve_concatenates_path() {
        let client = FlowClient::from_url("http://localhost:7860/base", AuthConfig::default()).unwrap();

        assert_eq!(
            client.resolve("/api/v1/run/x").unwrap().as_str(),
            "http://localhost:7860/base/api/v1/run/x"
        );
    }

    #[test]
    fn test_credentials_only_for_own_origin() {
        let client = FlowClient::from_url("http://localhost:7860/base", AuthConfig::with_bearer("t")).unwrap();

        let own = Url::parse("http://localhost:7860/stream/1").unwrap();
        let other_port = Url::parse("http://localhost:9999/base/x").unwrap();
        let other_host = Url::parse("https://other.example.com/a").unwrap();

        assert!(client.auth_for(&own).is_some());
        assert!(client.auth_for(&other_port).is_none());
        assert!(client.auth_for(&other_host).is_none());
    }
}
