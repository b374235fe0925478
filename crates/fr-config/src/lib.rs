//! Deploy-time configuration for the flowrun binaries
//!
//! Every identifier and secret is taken from a flag or its environment
//! variable; nothing is compiled in. A `.env` file in the working directory
//! is loaded first so it can supply the environment.

use clap::{Args, ValueEnum};
use fr_api_contract::validation::validate_base_url;
use fr_api_contract::{parse_tweaks, ApiContractError, IoType, RunRequest, Tweaks};
use fr_rest_client::{
    AuthConfig, ClientOptions, FlowClient, MalformedEventPolicy, RestClientError, StreamOptions,
};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_BASE_URL: &str = "https://api.langflow.astra.datastax.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Contract(#[from] ApiContractError),

    #[error("failed to build client: {0}")]
    Client(#[from] RestClientError),

    #[error("{scheme} authentication needs an API key (--api-key / LANGFLOW_API_KEY)")]
    MissingApiKey { scheme: &'static str },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the API key is presented to the flow service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>` (hosted service)
    #[default]
    Bearer,
    /// `x-api-key: <key>` (self-hosted deployments)
    ApiKey,
    /// No credentials
    None,
}

/// Where the flow lives and how to reach it
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Base URL of the flow service
    #[arg(long, env = "LANGFLOW_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Application token or API key
    #[arg(long, env = "LANGFLOW_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// How the API key is sent
    #[arg(long, env = "LANGFLOW_AUTH_SCHEME", value_enum, default_value_t = AuthScheme::Bearer)]
    pub auth_scheme: AuthScheme,

    /// Flow identifier (or name)
    #[arg(long, env = "LANGFLOW_FLOW_ID")]
    pub flow_id: String,

    /// Workflow namespace identifier
    #[arg(long, env = "LANGFLOW_NAMESPACE_ID")]
    pub namespace_id: String,

    /// Component overrides as a JSON object
    #[arg(long, env = "LANGFLOW_TWEAKS", conflicts_with = "tweaks_file")]
    pub tweaks: Option<String>,

    /// File holding component overrides as a JSON object
    #[arg(long, env = "LANGFLOW_TWEAKS_FILE")]
    pub tweaks_file: Option<PathBuf>,

    /// Deadline for the initial run request, in seconds (0 disables)
    #[arg(long, env = "LANGFLOW_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// Upper bound on a stream's lifetime, in seconds (0 disables)
    #[arg(long, env = "LANGFLOW_STREAM_TIMEOUT_SECS", default_value_t = 600)]
    pub stream_timeout_secs: u64,

    /// Abort a stream on a non-JSON message instead of skipping it
    #[arg(long, env = "LANGFLOW_FAIL_ON_MALFORMED_EVENT")]
    pub fail_on_malformed_event: bool,
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl ConnectionArgs {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: seconds(self.request_timeout_secs),
            stream: StreamOptions {
                max_duration: seconds(self.stream_timeout_secs),
                malformed_events: if self.fail_on_malformed_event {
                    MalformedEventPolicy::Fail
                } else {
                    MalformedEventPolicy::Skip
                },
            },
        }
    }

    pub fn auth(&self) -> Result<AuthConfig, ConfigError> {
        let key = self.api_key.as_deref().filter(|key| !key.is_empty());
        match (self.auth_scheme, key) {
            (AuthScheme::Bearer, Some(key)) => Ok(AuthConfig::with_bearer(key)),
            (AuthScheme::ApiKey, Some(key)) => Ok(AuthConfig::with_api_key(key)),
            (AuthScheme::Bearer, None) => Err(ConfigError::MissingApiKey { scheme: "bearer" }),
            (AuthScheme::ApiKey, None) => Err(ConfigError::MissingApiKey { scheme: "api-key" }),
            (AuthScheme::None, _) => Ok(AuthConfig::default()),
        }
    }

    pub fn build_client(&self) -> Result<FlowClient, ConfigError> {
        let base_url = validate_base_url(&self.base_url)?;
        let client = FlowClient::new(base_url, self.auth()?, self.client_options())?;
        Ok(client)
    }

    pub fn load_tweaks(&self) -> Result<Tweaks, ConfigError> {
        if let Some(path) = &self.tweaks_file {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            return Ok(parse_tweaks(&raw)?);
        }
        match &self.tweaks {
            Some(raw) => Ok(parse_tweaks(raw)?),
            None => Ok(Tweaks::new()),
        }
    }

    pub fn flow_target(&self) -> Result<FlowTarget, ConfigError> {
        Ok(FlowTarget {
            flow_id: self.flow_id.clone(),
            namespace_id: self.namespace_id.clone(),
            tweaks: self.load_tweaks()?,
        })
    }
}

/// The configured flow, ready to be turned into run requests
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTarget {
    pub flow_id: String,
    pub namespace_id: String,
    pub tweaks: Tweaks,
}

impl FlowTarget {
    pub fn request(
        &self,
        input_value: impl Into<String>,
        input_type: IoType,
        output_type: IoType,
        stream: bool,
    ) -> RunRequest {
        RunRequest::new(&self.flow_id, &self.namespace_id, input_value)
            .with_input_type(input_type)
            .with_output_type(output_type)
            .with_tweaks(self.tweaks.clone())
            .with_stream(stream)
    }
}

#[derive(Debug, Clone, Args)]
pub struct LoggingArgs {
    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "FLOWRUN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl LoggingArgs {
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
    }

    /// Install the global subscriber
    pub fn init_tracing(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load `.env` from the working directory, if present
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("Warning: ignoring unreadable .env file: {}", e),
    }
}
