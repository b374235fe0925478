//! Authentication methods for the flow run client

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

/// Authentication methods supported by the flow service
#[derive(Clone, Default)]
pub enum AuthMethod {
    /// Application token (`Authorization: Bearer <token>`)
    Bearer(String),
    /// Self-hosted API key (`x-api-key: <key>`)
    ApiKey(String),
    /// No authentication
    #[default]
    None,
}

// Tokens stay out of logs.
impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            AuthMethod::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            AuthMethod::None => f.write_str("None"),
        }
    }
}

impl AuthMethod {
    /// Apply authentication headers, replacing any value already present
    pub fn apply_to_headers(
        &self,
        headers: &mut HeaderMap,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self {
            AuthMethod::Bearer(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            AuthMethod::ApiKey(key) => {
                let mut value = HeaderValue::from_str(key)?;
                value.set_sensitive(true);
                headers.insert(HeaderName::from_static("x-api-key"), value);
            }
            AuthMethod::None => {}
        }
        Ok(())
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }
}

/// Authentication configuration for the client
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub method: AuthMethod,
}

impl AuthConfig {
    /// Create a new auth config with bearer token authentication
    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::bearer(token),
        }
    }

    /// Create a new auth config with API key authentication
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::api_key(key),
        }
    }

    /// Merge authentication into caller-supplied headers
    pub fn apply(
        &self,
        mut headers: HeaderMap,
    ) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
        self.method.apply_to_headers(&mut headers)?;
        Ok(headers)
    }

    /// Get headers for this authentication configuration
    pub fn headers(&self) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
        self.apply(HeaderMap::new())
    }
}
