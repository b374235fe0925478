//! Validation helpers for API contract types

use crate::error::ApiContractError;
use crate::types::*;
use validator::Validate;

/// Validate a run request before it is sent
pub fn validate_run_request(request: &RunRequest) -> Result<(), ApiContractError> {
    request.validate()?;
    Ok(())
}

/// Validate an inbound `/generate` body
pub fn validate_generate_request(request: &GenerateRequest) -> Result<(), ApiContractError> {
    request.validate()?;
    Ok(())
}

/// Validate the base URL of the flow service
pub fn validate_base_url(url_str: &str) -> Result<url::Url, ApiContractError> {
    let url = url::Url::parse(url_str)?;
    if url.cannot_be_a_base() {
        return Err(ApiContractError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_run_request() {
        let request = RunRequest::new("flow", "namespace", "hi");
        assert!(validate_run_request(&request).is_ok());

        let missing_flow = RunRequest::new("", "namespace", "hi");
        assert!(matches!(
            validate_run_request(&missing_flow),
            Err(ApiContractError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_generate_request() {
        let request = GenerateRequest {
            prompt: String::new(),
            input_type: IoType::Chat,
            output_type: IoType::Chat,
            stream: false,
        };
        assert!(validate_generate_request(&request).is_err());
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("https://api.langflow.astra.datastax.com").is_ok());
        assert!(validate_base_url("not a url").is_err());
        assert!(validate_base_url("mailto:someone@example.com").is_err());
    }
}
