//! API contract types for the flow run service

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::ApiContractError;

/// Input/output channel type understood by the remote flow
///
/// The well-known tags get their own variants; anything else is passed
/// through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IoType {
    #[default]
    Chat,
    Text,
    Any,
    Debug,
    Other(String),
}

impl IoType {
    pub fn as_str(&self) -> &str {
        match self {
            IoType::Chat => "chat",
            IoType::Text => "text",
            IoType::Any => "any",
            IoType::Debug => "debug",
            IoType::Other(tag) => tag,
        }
    }
}

impl From<String> for IoType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "chat" => IoType::Chat,
            "text" => IoType::Text,
            "any" => IoType::Any,
            "debug" => IoType::Debug,
            _ => IoType::Other(tag),
        }
    }
}

impl From<&str> for IoType {
    fn from(tag: &str) -> Self {
        IoType::from(tag.to_string())
    }
}

impl From<IoType> for String {
    fn from(value: IoType) -> Self {
        match value {
            IoType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for IoType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IoType::from(s))
    }
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-component overrides keyed by component instance id (e.g. `ChatInput-1QhsB`)
pub type Tweaks = HashMap<String, Value>;

/// Parse a tweaks mapping from a JSON document; the document must be an object
pub fn parse_tweaks(raw: &str) -> Result<Tweaks, ApiContractError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ApiContractError::InvalidTweaks(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One invocation of a remote flow
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct RunRequest {
    #[validate(length(min = 1))]
    pub flow_id: String,
    #[validate(length(min = 1))]
    pub namespace_id: String,
    pub input_value: String,
    pub input_type: IoType,
    pub output_type: IoType,
    pub tweaks: Tweaks,
    pub stream: bool,
}

impl RunRequest {
    pub fn new(
        flow_id: impl Into<String>,
        namespace_id: impl Into<String>,
        input_value: impl Into<String>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            namespace_id: namespace_id.into(),
            input_value: input_value.into(),
            input_type: IoType::Chat,
            output_type: IoType::Chat,
            tweaks: Tweaks::new(),
            stream: false,
        }
    }

    pub fn with_input_type(mut self, input_type: impl Into<IoType>) -> Self {
        self.input_type = input_type.into();
        self
    }

    pub fn with_output_type(mut self, output_type: impl Into<IoType>) -> Self {
        self.output_type = output_type.into();
        self
    }

    pub fn with_tweaks(mut self, tweaks: Tweaks) -> Self {
        self.tweaks = tweaks;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Request body sent to the run endpoint. Borrows, so the caller's
    /// tweaks are never touched.
    pub fn body(&self) -> RunFlowBody<'_> {
        RunFlowBody {
            input_value: &self.input_value,
            input_type: &self.input_type,
            output_type: &self.output_type,
            tweaks: &self.tweaks,
        }
    }
}

/// JSON body of `POST /lf/{namespace}/api/v1/run/{flow}`
#[derive(Debug, Serialize)]
pub struct RunFlowBody<'a> {
    pub input_value: &'a str,
    pub input_type: &'a IoType,
    pub output_type: &'a IoType,
    pub tweaks: &'a Tweaks,
}

/// Envelope returned by the run endpoint
///
/// Every level keeps unknown fields in `extra` so the envelope can be logged
/// without losing anything the service sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub outputs: Vec<FlowOutput>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output group for one flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowOutput {
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub inputs: Value,
    #[serde(default)]
    pub outputs: Vec<ComponentOutput>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Output group for one component of a flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ComponentOutputs>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<OutputMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Terminal message payload: either a bare string or a record with `text`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    Text(String),
    Record(MessageRecord),
}

impl MessageBody {
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageBody::Text(text) => Some(text),
            MessageBody::Record(record) => record.text.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunResponse {
    /// Decode an envelope, reporting a shape mismatch as `MalformedResponse`
    pub fn from_value(value: Value) -> Result<Self, ApiContractError> {
        serde_json::from_value(value).map_err(|e| {
            ApiContractError::malformed(format!("envelope does not match run response shape: {e}"))
        })
    }

    /// `outputs[0].outputs[0]`
    pub fn first_component(&self) -> Result<&ComponentOutput, ApiContractError> {
        let flow = self
            .outputs
            .first()
            .ok_or_else(|| ApiContractError::malformed("response contains no flow outputs"))?;
        flow.outputs.first().ok_or_else(|| {
            ApiContractError::malformed("first flow output contains no component outputs")
        })
    }

    /// `outputs[0].outputs[0].artifacts.stream_url`, `None` when absent or empty
    pub fn stream_url(&self) -> Result<Option<&str>, ApiContractError> {
        let component = self.first_component()?;
        Ok(component
            .artifacts
            .as_ref()
            .and_then(|artifacts| artifacts.stream_url.as_deref())
            .filter(|url| !url.is_empty()))
    }

    /// `outputs[0].outputs[0].outputs.message.message.text`
    pub fn message_text(&self) -> Result<&str, ApiContractError> {
        self.first_component()?
            .outputs
            .as_ref()
            .and_then(|outputs| outputs.message.as_ref())
            .and_then(|message| message.message.as_ref())
            .and_then(MessageBody::text)
            .ok_or_else(|| ApiContractError::malformed("first component output has no message text"))
    }
}

/// One item delivered by an attached push stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A `message` event, parsed as JSON
    Update(Value),
    /// The server sent `close`
    Closed(String),
}

/// Message reported when the server closes a stream
pub const STREAM_CLOSED_MESSAGE: &str = "Stream closed";

/// Body of `POST /generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[validate(length(min = 1))]
    pub prompt: String,
    #[serde(default)]
    pub input_type: IoType,
    #[serde(default)]
    pub output_type: IoType,
    #[serde(default)]
    pub stream: bool,
}

/// Successful non-streaming answer of `POST /generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
