use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::code_as_string;

pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound capability call
pub const INVOKE_CAPABILITY_METHOD: &str = "invokeCapability";
/// Outbound token cancellation
pub const CANCEL_TOKEN_METHOD: &str = "cancelToken";
/// Inbound callback invocation
pub const INVOKE_CALLBACK_METHOD: &str = "invokeCallback";

/// Error payload of a response envelope
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireError {
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl WireError {
    pub const CALLBACK_NOT_FOUND: &'static str = "CALLBACK_NOT_FOUND";
    pub const CALLBACK_ERROR: &'static str = "CALLBACK_ERROR";
    pub const METHOD_NOT_FOUND: &'static str = "METHOD_NOT_FOUND";
    pub const INVALID_PARAMS: &'static str = "INVALID_PARAMS";

    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_owned(),
            message: message.to_owned(),
            data: None,
        }
    }
}

impl From<&crate::Error> for WireError {
    fn from(error: &crate::Error) -> Self {
        match error {
            crate::Error::CallbackNotFound(id) => {
                Self::new(Self::CALLBACK_NOT_FOUND, &format!("Callback not found: {id}"))
            }
            crate::Error::Callback(message) => Self::new(Self::CALLBACK_ERROR, message),
            crate::Error::InvalidArgument(message) => Self::new(Self::INVALID_PARAMS, message),
            crate::Error::Capability(e) => Self {
                code: e.code.clone(),
                message: e.message.clone(),
                data: None,
            },
            other => Self::new(Self::CALLBACK_ERROR, &other.to_string()),
        }
    }
}

impl From<WireError> for crate::CapabilityError {
    fn from(error: WireError) -> Self {
        let capability = error
            .data
            .as_ref()
            .and_then(|data| data.get("capability"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        Self {
            code: error.code,
            capability,
            message: error.message,
        }
    }
}

/// Message, which travels in both directions
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMessage {
    pub id: i64,
    pub data: RpcData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcData {
    /// Method call. Either our capability call, or host callback invocation
    Call { method: String, params: Vec<Value> },
    /// Call response
    Response(Result<Value, WireError>),
}

impl RpcMessage {
    pub fn call(id: i64, method: &str, params: Vec<Value>) -> Self {
        Self {
            id,
            data: RpcData::Call {
                method: method.to_owned(),
                params,
            },
        }
    }

    pub fn response(id: i64, result: Result<Value, WireError>) -> Self {
        Self {
            id,
            data: RpcData::Response(result),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.data, RpcData::Call { .. })
    }
}

/// Envelope as it appears on the wire
#[derive(Serialize, Deserialize, Debug, Default)]
pub(crate) struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    // `null` is a valid result, so the field presence is tracked separately
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
}

fn present<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl From<&RpcMessage> for RawMessage {
    fn from(message: &RpcMessage) -> Self {
        let mut raw = RawMessage {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            id: Some(message.id),
            ..Default::default()
        };

        match &message.data {
            RpcData::Call { method, params } => {
                raw.method = Some(method.clone());
                raw.params = Some(Value::Array(params.clone()));
            }
            RpcData::Response(Ok(result)) => raw.result = Some(result.clone()),
            RpcData::Response(Err(error)) => raw.error = Some(error.clone()),
        }

        raw
    }
}

impl TryFrom<RawMessage> for RpcMessage {
    type Error = crate::Error;

    fn try_from(raw: RawMessage) -> crate::Result<Self> {
        let id = raw.id.ok_or_else(|| {
            crate::Error::ProtocolViolation("Message without an id".into())
        })?;

        if let Some(method) = raw.method {
            let params = match raw.params {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(params)) => params,
                // Named params are passed as a single positional argument
                Some(other) => vec![other],
            };

            return Ok(RpcMessage::call(id, &method, params));
        }

        match (raw.result, raw.error) {
            (_, Some(error)) => Ok(RpcMessage::response(id, Err(error))),
            (Some(result), None) => Ok(RpcMessage::response(id, Ok(result))),
            (None, None) => Err(crate::Error::ProtocolViolation(format!(
                "Message {id} is neither a request nor a response"
            ))),
        }
    }
}
