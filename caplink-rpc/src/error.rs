use std::{fmt, io};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Domain error reported by the host for a capability invocation.
/// Comes either as a `{"$error": {...}}` result payload, or as a transport level
/// `error` response
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CapabilityError {
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl CapabilityError {
    pub const ERROR_KEY: &'static str = "$error";

    pub fn new(code: &str, capability: Option<&str>, message: &str) -> Self {
        Self {
            code: code.to_owned(),
            capability: capability.map(str::to_owned),
            message: message.to_owned(),
        }
    }

    /// Extract an error from a `{"$error": {...}}` result payload.
    /// Returns `None` for any other value
    pub fn from_result(value: &Value) -> Option<Self> {
        let payload = value.as_object()?.get(Self::ERROR_KEY)?;

        match serde_json::from_value(payload.clone()) {
            Ok(error) => Some(error),
            Err(_) => Some(Self {
                code: "UNKNOWN".into(),
                capability: None,
                message: payload.to_string(),
            }),
        }
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.capability {
            Some(capability) => write!(f, "[{}] {}: {}", self.code, capability, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for CapabilityError {}

/// Hosts are free to use JSON-RPC numeric codes
pub(crate) fn code_as_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(code) => code,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Endpoint never became available within the connect timeout
    #[error("Timed out connecting to the host endpoint")]
    ConnectTimeout,
    /// Peer closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,
    /// Malformed frame header or body
    #[error("Framing error: {0}")]
    Framing(String),
    /// Remote operation reported a domain error
    #[error("Capability error: {0}")]
    Capability(CapabilityError),
    /// Host invoked a callback id which is not registered
    #[error("Callback not found: {0}")]
    CallbackNotFound(String),
    /// Local callback failed
    #[error("Callback failed: {0}")]
    Callback(String),
    /// Unexpected message shape or mismatched response id
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// Value can't be used as an argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Client is not connected. Either never connected, disconnected or failed
    #[error("Client is not connected")]
    NotConnected,
    /// Transport error other than peer disconnection
    #[error("IO error: {0}")]
    Io(String),
    /// Failed to convert value into JSON
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Errors which leave the connection in unknown state. The session must be dropped
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed
                | Error::Framing(_)
                | Error::ProtocolViolation(_)
                | Error::Io(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => Error::ConnectionClosed,
            _ => Error::Io(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
