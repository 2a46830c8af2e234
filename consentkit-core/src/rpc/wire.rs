//! `__cmpCall` / `__cmpReturn` message envelopes (IAB CMP 1.1 frame API).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Substring that marks a text message as a possible return envelope.
pub const RETURN_MARKER: &str = "cmpReturn";

/// Outbound message posted to the CMP frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmpCallEnvelope {
    /// The call itself.
    #[serde(rename = "__cmpCall")]
    pub call: CmpCall,
}

/// A CMP command with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmpCall {
    /// CMP command name, e.g. `getVendorConsents`.
    pub command: String,
    /// Command argument; `null` when the command takes none.
    pub parameter: Value,
    /// Id echoed back in the matching [`CmpReturn`].
    pub call_id: String,
}

/// Inbound message answering a [`CmpCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmpReturnEnvelope {
    /// The answer.
    #[serde(rename = "__cmpReturn")]
    pub ret: CmpReturn,
}

/// Result of a CMP command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmpReturn {
    /// Id of the call being answered.
    pub call_id: String,
    /// Command result. Absent values decode as `null`.
    #[serde(default)]
    pub return_value: Value,
    /// Whether the CMP considers the command successful.
    #[serde(default)]
    pub success: bool,
}

impl CmpCallEnvelope {
    /// Wraps a command.
    #[must_use]
    pub fn new(command: &str, parameter: Value, call_id: String) -> Self {
        Self {
            call: CmpCall {
                command: command.to_string(),
                parameter,
                call_id,
            },
        }
    }
}

/// A message received by the window's message listener.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A structured clone of an object.
    Structured(Value),
    /// A string payload, possibly JSON-encoded.
    Text(String),
}

impl From<Value> for InboundMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Structured(other),
        }
    }
}

impl From<String> for InboundMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl InboundMessage {
    /// Extracts the return envelope, if this message carries one.
    ///
    /// Only text containing [`RETURN_MARKER`] is parsed, so unrelated string
    /// messages from other sources are ignored. Undecodable messages are
    /// skipped.
    #[must_use]
    pub fn cmp_return(&self) -> Option<CmpReturn> {
        match self {
            Self::Structured(value) => decode_return(value),
            Self::Text(text) if text.contains(RETURN_MARKER) => {
                match serde_json::from_str::<Value>(text) {
                    Ok(value) => decode_return(&value),
                    Err(err) => {
                        log::debug!("ignoring undecodable CMP message: {err}");
                        None
                    }
                }
            }
            Self::Text(_) => None,
        }
    }
}

fn decode_return(value: &Value) -> Option<CmpReturn> {
    let ret = value.get("__cmpReturn")?;
    match serde_json::from_value(ret.clone()) {
        Ok(ret) => Some(ret),
        Err(err) => {
            log::debug!("ignoring malformed __cmpReturn envelope: {err}");
            None
        }
    }
}
