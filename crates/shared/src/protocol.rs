//! obs-websocket v5 message envelope.
//!
//! Every frame on the wire is `{"op": <code>, "d": {...}}`. Only the handful of op codes the
//! client needs are modelled; anything else decodes as an [`Envelope`] with an unknown op and is
//! dropped by the caller.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// WebSocket subprotocol for JSON-encoded frames.
pub const JSON_SUBPROTOCOL: &str = "obswebsocket.json";

/// RPC version assumed when the server's hello omits one.
pub const DEFAULT_RPC_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Hello,
    Identify,
    Identified,
    Event,
    Request,
    RequestResponse,
}

impl OpCode {
    pub fn code(self) -> u8 {
        match self {
            Self::Hello => 0,
            Self::Identify => 1,
            Self::Identified => 2,
            Self::Event => 5,
            Self::Request => 6,
            Self::RequestResponse => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Hello),
            1 => Some(Self::Identify),
            2 => Some(Self::Identified),
            5 => Some(Self::Event),
            6 => Some(Self::Request),
            7 => Some(Self::RequestResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

impl Envelope {
    pub fn new<T: Serialize>(op: OpCode, data: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            op: op.code(),
            d: serde_json::to_value(data)?,
        })
    }

    pub fn op_code(&self) -> Option<OpCode> {
        OpCode::from_code(self.op)
    }

    pub fn is(&self, op: OpCode) -> bool {
        self.op == op.code()
    }

    /// Decodes the `d` payload, insisting the envelope carries `expected`.
    pub fn decode<T: DeserializeOwned>(&self, expected: OpCode) -> Result<T, ProtocolError> {
        if !self.is(expected) {
            return Err(ProtocolError::unexpected_op(expected.code(), self.op));
        }
        Ok(serde_json::from_value(self.d.clone())?)
    }

    pub fn from_text(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationChallenge {
    #[serde(default)]
    pub challenge: String,
    #[serde(default)]
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_web_socket_version: Option<String>,
    #[serde(default = "default_rpc_version")]
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationChallenge>,
}

fn default_rpc_version() -> u32 {
    DEFAULT_RPC_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    #[serde(default)]
    pub event_subscriptions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    #[serde(default)]
    pub negotiated_rpc_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    #[serde(default)]
    pub request_type: String,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub request_status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Decodes `responseData` into `T`. A missing payload decodes as an empty object so that
    /// shapes made of optional fields still succeed.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.response_data {
            Some(Value::Null) | None => serde_json::from_value(Value::Object(Default::default())),
            Some(value) => serde_json::from_value(value.clone()),
        }
    }
}
