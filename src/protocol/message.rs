use crate::{Result, RpcError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the routing field every request must carry.
pub const CMD_FIELD: &str = "cmd";

/// A decoded command request.
///
/// The wire form is a flat JSON object: `cmd` names the command and every
/// other field is matched against the command's parameter names.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    cmd: String,
    fields: Map<String, Value>,
}

impl RpcRequest {
    // ---

    /// Decode one request payload.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Serialization`] if the payload is not JSON
    /// - [`RpcError::InvalidRequest`] if it is not an object or has no string `cmd`
    pub fn decode(payload: &[u8]) -> Result<Self> {
        // ---
        let value: Value = serde_json::from_slice(payload)?;

        let Value::Object(fields) = value else {
            return Err(RpcError::InvalidRequest("request is not a JSON object".into()));
        };

        let cmd = fields
            .get(CMD_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::InvalidRequest("missing string `cmd` field".into()))?
            .to_string();

        Ok(Self { cmd, fields })
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Value of a named field, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Outcome reported in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

/// A command response: `status` plus command-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub status: Status,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RpcResponse {
    // ---

    /// Success response carrying `fields`. A `status` key in `fields` is
    /// ignored.
    pub fn success(mut fields: Map<String, Value>) -> Self {
        // ---
        fields.remove("status");
        Self {
            status: Status::Success,
            fields,
        }
    }

    /// Bare failure response.
    pub fn failure() -> Self {
        // ---
        Self {
            status: Status::Failure,
            fields: Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Encode as one JSON document.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
