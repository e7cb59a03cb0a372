//! Wire messages: the command envelope, raw frames, and the frame codec.
//!
//! Every frame on the channel is a JSON document escaped with the URI escape
//! set. Two disjoint shapes share the channel:
//!
//! ```text
//! {"command":true,"type":"event","event":"chat","data":{...}}   command frame
//! {"anything":"else"}                                          raw frame
//! ```

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::domain::{CallId, Scope};
use crate::error::SyncsError;

/// Bytes escaped on the way out: everything except alphanumerics and
/// `;,/?:@&=+$-_.!~*'()#`. Non-ASCII is always escaped as UTF-8.
const URI_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Name of the field marking a frame as protocol traffic.
pub const COMMAND_MARKER: &str = "command";

/// Command `type` values understood by the client.
pub const COMMAND_TYPES: [&str; 7] = [
    "getSocketId",
    "setSocketId",
    "reportSocketId",
    "event",
    "sync",
    "rmi",
    "rmi-result",
];

/// Protocol command, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Peer → client: asks for a cached session id.
    GetSocketId,

    /// Peer → client: assigns or refreshes the session id.
    SetSocketId {
        /// Session id chosen by the peer.
        socket_id: String,
    },

    /// Client → peer: answers `getSocketId`.
    ReportSocketId {
        /// Cached session id, `null` on first contact.
        socket_id: Option<String>,
    },

    /// Named event, in either direction.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        #[serde(default)]
        data: Value,
    },

    /// Shared object update, in either direction.
    Sync(SyncCommand),

    /// Remote call request, in either direction.
    Rmi {
        /// Correlation token.
        id: CallId,
        /// Remote function name.
        name: String,
        /// Positional arguments. `null` reads as no arguments.
        #[serde(default, deserialize_with = "null_as_empty")]
        args: Vec<Value>,
    },

    /// Remote call result, in either direction.
    #[serde(rename = "rmi-result")]
    RmiResult {
        /// Correlation token of the answered call.
        id: CallId,
        /// Return value, `null` on error.
        #[serde(default)]
        result: Value,
        /// Error string, `null` on success.
        #[serde(default, deserialize_with = "error_text")]
        error: Option<String>,
    },
}

impl Command {
    /// Returns the wire `type` of this command.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::GetSocketId => "getSocketId",
            Self::SetSocketId { .. } => "setSocketId",
            Self::ReportSocketId { .. } => "reportSocketId",
            Self::Event { .. } => "event",
            Self::Sync(_) => "sync",
            Self::Rmi { .. } => "rmi",
            Self::RmiResult { .. } => "rmi-result",
        }
    }
}

/// Body of a `sync` command.
///
/// Outbound CLIENT updates carry a single `key`/`value`; inbound updates
/// carry a `values` map. Both shapes are accepted when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCommand {
    /// Scope of the target object.
    pub scope: Scope,
    /// Object name.
    pub name: String,
    /// Group name, GROUP scope only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Multi-key update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Map<String, Value>>,
    /// Single-key update: key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Single-key update: value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl SyncCommand {
    /// Builds the single-key update sent after a local CLIENT write.
    #[must_use]
    pub fn client_update(name: &str, key: &str, value: Value) -> Self {
        Self {
            scope: Scope::Client,
            name: name.to_string(),
            group: None,
            values: None,
            key: Some(key.to_string()),
            value: Some(value),
        }
    }

    /// Merges both update shapes into one map.
    ///
    /// A missing `value` next to a `key` means `null`.
    #[must_use]
    pub fn changed_values(&self) -> Map<String, Value> {
        let mut changed = self.values.clone().unwrap_or_default();
        if let Some(key) = &self.key {
            changed.insert(key.clone(), self.value.clone().unwrap_or(Value::Null));
        }
        changed
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reads the `error` field of a result. Falsy values (`null`, `false`, `0`,
/// `""`) mean success; anything else is an error, non-strings in their JSON
/// form.
fn error_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let error = match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    };
    Ok(error)
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Protocol traffic.
    Command(Command),
    /// Application message, delivered verbatim to message listeners.
    Message(Value),
}

/// Escapes a JSON document for the wire.
#[must_use]
pub fn escape(json: &str) -> String {
    utf8_percent_encode(json, URI_ESCAPE).to_string()
}

/// Reverses [`escape`].
///
/// # Errors
///
/// Returns [`SyncsError::Decode`] if the unescaped bytes are not UTF-8.
pub fn unescape(frame: &str) -> Result<String, SyncsError> {
    percent_decode_str(frame)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| SyncsError::Decode(format!("invalid escape: {e}")))
}

/// Encodes a command, adding the command marker.
///
/// # Errors
///
/// Returns [`SyncsError::Serialization`] if the command cannot be encoded.
pub fn encode_command(command: &Command) -> Result<String, SyncsError> {
    let mut value = serde_json::to_value(command)?;
    if let Value::Object(fields) = &mut value {
        fields.insert(COMMAND_MARKER.to_string(), Value::Bool(true));
    }
    Ok(escape(&serde_json::to_string(&value)?))
}

/// Encodes a raw application message.
///
/// # Errors
///
/// Returns [`SyncsError::Serialization`] if the message cannot be encoded.
pub fn encode_message(message: &Value) -> Result<String, SyncsError> {
    Ok(escape(&serde_json::to_string(message)?))
}

/// Decodes and classifies one inbound frame.
///
/// # Errors
///
/// Returns [`SyncsError::Decode`] if the frame is not escaped JSON, or if it
/// is marked as a known command but lacks that command's fields.
pub fn decode_frame(frame: &str) -> Result<Frame, SyncsError> {
    let text = unescape(frame)?;
    let value: Value =
        serde_json::from_str(&text).map_err(|e| SyncsError::Decode(format!("invalid json: {e}")))?;

    if !is_command(&value) {
        return Ok(Frame::Message(value));
    }
    serde_json::from_value(value)
        .map(Frame::Command)
        .map_err(|e| SyncsError::Decode(format!("malformed command: {e}")))
}

/// Returns `true` if `value` carries the marker and a recognized type.
fn is_command(value: &Value) -> bool {
    let marked = value.get(COMMAND_MARKER) == Some(&Value::Bool(true));
    let known = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| COMMAND_TYPES.contains(&t));
    marked && known
}
