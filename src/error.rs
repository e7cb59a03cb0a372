//! Client error types.
//!
//! [`SyncsError`] is the central error type of the crate. Failures that
//! happen inside frame handling are contained: they are logged and turned
//! into a protocol-level reply or a `false` return, and never end the
//! session. Only local API calls surface a [`SyncsError`] to the caller.

use std::time::Duration;

use crate::domain::Scope;

/// Wire error string sent when a requested remote function is not registered.
pub const UNDEFINED_FUNCTION: &str = "undefined";

/// Wire error string sent when a registered remote function fails.
pub const FUNCTION_ERROR: &str = "function error";

/// Client-side error enum.
///
/// # Categories
///
/// | Variant         | Category    | Raised by                              |
/// |-----------------|-------------|----------------------------------------|
/// | `ReadOnly`      | Application | local write to a GLOBAL/GROUP object   |
/// | `Remote`        | Application | peer answered an RPC with an error     |
/// | `NotConnected`  | Transport   | outbound command with no open channel  |
/// | `CallDropped`   | Transport   | pending RPC completion was discarded   |
/// | `Timeout`       | Transport   | RPC did not settle in time             |
/// | `Decode`        | Protocol    | undecodable or malformed frame         |
/// | `Serialization` | Protocol    | value could not be encoded as JSON     |
/// | `Config`        | Setup       | invalid configuration                  |
#[derive(Debug, thiserror::Error)]
pub enum SyncsError {
    /// GLOBAL and GROUP shared objects can only be changed by the peer.
    #[error("shared object {name} ({scope}) is read-only")]
    ReadOnly {
        /// Scope of the rejected object.
        scope: Scope,
        /// Name of the rejected object.
        name: String,
    },

    /// No channel is available for sending.
    #[error("not connected")]
    NotConnected,

    /// The peer answered a remote call with an error string.
    #[error("remote error: {0}")]
    Remote(String),

    /// The completion of a pending remote call was dropped before settling.
    #[error("remote call dropped before a result arrived")]
    CallDropped,

    /// A remote call did not settle within the requested duration.
    #[error("remote call {name} timed out after {after:?}")]
    Timeout {
        /// Remote function name.
        name: String,
        /// The elapsed budget.
        after: Duration,
    },

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncsError {
    /// Returns `true` for errors caused by the connection rather than by
    /// the application or the data exchanged.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::CallDropped | Self::Timeout { .. }
        )
    }
}
