//! Correlation token for remote calls.
//!
//! [`CallId`] pairs an outbound `rmi` command with the `rmi-result` that
//! answers it. Tokens minted locally are random v4 UUIDs rendered as 36
//! hyphenated hex characters; tokens received from the peer are opaque and
//! echoed back verbatim, so the inner value is a plain string.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one remote call.
///
/// Uniqueness of locally minted ids is best-effort (random), not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Mints a fresh random token.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().hyphenated().to_string())
    }

    /// Returns the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
