//! Client configuration.
//!
//! A [`SyncsConfig`] can be built in code (starting from [`Default`] and the
//! `with_*` setters) or loaded from environment variables (or a `.env` file
//! via `dotenvy`) with [`SyncsConfig::from_env`].

use std::time::Duration;

use crate::error::SyncsError;

/// Host used to derive the default path when `SYNCS_HOST` is not set.
pub const DEFAULT_HOST: &str = "localhost";

/// Default delay before an automatic reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Session configuration.
///
/// Read by the client on every connect and close, so changes to `debug`
/// made through the client take effect immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncsConfig {
    /// WebSocket address of the relay peer (e.g. `ws://localhost/syncs`).
    pub path: String,

    /// Connect as soon as the client is created.
    pub auto_connect: bool,

    /// Reconnect after a close that was not requested locally.
    pub auto_reconnect: bool,

    /// Delay between an unexpected close and the reconnect attempt.
    pub reconnect_delay: Duration,

    /// Log every inbound and outbound command.
    pub debug: bool,
}

impl Default for SyncsConfig {
    fn default() -> Self {
        Self {
            path: default_path(DEFAULT_HOST),
            auto_connect: true,
            auto_reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            debug: false,
        }
    }
}

impl SyncsConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is missing or unparsable.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// | Variable                   | Default                 |
    /// |----------------------------|-------------------------|
    /// | `SYNCS_PATH`               | `ws://$SYNCS_HOST/syncs` |
    /// | `SYNCS_HOST`               | `localhost`             |
    /// | `SYNCS_AUTO_CONNECT`       | `true`                  |
    /// | `SYNCS_AUTO_RECONNECT`     | `true`                  |
    /// | `SYNCS_RECONNECT_DELAY_MS` | `1000`                  |
    /// | `SYNCS_DEBUG`              | `false`                 |
    ///
    /// # Errors
    ///
    /// Returns [`SyncsError::Config`] if `SYNCS_PATH` is set but blank.
    pub fn from_env() -> Result<Self, SyncsError> {
        dotenvy::dotenv().ok();

        let host = std::env::var("SYNCS_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let path = std::env::var("SYNCS_PATH").unwrap_or_else(|_| default_path(&host));

        let config = Self {
            path,
            auto_connect: parse_env_bool("SYNCS_AUTO_CONNECT", true),
            auto_reconnect: parse_env_bool("SYNCS_AUTO_RECONNECT", true),
            reconnect_delay: Duration::from_millis(parse_env("SYNCS_RECONNECT_DELAY_MS", 1000)),
            debug: parse_env_bool("SYNCS_DEBUG", false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can be used to open a channel.
    ///
    /// # Errors
    ///
    /// Returns [`SyncsError::Config`] if the path is blank.
    pub fn validate(&self) -> Result<(), SyncsError> {
        if self.path.trim().is_empty() {
            return Err(SyncsError::Config("path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Sets the peer address.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets whether the client connects on creation.
    #[must_use]
    pub const fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Sets whether unexpected closes trigger a reconnect.
    #[must_use]
    pub const fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Sets the reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets debug logging of commands.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Builds the conventional `ws://<host>/syncs` address.
#[must_use]
pub fn default_path(host: &str) -> String {
    format!("ws://{host}/syncs")
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Returns `default` when the
/// variable is missing or not recognized by [`parse_bool`].
fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Accepts `"true"`, `"1"`, `"false"`, `"0"`, ignoring ASCII case and
/// surrounding whitespace.
fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
