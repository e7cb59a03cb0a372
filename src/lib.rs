//! # syncs-client
//!
//! Client runtime for the Syncs protocol: one persistent WebSocket to a
//! relay peer carrying named events, shared state, and remote calls in
//! both directions.
//!
//! ## Architecture
//!
//! ```text
//! Application
//!     │
//!     ├── EventBus          subscribe / publish            (domain/)
//!     ├── SharedStateStore  GLOBAL / GROUP / CLIENT objects (domain/)
//!     ├── FunctionRegistry  + PendingCalls  remote calls   (domain/)
//!     │
//!     ├── SyncsClient       session, lifecycle, reconnect  (client)
//!     ├── router            decode + dispatch              (ws/)
//!     │
//!     └── Connector/Channel WebSocket via tokio-tungstenite (ws/)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use syncs_client::{SyncsClient, SyncsConfig};
//!
//! # async fn demo() -> Result<(), syncs_client::SyncsError> {
//! let client = SyncsClient::new(SyncsConfig::default().with_path("ws://localhost:8080/syncs"));
//! client.on_event("chat", |data| println!("chat: {data}"));
//! client.functions().add("add", |_, args| {
//!     Ok(json!(args.iter().filter_map(|a| a.as_i64()).sum::<i64>()))
//! });
//! client.shared("profile").set("name", "ada")?;
//! let answer = client.remote().call("time", vec![]).await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod ws;

pub use client::{ConnectionState, Remote, SyncsClient};
pub use config::SyncsConfig;
pub use domain::{ChangeOrigin, Scope, SharedChange, SharedObject, Subscriber};
pub use error::SyncsError;
