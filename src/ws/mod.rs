//! Wire layer: message codec, channel abstraction, WebSocket connector,
//! and inbound routing.
//!
//! Everything that knows the shape of a frame lives here; the domain layer
//! only ever sees decoded [`messages::Command`]s.

pub mod channel;
pub mod connection;
pub mod messages;
pub(crate) mod router;

pub use channel::{Channel, ChannelEvent, Connector};
pub use connection::WsConnector;
pub use messages::{Command, Frame, SyncCommand};
