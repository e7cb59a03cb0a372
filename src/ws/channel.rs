//! Duplex channel abstraction.
//!
//! The session never touches a socket directly. A [`Connector`] opens a
//! [`Channel`] and reports what happens on it as [`ChannelEvent`]s: every
//! inbound text frame, then exactly one `Closed` when the channel ends for
//! any reason (refused connection, read error, remote close, local close).

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Notification from an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// An inbound text frame.
    Message(String),
    /// The channel is gone. Sent once, last.
    Closed,
}

/// Sender half used by channels to report events.
pub type EventSender = mpsc::UnboundedSender<ChannelEvent>;

/// Outbound half of a channel.
pub trait Channel: Send + Sync + fmt::Debug {
    /// Queues a text frame. Returns `false` if the channel can no longer send.
    fn send(&self, frame: String) -> bool;

    /// Requests a close. The matching `Closed` event follows asynchronously.
    fn close(&self);
}

/// Opens channels to a peer address.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Starts opening a channel to `path` and returns it immediately.
    ///
    /// Frames sent before the channel is established are queued.
    fn open(&self, path: &str, events: EventSender) -> Arc<dyn Channel>;
}
