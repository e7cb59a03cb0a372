//! WebSocket channel backed by `tokio-tungstenite`.
//!
//! Each opened channel is one task that connects, then runs the read/write
//! loop: inbound text frames are forwarded as [`ChannelEvent::Message`],
//! outbound frames come from an unbounded queue so that sending never
//! blocks the caller. However the task ends, it reports
//! [`ChannelEvent::Closed`] exactly once.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::channel::{Channel, ChannelEvent, Connector, EventSender};

/// Production [`Connector`] opening WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, path: &str, events: EventSender) -> Arc<dyn Channel> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection(path.to_string(), outbound_rx, events));
        Arc::new(WsChannel {
            outbound: outbound_tx,
        })
    }
}

#[derive(Debug)]
enum Outbound {
    Frame(String),
    Close,
}

/// Sending half of one WebSocket connection.
#[derive(Debug)]
struct WsChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Channel for WsChannel {
    fn send(&self, frame: String) -> bool {
        self.outbound.send(Outbound::Frame(frame)).is_ok()
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Connects to `path` and runs the read/write loop until either side ends.
async fn run_connection(
    path: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let stream = match connect_async(path.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(%path, error = %e, "ws connect failed");
            let _ = events.send(ChannelEvent::Closed);
            return;
        }
    };
    tracing::debug!(%path, "ws connected");
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            // Incoming frame from the peer
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(ChannelEvent::Message(text.to_string())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Frame queued by the session
            out = outbound.recv() => {
                match out {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = ws_tx.send(Message::text(frame)).await {
                            tracing::debug!(error = %e, "ws write failed");
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }
        }
    }

    let _ = events.send(ChannelEvent::Closed);
    tracing::debug!(%path, "ws connection closed");
}
