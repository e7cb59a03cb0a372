//! The session: one channel, its lifecycle, and the subsystems fed by it.
//!
//! [`SyncsClient`] is a cheap, cloneable handle. It owns the connection
//! state machine
//!
//! ```text
//! Closed ──connect()──▶ Connecting ──handshake──▶ Open
//!    ▲                      │                       │
//!    └──────── channel closed (any reason) ◀────────┘
//! ```
//!
//! and the reconnect policy: a close that was not requested with
//! [`SyncsClient::disconnect`] fires `on_disconnect` and, when
//! `auto_reconnect` is set, schedules one `connect()` after the configured
//! delay. A requested close (or any close with `auto_reconnect` off) fires
//! `on_close` instead.
//!
//! Inbound frames are handled one at a time, in arrival order, by a task
//! per channel. No lock is held while application callbacks run.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::SyncsConfig;
use crate::domain::{
    CommandSink, EventBus, FunctionRegistry, PendingCalls, RemoteCall, SharedObject,
    SharedStateStore, Subscriber,
};
use crate::error::SyncsError;
use crate::ws::channel::{Channel, ChannelEvent, Connector};
use crate::ws::connection::WsConnector;
use crate::ws::messages::{Command, encode_command, encode_message};
use crate::ws::router;

/// Callback for lifecycle notifications.
pub type LifecycleListener = Arc<dyn Fn(&SyncsClient) + Send + Sync>;

/// Callback for raw application messages.
pub type MessageListener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Connection state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel.
    Closed,
    /// A channel is open but the handshake has not completed.
    Connecting,
    /// Handshake completed; the session is online.
    Open,
}

struct Session {
    config: SyncsConfig,
    socket_id: Option<String>,
    online: bool,
    state: ConnectionState,
    channel: Option<Arc<dyn Channel>>,
    /// Bumped on every `connect()`; stale channel events and stale reconnect
    /// timers compare against it.
    generation: u64,
    explicit_close: bool,
    open_notified: bool,
}

#[derive(Default)]
struct Listeners {
    on_open: Option<LifecycleListener>,
    on_close: Option<LifecycleListener>,
    on_disconnect: Option<LifecycleListener>,
    on_message: Vec<MessageListener>,
}

pub(crate) struct ClientInner {
    connector: Arc<dyn Connector>,
    session: Mutex<Session>,
    listeners: Mutex<Listeners>,
    events: EventBus,
    shared: SharedStateStore,
    functions: FunctionRegistry,
    pending: PendingCalls,
}

impl ClientInner {
    fn debug(&self) -> bool {
        self.session.lock().config.debug
    }
}

impl CommandSink for ClientInner {
    fn send_command(&self, command: Command) -> bool {
        let (channel, debug) = {
            let session = self.session.lock();
            (session.channel.clone(), session.config.debug)
        };
        let Some(channel) = channel else {
            tracing::debug!(kind = command.type_str(), "no channel; command dropped");
            return false;
        };
        if debug {
            tracing::info!(target: "syncs::command", direction = "out", ?command);
        }
        match encode_command(&command) {
            Ok(frame) => channel.send(frame),
            Err(e) => {
                tracing::warn!(kind = command.type_str(), error = %e, "command encoding failed");
                false
            }
        }
    }
}

/// Client session.
#[derive(Clone)]
pub struct SyncsClient {
    inner: Arc<ClientInner>,
}

impl SyncsClient {
    /// Creates a session using WebSocket channels.
    ///
    /// Connects immediately when `config.auto_connect` is set; this must
    /// then happen inside a Tokio runtime.
    #[must_use]
    pub fn new(config: SyncsConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Creates a session opening channels through `connector`.
    #[must_use]
    pub fn with_connector(config: SyncsConfig, connector: Arc<dyn Connector>) -> Self {
        let auto_connect = config.auto_connect;
        let inner = Arc::new_cyclic(|weak: &Weak<ClientInner>| {
            let sink: Weak<dyn CommandSink> = Weak::<ClientInner>::clone(weak);
            ClientInner {
                connector,
                session: Mutex::new(Session {
                    config,
                    socket_id: None,
                    online: false,
                    state: ConnectionState::Closed,
                    channel: None,
                    generation: 0,
                    explicit_close: false,
                    open_notified: false,
                }),
                listeners: Mutex::new(Listeners::default()),
                events: EventBus::new(),
                shared: SharedStateStore::new(sink),
                functions: FunctionRegistry::new(),
                pending: PendingCalls::new(),
            }
        });
        let client = Self { inner };
        if auto_connect {
            client.connect();
        }
        client
    }

    // ── connection lifecycle ─────────────────────────────────────────

    /// Opens a channel to the configured path.
    ///
    /// No-op while online or while a channel is still connecting. Must be
    /// called inside a Tokio runtime; outside one it logs and does nothing.
    pub fn connect(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("connect called outside a Tokio runtime");
            return;
        };
        let (path, generation) = {
            let mut session = self.inner.session.lock();
            if session.online || session.state != ConnectionState::Closed {
                return;
            }
            session.generation = session.generation.wrapping_add(1);
            session.state = ConnectionState::Connecting;
            session.open_notified = false;
            (session.config.path.clone(), session.generation)
        };

        tracing::debug!(%path, generation, "connecting");
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let channel = self.inner.connector.open(&path, events_tx);
        {
            let mut session = self.inner.session.lock();
            if session.generation == generation {
                session.channel = Some(channel);
            }
        }
        runtime.spawn(pump(self.clone(), generation, events_rx));
    }

    /// Closes the channel on request. The close fires `on_close` and never
    /// triggers a reconnect. Without a channel, cancels a pending reconnect.
    pub fn disconnect(&self) {
        let channel = {
            let mut session = self.inner.session.lock();
            match session.channel.clone() {
                Some(channel) => {
                    session.explicit_close = true;
                    Some(channel)
                }
                None => {
                    session.generation = session.generation.wrapping_add(1);
                    None
                }
            }
        };
        if let Some(channel) = channel {
            tracing::debug!("disconnect requested");
            channel.close();
        }
    }

    /// Returns `true` once the handshake has completed on the current channel.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.session.lock().online
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.session.lock().state
    }

    /// Session id assigned by the peer, if any. Survives reconnects.
    #[must_use]
    pub fn socket_id(&self) -> Option<String> {
        self.inner.session.lock().socket_id.clone()
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> SyncsConfig {
        self.inner.session.lock().config.clone()
    }

    /// Starts logging every inbound and outbound command.
    pub fn enable_debug_mode(&self) {
        self.inner.session.lock().config.debug = true;
    }

    /// Stops command logging.
    pub fn disable_debug_mode(&self) {
        self.inner.session.lock().config.debug = false;
    }

    /// Returns `true` if command logging is on.
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.inner.debug()
    }

    /// Sets the callback fired once per established connection, after the
    /// handshake. Replaces any previous one.
    pub fn on_open<F>(&self, listener: F)
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().on_open = Some(Arc::new(listener));
    }

    /// Sets the callback fired on a requested (or non-reconnecting) close.
    pub fn on_close<F>(&self, listener: F)
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().on_close = Some(Arc::new(listener));
    }

    /// Sets the callback fired on an unexpected close that will reconnect.
    pub fn on_disconnect<F>(&self, listener: F)
    where
        F: Fn(&Self) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().on_disconnect = Some(Arc::new(listener));
    }

    /// Adds a listener for raw application messages.
    pub fn on_message<F>(&self, listener: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().on_message.push(Arc::new(listener));
    }

    // ── sending ──────────────────────────────────────────────────────

    /// Sends a raw application message. Returns `false` when offline.
    pub fn send(&self, message: &Value) -> bool {
        let channel = {
            let session = self.inner.session.lock();
            if !session.online {
                return false;
            }
            session.channel.clone()
        };
        let Some(channel) = channel else {
            return false;
        };
        match encode_message(message) {
            Ok(frame) => channel.send(frame),
            Err(e) => {
                tracing::warn!(error = %e, "message encoding failed");
                false
            }
        }
    }

    /// Sends a protocol command on the current channel, online or not.
    /// Returns `false` if there is no channel.
    pub fn send_command(&self, command: Command) -> bool {
        self.inner.send_command(command)
    }

    // ── events ───────────────────────────────────────────────────────

    /// Subscribes `subscriber` to `event`. Idempotent.
    pub fn subscribe(&self, event: &str, subscriber: &Subscriber) {
        self.inner.events.subscribe(event, subscriber);
    }

    /// Wraps `callback` in a new [`Subscriber`], subscribes it, and returns
    /// it for a later [`unsubscribe`](Self::unsubscribe).
    pub fn on_event<F>(&self, event: &str, callback: F) -> Subscriber
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(callback);
        self.subscribe(event, &subscriber);
        subscriber
    }

    /// Removes `subscriber` from `event`; no-op if absent.
    pub fn unsubscribe(&self, event: &str, subscriber: &Subscriber) {
        self.inner.events.unsubscribe(event, subscriber);
    }

    /// Publishes an event to the peer. Only sends while online; returns
    /// whether the event was sent. Nothing is buffered.
    pub fn publish(&self, event: &str, data: Value) -> bool {
        if !self.is_online() {
            return false;
        }
        self.send_command(Command::Event {
            event: event.to_string(),
            data,
        })
    }

    /// The subscription bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // ── shared state ─────────────────────────────────────────────────

    /// CLIENT-scope object `name` (writable).
    #[must_use]
    pub fn shared(&self, name: &str) -> SharedObject {
        self.inner.shared.client(name)
    }

    /// GROUP-scope object `name` of `group` (read-only).
    #[must_use]
    pub fn group_shared(&self, group: &str, name: &str) -> SharedObject {
        self.inner.shared.group(group, name)
    }

    /// GLOBAL-scope object `name` (read-only).
    #[must_use]
    pub fn global_shared(&self, name: &str) -> SharedObject {
        self.inner.shared.global(name)
    }

    /// All shared objects.
    #[must_use]
    pub fn shared_state(&self) -> &SharedStateStore {
        &self.inner.shared
    }

    // ── remote invocation ────────────────────────────────────────────

    /// Functions the peer may call. Edits take effect immediately.
    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.inner.functions
    }

    /// Façade for calling functions hosted by the peer.
    #[must_use]
    pub fn remote(&self) -> Remote {
        Remote {
            client: self.clone(),
        }
    }

    /// Calls `name` on the peer.
    ///
    /// The `rmi` command is sent before this returns; the returned future
    /// settles when the matching result arrives. It fails right away with
    /// [`SyncsError::NotConnected`] if there is no channel to send on.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> RemoteCall {
        let call = self.inner.pending.register();
        let id = call.id().clone();
        let sent = self.send_command(Command::Rmi {
            id: id.clone(),
            name: name.to_string(),
            args,
        });
        if !sent {
            self.inner.pending.remove(&id);
            return RemoteCall::failed(id, SyncsError::NotConnected);
        }
        call
    }

    /// Like [`invoke`](Self::invoke), but gives up after `timeout` and
    /// forgets the pending call, so a late result is ignored.
    pub fn invoke_with_timeout(
        &self,
        name: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, SyncsError>> + Send + 'static {
        let call = self.invoke(name, args);
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        async move {
            let id = call.id().clone();
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    inner.pending.remove(&id);
                    Err(SyncsError::Timeout {
                        name,
                        after: timeout,
                    })
                }
            }
        }
    }

    /// Number of outbound calls still waiting for a result.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    pub(crate) fn pending(&self) -> &PendingCalls {
        &self.inner.pending
    }

    // ── inbound path, used by the router ─────────────────────────────

    /// Answers `getSocketId` with the cached id. A known id completes the
    /// handshake on our side.
    pub(crate) fn report_socket_id(&self) {
        let cached = self.socket_id();
        let resumed = cached.is_some();
        self.send_command(Command::ReportSocketId { socket_id: cached });
        if resumed {
            self.mark_open();
        }
    }

    /// Stores the id assigned by `setSocketId` and completes the handshake.
    pub(crate) fn assign_socket_id(&self, socket_id: String) {
        tracing::debug!(%socket_id, "socket id assigned");
        self.inner.session.lock().socket_id = Some(socket_id);
        self.mark_open();
    }

    /// Goes online; fires `on_open` once per established channel.
    fn mark_open(&self) {
        let first = {
            let mut session = self.inner.session.lock();
            session.online = true;
            session.state = ConnectionState::Open;
            !std::mem::replace(&mut session.open_notified, true)
        };
        if first {
            tracing::info!(socket_id = ?self.socket_id(), "session open");
            let listener = self.inner.listeners.lock().on_open.clone();
            if let Some(listener) = listener {
                listener(self);
            }
        }
    }

    /// Delivers a raw message to every message listener, in order.
    pub(crate) fn deliver_message(&self, message: &Value) {
        let listeners = self.inner.listeners.lock().on_message.clone();
        for listener in &listeners {
            listener(message);
        }
    }

    fn handle_close(&self, generation: u64) {
        let (requested, reconnect_delay) = {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                return;
            }
            session.online = false;
            session.state = ConnectionState::Closed;
            session.channel = None;
            let requested = std::mem::take(&mut session.explicit_close);
            let delay = session
                .config
                .auto_reconnect
                .then_some(session.config.reconnect_delay);
            (requested, delay)
        };

        match reconnect_delay {
            Some(delay) if !requested => {
                tracing::info!(?delay, "connection lost; reconnect scheduled");
                let listener = self.inner.listeners.lock().on_disconnect.clone();
                if let Some(listener) = listener {
                    contain("on_disconnect", || listener(self));
                }
                self.reconnect_after(delay, generation);
            }
            _ => {
                tracing::info!("connection closed");
                let listener = self.inner.listeners.lock().on_close.clone();
                if let Some(listener) = listener {
                    contain("on_close", || listener(self));
                }
            }
        }
    }

    /// Reconnects after `delay` unless something called `connect()` or
    /// `disconnect()` in between.
    fn reconnect_after(&self, delay: Duration, generation: u64) {
        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = client.inner.session.lock().generation;
            if current == generation {
                tracing::debug!("reconnecting");
                client.connect();
            }
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.session.lock().generation == generation
    }
}

/// Processes one channel's events in order until it closes.
///
/// A panicking application callback costs only the frame that triggered it.
async fn pump(client: SyncsClient, generation: u64, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
    loop {
        match events.recv().await {
            Some(ChannelEvent::Message(frame)) => {
                if client.is_current(generation) {
                    contain("inbound frame", || router::route(&client, &frame));
                }
            }
            Some(ChannelEvent::Closed) | None => {
                client.handle_close(generation);
                break;
            }
        }
    }
}

/// Runs application code, logging and swallowing a panic.
fn contain<F: FnOnce()>(context: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(context, "callback panicked; continuing");
    }
}

impl fmt::Debug for SyncsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.inner.session.lock();
        f.debug_struct("SyncsClient")
            .field("path", &session.config.path)
            .field("state", &session.state)
            .field("socket_id", &session.socket_id)
            .field("pending_calls", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

/// Call-site façade over [`SyncsClient::invoke`].
#[derive(Debug, Clone)]
pub struct Remote {
    client: SyncsClient,
}

impl Remote {
    /// Calls `name` with positional `args`.
    pub fn call(&self, name: &str, args: Vec<Value>) -> RemoteCall {
        self.client.invoke(name, args)
    }

    /// Calls `name`, giving up after `timeout`.
    pub fn call_with_timeout(
        &self,
        name: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, SyncsError>> + Send + 'static {
        self.client.invoke_with_timeout(name, args, timeout)
    }
}
