//! Scoped key/value objects kept consistent with the peer.
//!
//! A [`SharedObject`] is a cheap, cloneable handle. All clones of the handle
//! returned for the same scope and name see the same values and the same
//! change handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CommandSink;
use crate::error::SyncsError;
use crate::ws::messages::{Command, SyncCommand};

/// Visibility tier of a shared object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// Shared by every client of the peer.
    Global,
    /// Shared by the clients of one named group.
    Group,
    /// Private to this client.
    Client,
}

impl Scope {
    /// Returns `true` if local code may write objects of this scope.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Client)
    }

    /// Returns the wire name of the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "GLOBAL",
            Self::Group => "GROUP",
            Self::Client => "CLIENT",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOrigin {
    /// A local write.
    Client,
    /// An inbound sync command.
    Server,
}

/// Notification passed to a change handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedChange {
    /// Every key changed by the update, with its new value.
    pub values: Map<String, Value>,
    /// Where the update came from.
    pub origin: ChangeOrigin,
}

/// Callback invoked once per update of a shared object.
pub type ChangeHandler = Arc<dyn Fn(&SharedChange) + Send + Sync>;

struct ObjectState {
    values: HashMap<String, Value>,
    on_change: Option<ChangeHandler>,
}

struct ObjectInner {
    name: String,
    scope: Scope,
    group: Option<String>,
    state: Mutex<ObjectState>,
    sink: Weak<dyn CommandSink>,
}

/// Handle to one shared object.
#[derive(Clone)]
pub struct SharedObject {
    inner: Arc<ObjectInner>,
}

impl SharedObject {
    /// Creates an empty object. `sink` carries outbound sync commands and
    /// does not keep the session alive.
    pub(crate) fn new(
        scope: Scope,
        name: &str,
        group: Option<&str>,
        sink: Weak<dyn CommandSink>,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                name: name.to_string(),
                scope,
                group: group.map(str::to_string),
                state: Mutex::new(ObjectState {
                    values: HashMap::new(),
                    on_change: None,
                }),
                sink,
            }),
        }
    }

    /// Object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Object scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.inner.scope
    }

    /// Group name for GROUP objects.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.inner.group.as_deref()
    }

    /// Returns `true` unless this is a CLIENT object.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        !self.inner.scope.is_writable()
    }

    /// Returns the value stored under `key`, or `None` if unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().values.get(key).cloned()
    }

    /// Returns a copy of every key/value pair.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner
            .state
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Writes `key = value` and tells the peer.
    ///
    /// The change handler sees the update with [`ChangeOrigin::Client`]
    /// before the sync command is sent. The send itself is fire-and-forget:
    /// a missing channel does not undo the local write.
    ///
    /// # Errors
    ///
    /// Returns [`SyncsError::ReadOnly`] for GLOBAL and GROUP objects; the
    /// object is left untouched and nothing is sent.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), SyncsError> {
        if self.is_read_only() {
            return Err(SyncsError::ReadOnly {
                scope: self.inner.scope,
                name: self.inner.name.clone(),
            });
        }
        let value = value.into();

        let handler = {
            let mut state = self.inner.state.lock();
            state.values.insert(key.to_string(), value.clone());
            state.on_change.clone()
        };

        if let Some(handler) = handler {
            let mut values = Map::new();
            values.insert(key.to_string(), value.clone());
            handler(&SharedChange {
                values,
                origin: ChangeOrigin::Client,
            });
        }

        if let Some(sink) = self.inner.sink.upgrade() {
            let command = SyncCommand::client_update(&self.inner.name, key, value);
            let _ = sink.send_command(Command::Sync(command));
        }
        Ok(())
    }

    /// Installs the change handler, replacing any previous one.
    pub fn on_change<F>(&self, handler: F)
    where
        F: Fn(&SharedChange) + Send + Sync + 'static,
    {
        self.inner.state.lock().on_change = Some(Arc::new(handler));
    }

    /// Removes the change handler.
    pub fn clear_on_change(&self) {
        self.inner.state.lock().on_change = None;
    }

    /// Merges an inbound update (last write wins per key) and notifies the
    /// handler once for the whole update. An empty update changes nothing
    /// and does not notify the handler.
    pub(crate) fn apply_remote(&self, values: Map<String, Value>) {
        if values.is_empty() {
            return;
        }
        let handler = {
            let mut state = self.inner.state.lock();
            for (key, value) in &values {
                state.values.insert(key.clone(), value.clone());
            }
            state.on_change.clone()
        };
        if let Some(handler) = handler {
            handler(&SharedChange {
                values,
                origin: ChangeOrigin::Server,
            });
        }
    }

    /// Returns `true` if both handles point at the same object.
    #[must_use]
    pub fn same_object(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SharedObject")
            .field("name", &self.inner.name)
            .field("scope", &self.inner.scope)
            .field("group", &self.inner.group)
            .field("keys", &state.values.len())
            .field("has_handler", &state.on_change.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Records every command it is asked to send.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) sent: Mutex<Vec<Command>>,
    }

    impl CommandSink for RecordingSink {
        fn send_command(&self, command: Command) -> bool {
            self.sent.lock().push(command);
            true
        }
    }

    fn object(scope: Scope, sink: &Arc<RecordingSink>) -> SharedObject {
        let weak: Weak<RecordingSink> = Arc::downgrade(sink);
        let weak: Weak<dyn CommandSink> = weak;
        SharedObject::new(scope, "profile", None, weak)
    }

    fn record_changes(obj: &SharedObject) -> Arc<Mutex<Vec<SharedChange>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = Arc::clone(&seen);
        obj.on_change(move |change| seen_in.lock().push(change.clone()));
        seen
    }

    #[test]
    fn unset_key_reads_none() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        assert_eq!(obj.get("missing"), None);
    }

    #[test]
    fn client_write_updates_notifies_and_syncs() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        let seen = record_changes(&obj);

        assert!(obj.set("k", "v").is_ok());
        assert_eq!(obj.get("k"), Some(json!("v")));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen.first().map(|c| c.origin), Some(ChangeOrigin::Client));
        assert_eq!(seen.first().map(|c| c.values.clone()), json!({"k": "v"}).as_object().cloned());

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        let Some(Command::Sync(sync)) = sent.first() else {
            panic!("expected sync command");
        };
        assert_eq!(sync.scope, Scope::Client);
        assert_eq!(sync.name, "profile");
        assert_eq!(sync.key.as_deref(), Some("k"));
        assert_eq!(sync.value, Some(json!("v")));
    }

    #[test]
    fn client_write_without_handler_still_syncs() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        assert!(obj.set("n", 3).is_ok());
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[test]
    fn read_only_scopes_reject_writes() {
        for scope in [Scope::Global, Scope::Group] {
            let sink = Arc::new(RecordingSink::default());
            let obj = object(scope, &sink);
            let seen = record_changes(&obj);

            let result = obj.set("k", 1);
            assert!(matches!(result, Err(SyncsError::ReadOnly { .. })));
            assert_eq!(obj.get("k"), None);
            assert!(seen.lock().is_empty());
            assert!(sink.sent.lock().is_empty());
        }
    }

    #[test]
    fn remote_update_merges_and_notifies_once() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Global, &sink);
        let seen = record_changes(&obj);

        let mut first = Map::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        obj.apply_remote(first);

        let mut second = Map::new();
        second.insert("b".to_string(), json!(20));
        obj.apply_remote(second);

        assert_eq!(obj.get("a"), Some(json!(1)));
        assert_eq!(obj.get("b"), Some(json!(20)));
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|c| c.origin == ChangeOrigin::Server));
        assert_eq!(seen.first().map(|c| c.values.len()), Some(2));
        assert!(sink.sent.lock().is_empty());
    }

    #[test]
    fn empty_remote_update_is_silent() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        let seen = record_changes(&obj);
        obj.apply_remote(Map::new());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn handler_is_replaced_not_stacked() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        let first = record_changes(&obj);
        let second = record_changes(&obj);

        assert!(obj.set("k", 1).is_ok());
        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
    }

    #[test]
    fn handler_may_write_back_without_deadlock() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        let echo = obj.clone();
        obj.on_change(move |change| {
            if change.origin == ChangeOrigin::Server {
                let _ = echo.set("ack", true);
            }
        });

        let mut values = Map::new();
        values.insert("x".to_string(), json!(1));
        obj.apply_remote(values);

        assert_eq!(obj.get("ack"), Some(json!(true)));
        assert_eq!(sink.sent.lock().len(), 1);
    }

    #[test]
    fn write_after_session_drop_is_local_only() {
        let sink = Arc::new(RecordingSink::default());
        let obj = object(Scope::Client, &sink);
        drop(sink);
        assert!(obj.set("k", 1).is_ok());
        assert_eq!(obj.get("k"), Some(json!(1)));
    }

    #[test]
    fn change_serializes_origin_lowercase() {
        let change = SharedChange {
            values: Map::new(),
            origin: ChangeOrigin::Server,
        };
        let value = serde_json::to_value(&change).unwrap_or_default();
        assert_eq!(value["origin"], json!("server"));
    }
}
