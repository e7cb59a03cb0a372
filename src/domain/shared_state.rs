//! Three-tier store of shared objects.
//!
//! [`SharedStateStore`] owns the GLOBAL, GROUP and CLIENT namespaces.
//! Objects are created lazily, either by a local accessor or by the first
//! inbound sync command that names them, and live as long as the store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Weak;

use parking_lot::Mutex;

use super::CommandSink;
use super::shared_object::{Scope, SharedObject};
use crate::error::SyncsError;
use crate::ws::messages::SyncCommand;

#[derive(Default)]
struct Namespaces {
    global: HashMap<String, SharedObject>,
    group: HashMap<String, HashMap<String, SharedObject>>,
    client: HashMap<String, SharedObject>,
}

/// Lazily populated GLOBAL/GROUP/CLIENT namespaces.
pub struct SharedStateStore {
    namespaces: Mutex<Namespaces>,
    sink: Weak<dyn CommandSink>,
}

impl SharedStateStore {
    /// Creates an empty store whose CLIENT objects send through `sink`.
    pub(crate) fn new(sink: Weak<dyn CommandSink>) -> Self {
        Self {
            namespaces: Mutex::new(Namespaces::default()),
            sink,
        }
    }

    /// Returns the CLIENT object `name`, creating it if needed.
    pub fn client(&self, name: &str) -> SharedObject {
        let mut ns = self.namespaces.lock();
        ns.client
            .entry(name.to_string())
            .or_insert_with(|| SharedObject::new(Scope::Client, name, None, Weak::clone(&self.sink)))
            .clone()
    }

    /// Returns the GROUP object `name` of `group`, creating it if needed.
    pub fn group(&self, group: &str, name: &str) -> SharedObject {
        let mut ns = self.namespaces.lock();
        ns.group
            .entry(group.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| {
                SharedObject::new(Scope::Group, name, Some(group), Weak::clone(&self.sink))
            })
            .clone()
    }

    /// Returns the GLOBAL object `name`, creating it if needed.
    pub fn global(&self, name: &str) -> SharedObject {
        let mut ns = self.namespaces.lock();
        ns.global
            .entry(name.to_string())
            .or_insert_with(|| SharedObject::new(Scope::Global, name, None, Weak::clone(&self.sink)))
            .clone()
    }

    /// Applies an inbound sync command, creating the target if absent.
    ///
    /// The change handler of the target fires at most once.
    ///
    /// # Errors
    ///
    /// Returns [`SyncsError::Decode`] for a GROUP update without a group.
    pub fn apply(&self, command: &SyncCommand) -> Result<SharedObject, SyncsError> {
        let object = match command.scope {
            Scope::Global => self.global(&command.name),
            Scope::Client => self.client(&command.name),
            Scope::Group => {
                let Some(group) = command.group.as_deref() else {
                    return Err(SyncsError::Decode(format!(
                        "group sync for {} without group name",
                        command.name
                    )));
                };
                self.group(group, &command.name)
            }
        };
        // The namespace lock is released here, so handlers may use the store.
        object.apply_remote(command.changed_values());
        Ok(object)
    }

    /// Returns the number of materialized objects per scope, as
    /// `(global, group, client)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let ns = self.namespaces.lock();
        let groups = ns.group.values().map(HashMap::len).sum();
        (ns.global.len(), groups, ns.client.len())
    }
}

impl fmt::Debug for SharedStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (global, group, client) = self.counts();
        f.debug_struct("SharedStateStore")
            .field("global", &global)
            .field("group", &group)
            .field("client", &client)
            .finish()
    }
}
