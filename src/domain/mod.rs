//! Domain layer: the state a session keeps on behalf of the application.
//!
//! This module contains the event subscription bus, the shared object
//! namespaces, the function registry served to the peer, and the table of
//! outbound calls waiting for a result.

pub mod call_id;
pub mod event_bus;
pub mod functions;
pub mod pending;
pub mod shared_object;
pub mod shared_state;

pub use call_id::CallId;
pub use event_bus::{EventBus, Subscriber};
pub use functions::{FunctionRegistry, RemoteFunction};
pub use pending::{PendingCalls, RemoteCall};
pub use shared_object::{ChangeOrigin, Scope, SharedChange, SharedObject};
pub use shared_state::SharedStateStore;

use crate::ws::messages::Command;

/// Outbound path for protocol commands.
///
/// Implemented by the session; domain objects hold it weakly.
pub trait CommandSink: Send + Sync {
    /// Sends `command`. Returns `false` if it could not be handed to a channel.
    fn send_command(&self, command: Command) -> bool;
}
