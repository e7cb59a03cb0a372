//! Inbound frame routing.
//!
//! Decodes each frame, then hands commands to the subsystem that owns them
//! and raw messages to the message listeners. Undecodable frames are
//! dropped; they are only visible in debug mode.

use serde_json::Value;

use super::messages::{Command, Frame, decode_frame};
use crate::client::SyncsClient;
use crate::domain::CallId;
use crate::domain::functions::Invocation;
use crate::error::UNDEFINED_FUNCTION;

/// Handles one inbound text frame to completion. Replies of asynchronous
/// remote functions are sent later from their own task.
pub(crate) fn route(client: &SyncsClient, frame: &str) {
    let debug = client.is_debug();
    match decode_frame(frame) {
        Ok(Frame::Command(command)) => {
            if debug {
                tracing::info!(target: "syncs::command", direction = "in", ?command);
            }
            dispatch(client, command);
        }
        Ok(Frame::Message(message)) => client.deliver_message(&message),
        Err(e) => {
            if debug {
                tracing::debug!(target: "syncs::command", error = %e, "frame dropped");
            }
        }
    }
}

fn dispatch(client: &SyncsClient, command: Command) {
    match command {
        Command::GetSocketId => client.report_socket_id(),
        Command::SetSocketId { socket_id } => client.assign_socket_id(socket_id),
        Command::Event { event, data } => {
            client.events().dispatch(&event, &data);
        }
        Command::Sync(sync) => {
            if let Err(e) = client.shared_state().apply(&sync) {
                tracing::debug!(error = %e, "sync command dropped");
            }
        }
        Command::Rmi { id, name, args } => handle_call(client, id, &name, args),
        Command::RmiResult { id, result, error } => {
            if !client.pending().complete(&id, result, error) {
                tracing::debug!(%id, "result for unknown call ignored");
            }
        }
        Command::ReportSocketId { .. } => {
            tracing::debug!("unexpected reportSocketId from peer ignored");
        }
    }
}

/// Runs a function the peer asked for. Exactly one `rmi-result` is sent.
fn handle_call(client: &SyncsClient, id: CallId, name: &str, args: Vec<Value>) {
    let Some(function) = client.functions().get(name) else {
        reply(client, id, Err(UNDEFINED_FUNCTION.to_string()));
        return;
    };
    match function.invoke(name, client, args) {
        Invocation::Ready(outcome) => reply(client, id, outcome),
        Invocation::Deferred(future) => {
            let client = client.clone();
            tokio::spawn(async move {
                let outcome = future.await;
                reply(&client, id, outcome);
            });
        }
    }
}

fn reply(client: &SyncsClient, id: CallId, outcome: Result<Value, String>) {
    let (result, error) = match outcome {
        Ok(value) => (value, None),
        Err(error) => (Value::Null, Some(error)),
    };
    client.send_command(Command::RmiResult { id, result, error });
}
