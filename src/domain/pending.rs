//! Outstanding outbound remote calls.
//!
//! Each call registers a [`tokio::sync::oneshot`] sender under its
//! [`CallId`]. The matching `rmi-result` completes it and removes the entry.
//! There is no implicit expiry: a call whose result never arrives stays in
//! the table until [`PendingCalls::remove`] purges it (the client does this
//! when a timed call expires).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use super::CallId;
use crate::error::SyncsError;

type Completion = oneshot::Sender<Result<Value, String>>;

/// Correlation table for outbound calls.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<CallId, Completion>>,
}

impl PendingCalls {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a token and records a pending call under it.
    pub fn register(&self) -> RemoteCall {
        let id = CallId::new();
        let (tx, rx) = oneshot::channel();
        self.calls.lock().insert(id.clone(), tx);
        RemoteCall {
            id,
            state: CallState::Waiting(rx),
        }
    }

    /// Settles the call `id`: rejected if `error` is a non-empty string,
    /// resolved with `result` otherwise. The entry is removed either way.
    ///
    /// Returns `false` if no call was pending under `id`.
    pub fn complete(&self, id: &CallId, result: Value, error: Option<String>) -> bool {
        let Some(tx) = self.calls.lock().remove(id) else {
            return false;
        };
        let outcome = match error {
            Some(error) if !error.is_empty() => Err(error),
            _ => Ok(result),
        };
        // The caller may have dropped its future; that is not an error here.
        let _ = tx.send(outcome);
        true
    }

    /// Drops the call `id` without settling it. Returns `true` if present.
    pub fn remove(&self, id: &CallId) -> bool {
        self.calls.lock().remove(id).is_some()
    }

    /// Returns `true` if `id` is pending.
    #[must_use]
    pub fn contains(&self, id: &CallId) -> bool {
        self.calls.lock().contains_key(id)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns `true` if no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

#[derive(Debug)]
enum CallState {
    Waiting(oneshot::Receiver<Result<Value, String>>),
    Failed(Option<SyncsError>),
}

/// Future of one outbound remote call.
///
/// Resolves with the peer's result, or fails with [`SyncsError::Remote`]
/// carrying the peer's error string. Dropping it does not cancel the call.
#[derive(Debug)]
#[must_use = "a remote call does nothing useful unless awaited"]
pub struct RemoteCall {
    id: CallId,
    state: CallState,
}

impl RemoteCall {
    /// A call that failed before it was sent.
    pub(crate) fn failed(id: CallId, error: SyncsError) -> Self {
        Self {
            id,
            state: CallState::Failed(Some(error)),
        }
    }

    /// Correlation token of this call.
    #[must_use]
    pub fn id(&self) -> &CallId {
        &self.id
    }
}

impl Future for RemoteCall {
    type Output = Result<Value, SyncsError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            CallState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
                Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(SyncsError::Remote(error))),
                Poll::Ready(Err(_)) => Poll::Ready(Err(SyncsError::CallDropped)),
                Poll::Pending => Poll::Pending,
            },
            CallState::Failed(error) => {
                Poll::Ready(Err(error.take().unwrap_or(SyncsError::CallDropped)))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test]
    async fn result_resolves_call() {
        let table = PendingCalls::new();
        let call = table.register();
        let id = call.id().clone();
        assert!(table.contains(&id));

        assert!(table.complete(&id, json!(5), None));
        assert!(table.is_empty());

        let Ok(value) = call.await else {
            panic!("expected success");
        };
        assert_eq!(value, json!(5));
    }

    #[tokio::test]
    async fn error_string_rejects_call() {
        let table = PendingCalls::new();
        let call = table.register();
        let id = call.id().clone();
        assert!(table.complete(&id, Value::Null, Some("undefined".to_string())));

        let Err(SyncsError::Remote(msg)) = call.await else {
            panic!("expected remote error");
        };
        assert_eq!(msg, "undefined");
    }

    #[tokio::test]
    async fn empty_error_string_resolves() {
        let table = PendingCalls::new();
        let call = table.register();
        let id = call.id().clone();
        table.complete(&id, json!("ok"), Some(String::new()));
        assert_eq!(call.await.ok(), Some(json!("ok")));
    }

    #[test]
    fn unknown_or_duplicate_result_is_ignored() {
        let table = PendingCalls::new();
        assert!(!table.complete(&CallId::from("nope"), json!(1), None));

        let call = table.register();
        let id = call.id().clone();
        assert!(table.complete(&id, json!(1), None));
        assert!(!table.complete(&id, json!(2), None));
    }

    #[test]
    fn call_stays_pending_until_result() {
        let table = PendingCalls::new();
        let mut call = tokio_test::task::spawn(table.register());
        assert_pending!(call.poll());

        let id = call.id().clone();
        table.complete(&id, json!(true), None);
        let value = assert_ready!(call.poll());
        assert_eq!(value.ok(), Some(json!(true)));
    }

    #[tokio::test]
    async fn removed_call_reports_dropped() {
        let table = PendingCalls::new();
        let call = table.register();
        let id = call.id().clone();
        assert!(table.remove(&id));
        assert!(matches!(call.await, Err(SyncsError::CallDropped)));
    }

    #[tokio::test]
    async fn failed_call_yields_its_error() {
        let call = RemoteCall::failed(CallId::new(), SyncsError::NotConnected);
        assert!(matches!(call.await, Err(SyncsError::NotConnected)));
    }

    #[test]
    fn tokens_are_distinct() {
        let table = PendingCalls::new();
        let a = table.register();
        let b = table.register();
        assert_ne!(a.id(), b.id());
        assert_eq!(table.len(), 2);
    }
}
