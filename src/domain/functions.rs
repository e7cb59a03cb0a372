//! Registry of functions the peer may call.
//!
//! The registry is live: functions added or removed after the session
//! started are visible to the next inbound `rmi` command.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::SyncsClient;
use crate::error::FUNCTION_ERROR;

/// Function answering synchronously.
pub type SyncFunction = Arc<dyn Fn(&SyncsClient, Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Function answering through a future.
pub type AsyncFunction =
    Arc<dyn Fn(SyncsClient, Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A registered function.
#[derive(Clone)]
pub enum RemoteFunction {
    /// Replies as soon as it returns.
    Sync(SyncFunction),
    /// Replies when its future settles.
    Async(AsyncFunction),
}

impl fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("RemoteFunction::Sync"),
            Self::Async(_) => f.write_str("RemoteFunction::Async"),
        }
    }
}

/// Result of starting a function: either final, or a future to await.
///
/// Errors are already reduced to their wire string.
pub(crate) enum Invocation {
    Ready(Result<Value, String>),
    Deferred(BoxFuture<'static, Result<Value, String>>),
}

impl RemoteFunction {
    /// Runs the function with the session as context.
    ///
    /// Errors and panics are logged and reported as `"function error"`.
    pub(crate) fn invoke(&self, name: &str, client: &SyncsClient, args: Vec<Value>) -> Invocation {
        match self {
            Self::Sync(f) => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| f(client, args)));
                Invocation::Ready(settle(name, outcome))
            }
            Self::Async(f) => {
                let started =
                    std::panic::catch_unwind(AssertUnwindSafe(|| f(client.clone(), args)));
                let future = match started {
                    Ok(future) => future,
                    Err(payload) => return Invocation::Ready(settle(name, Err(payload))),
                };
                let name = name.to_string();
                Invocation::Deferred(
                    AssertUnwindSafe(future)
                        .catch_unwind()
                        .map(move |outcome| settle(&name, outcome))
                        .boxed(),
                )
            }
        }
    }
}

type Caught = Result<anyhow::Result<Value>, Box<dyn std::any::Any + Send>>;

fn settle(name: &str, outcome: Caught) -> Result<Value, String> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(function = name, error = %e, "remote function failed");
            Err(FUNCTION_ERROR.to_string())
        }
        Err(_) => {
            tracing::warn!(function = name, "remote function panicked");
            Err(FUNCTION_ERROR.to_string())
        }
    }
}

/// Name → function map consulted for every inbound call.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: Mutex<HashMap<String, RemoteFunction>>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a synchronous function.
    pub fn add<F>(&self, name: &str, function: F)
    where
        F: Fn(&SyncsClient, Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, RemoteFunction::Sync(Arc::new(function)));
    }

    /// Registers (or replaces) an asynchronous function.
    pub fn add_async<F, Fut>(&self, name: &str, function: F)
    where
        F: Fn(SyncsClient, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let boxed: AsyncFunction =
            Arc::new(move |client: SyncsClient, args: Vec<Value>| function(client, args).boxed());
        self.insert(name, RemoteFunction::Async(boxed));
    }

    /// Registers a prepared [`RemoteFunction`].
    pub fn insert(&self, name: &str, function: RemoteFunction) {
        self.functions.lock().insert(name.to_string(), function);
    }

    /// Unregisters `name`. Returns `true` if it was registered.
    pub fn remove(&self, name: &str) -> bool {
        self.functions.lock().remove(name).is_some()
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.lock().contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<RemoteFunction> {
        self.functions.lock().get(name).cloned()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::SyncsConfig;
    use serde_json::json;

    fn offline_client() -> SyncsClient {
        SyncsClient::with_connector(
            SyncsConfig::default().with_auto_connect(false),
            Arc::new(crate::ws::channel::tests::MockConnector::default()),
        )
    }

    fn sum(args: &[Value]) -> i64 {
        args.iter().filter_map(Value::as_i64).sum()
    }

    #[test]
    fn registry_is_live() {
        let registry = FunctionRegistry::new();
        assert!(!registry.contains("add"));
        registry.add("add", |_, args| Ok(json!(sum(&args))));
        assert!(registry.contains("add"));
        assert_eq!(registry.names(), vec!["add".to_string()]);
        assert!(registry.remove("add"));
        assert!(!registry.remove("add"));
        assert!(registry.get("add").is_none());
    }

    #[test]
    fn sync_function_is_ready() {
        let client = offline_client();
        let registry = FunctionRegistry::new();
        registry.add("add", |_, args| Ok(json!(sum(&args))));
        let Some(f) = registry.get("add") else {
            panic!("missing function");
        };
        let Invocation::Ready(result) = f.invoke("add", &client, vec![json!(2), json!(3)]) else {
            panic!("expected ready");
        };
        assert_eq!(result, Ok(json!(5)));
    }

    #[test]
    fn sync_failure_and_panic_map_to_function_error() {
        let client = offline_client();
        let registry = FunctionRegistry::new();
        registry.add("f", |_, _| Err(anyhow::anyhow!("boom")));
        registry.add("p", |_, _| panic!("bad"));

        let Some(failing) = registry.get("f") else {
            panic!("missing function");
        };
        let Invocation::Ready(result) = failing.invoke("f", &client, vec![]) else {
            panic!("expected ready");
        };
        assert_eq!(result, Err(FUNCTION_ERROR.to_string()));

        let Some(panicking) = registry.get("p") else {
            panic!("missing function");
        };
        let Invocation::Ready(result) = panicking.invoke("p", &client, vec![]) else {
            panic!("expected ready");
        };
        assert_eq!(result, Err(FUNCTION_ERROR.to_string()));
    }

    #[tokio::test]
    async fn async_function_is_deferred() {
        let client = offline_client();
        let registry = FunctionRegistry::new();
        registry.add_async("later", |_, args| async move {
            tokio::task::yield_now().await;
            Ok::<Value, anyhow::Error>(json!(sum(&args) * 2))
        });
        let Some(f) = registry.get("later") else {
            panic!("missing function");
        };
        let Invocation::Deferred(future) = f.invoke("later", &client, vec![json!(4)]) else {
            panic!("expected deferred");
        };
        assert_eq!(future.await, Ok(json!(8)));
    }

    #[tokio::test]
    async fn async_failure_maps_to_function_error() {
        let client = offline_client();
        let registry = FunctionRegistry::new();
        registry.add_async("fails", |_, _| async { Err::<Value, _>(anyhow::anyhow!("nope")) });
        let Some(f) = registry.get("fails") else {
            panic!("missing function");
        };
        let Invocation::Deferred(future) = f.invoke("fails", &client, vec![]) else {
            panic!("expected deferred");
        };
        assert_eq!(future.await, Err(FUNCTION_ERROR.to_string()));
    }
}
