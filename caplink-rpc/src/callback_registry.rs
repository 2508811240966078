use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use futures::future::BoxFuture;
#[cfg(not(feature = "log-to-stdout"))]
use log::{debug, trace, warn};
use parking_lot::Mutex;
use serde_json::Value;

#[cfg(feature = "log-to-stdout")]
use crate::{debug, trace, warn};
use crate::{handle::RemoteValue, rpc::RpcClient};

/// Result of a callback. Deferred results are resolved before responding to the host
pub enum Completion {
    Ready(Value),
    Deferred(BoxFuture<'static, anyhow::Result<Value>>),
}

impl From<Value> for Completion {
    fn from(value: Value) -> Self {
        Completion::Ready(value)
    }
}

type Callback = Arc<dyn Fn(&RpcClient, Vec<RemoteValue>) -> anyhow::Result<Completion> + Send + Sync>;

/// A registry of local functions, which the host can invoke by id
pub struct CallbackRegistry {
    id_counter: Mutex<u64>,
    callbacks: Mutex<HashMap<String, Callback>>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            id_counter: Mutex::new(0),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a function. Returns an id to pass to the host
    pub fn register<F>(&self, callback: F) -> String
    where
        F: Fn(&RpcClient, Vec<RemoteValue>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(Arc::new(move |client: &RpcClient, args: Vec<RemoteValue>| {
            callback(client, args).map(Completion::Ready)
        }))
    }

    /// Register a function, which returns a future
    pub fn register_deferred<F>(&self, callback: F) -> String
    where
        F: Fn(&RpcClient, Vec<RemoteValue>) -> BoxFuture<'static, anyhow::Result<Value>>
            + Send
            + Sync
            + 'static,
    {
        self.insert(Arc::new(move |client: &RpcClient, args: Vec<RemoteValue>| {
            Ok(Completion::Deferred(callback(client, args)))
        }))
    }

    /// Remove a callback. Returns `true` if it was registered
    pub fn unregister(&self, callback_id: &str) -> bool {
        let removed = self.callbacks.lock().remove(callback_id).is_some();
        debug!("Unregister callback {callback_id}: {removed}");

        removed
    }

    pub fn contains(&self, callback_id: &str) -> bool {
        self.callbacks.lock().contains_key(callback_id)
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke a callback with a host supplied arguments payload.
    /// The payload is either an object with `p0`, `p1`, .. keys, a single value, or absent
    pub fn dispatch(
        &self,
        callback_id: &str,
        args: Option<Value>,
        client: &RpcClient,
    ) -> crate::Result<Value> {
        // Registry lock is not held while the callback runs
        let callback = self
            .callbacks
            .lock()
            .get(callback_id)
            .cloned()
            .ok_or_else(|| crate::Error::CallbackNotFound(callback_id.to_owned()))?;

        let args = positional_args(args)
            .into_iter()
            .map(|value| client.wrappers().wrap_if_handle(value, client))
            .collect::<Vec<_>>();

        trace!("Dispatching callback {callback_id} with {} argument(s)", args.len());

        let completion = catch_unwind(AssertUnwindSafe(|| callback(client, args)))
            .map_err(|panic| callback_panicked(&panic))?
            .map_err(|e| crate::Error::Callback(format!("{e:#}")))?;

        match completion {
            Completion::Ready(value) => Ok(value),
            Completion::Deferred(future) => {
                debug!("Resolving deferred result of callback {callback_id}");

                catch_unwind(AssertUnwindSafe(|| futures::executor::block_on(future)))
                    .map_err(|panic| callback_panicked(&panic))?
                    .map_err(|e| crate::Error::Callback(format!("{e:#}")))
            }
        }
    }

    fn insert(&self, callback: Callback) -> String {
        let callback_id = self.next_id();
        self.callbacks.lock().insert(callback_id.clone(), callback);

        debug!("Registered callback {callback_id}");
        callback_id
    }

    /// Counter makes ids unique within the registry, the timestamp across processes
    fn next_id(&self) -> String {
        let mut counter = self.id_counter.lock();
        *counter += 1;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        format!("callback_{}_{}", *counter, millis)
    }
}

fn positional_args(args: Option<Value>) -> Vec<Value> {
    match args {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(mut object)) => {
            let mut result = Vec::new();

            while let Some(value) = object.remove(&format!("p{}", result.len())) {
                result.push(value);
            }

            if !object.is_empty() {
                warn!("Ignoring non-positional callback arguments: {:?}", object.keys());
            }

            result
        }
        Some(value) => vec![value],
    }
}

fn callback_panicked(panic: &Box<dyn std::any::Any + Send>) -> crate::Error {
    crate::Error::Callback(format!("Callback panicked: {}", panic_message(panic)))
}

/// Text of a panic payload
pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".into()
    }
}
