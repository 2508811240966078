use std::{
    any::Any,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

#[cfg(not(feature = "log-to-stdout"))]
use log::{trace, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "log-to-stdout")]
use crate::{trace, warn};
use crate::rpc::RpcClient;

pub const HANDLE_KEY: &str = "$handle";
pub const TYPE_KEY: &str = "$type";

/// Reference to an object owned by the host.
/// Valid only for the session it was received in. Two handles are equal if their ids are
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handle {
    #[serde(rename = "$handle")]
    handle_id: String,
    #[serde(rename = "$type")]
    type_id: String,
}

impl Handle {
    pub fn new(handle_id: &str, type_id: &str) -> Self {
        Self {
            handle_id: handle_id.to_owned(),
            type_id: type_id.to_owned(),
        }
    }

    /// Parse a marshalled handle. Returns `None` if `value` is not one
    pub fn from_wire(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        Some(Self::new(
            object.get(HANDLE_KEY)?.as_str()?,
            object.get(TYPE_KEY)?.as_str()?,
        ))
    }

    pub fn handle_id(&self) -> &str {
        &self.handle_id
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// `{"$handle": .., "$type": ..}`
    pub fn to_wire(&self) -> Value {
        let mut object = serde_json::Map::with_capacity(2);
        object.insert(HANDLE_KEY.into(), Value::String(self.handle_id.clone()));
        object.insert(TYPE_KEY.into(), Value::String(self.type_id.clone()));

        Value::Object(object)
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.handle_id == other.handle_id
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle_id.hash(state)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_id, self.handle_id)
    }
}

/// True if `value` is an object carrying both a handle id and a type tag
pub fn is_marshalled_handle(value: &Value) -> bool {
    value.as_object().is_some_and(|object| {
        object.get(HANDLE_KEY).is_some_and(Value::is_string)
            && object.get(TYPE_KEY).is_some_and(Value::is_string)
    })
}

/// Typed client side facade over a [Handle]
pub trait RemoteObject: Any + Send + Sync + fmt::Debug {
    fn handle(&self) -> &Handle;

    fn as_any(&self) -> &dyn Any;
}

/// Unwrapped value received from the host
#[derive(Debug, Clone)]
pub enum RemoteValue {
    /// Plain JSON
    Value(Value),
    /// Handle without a registered wrapper
    Handle(Handle),
    /// Handle wrapped by a registered factory
    Object(Arc<dyn RemoteObject>),
}

impl RemoteValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RemoteValue::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Plain JSON. Handles and wrappers are converted into their wire form
    pub fn into_value(self) -> Value {
        match self {
            RemoteValue::Value(value) => value,
            RemoteValue::Handle(handle) => handle.to_wire(),
            RemoteValue::Object(object) => object.handle().to_wire(),
        }
    }

    /// Underlying handle, if any
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            RemoteValue::Value(_) => None,
            RemoteValue::Handle(handle) => Some(handle),
            RemoteValue::Object(object) => Some(object.handle()),
        }
    }

    /// Wrapper of the concrete type `T`
    pub fn downcast_ref<T: RemoteObject>(&self) -> Option<&T> {
        match self {
            RemoteValue::Object(object) => object.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Deserialize plain JSON into `T`
    pub fn parse<T: serde::de::DeserializeOwned>(self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.into_value())?)
    }
}

impl PartialEq<Value> for RemoteValue {
    fn eq(&self, other: &Value) -> bool {
        self.as_value() == Some(other)
    }
}

pub type WrapperFactory = Arc<dyn Fn(Handle, &RpcClient) -> Arc<dyn RemoteObject> + Send + Sync>;

/// Type tag to wrapper factory mapping. Factories are never removed
#[derive(Default)]
pub struct WrapperRegistry {
    factories: RwLock<HashMap<String, WrapperFactory>>,
}

impl WrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for handles with `type_id` tag. Replaces existing one
    pub fn register<F, W>(&self, type_id: &str, factory: F)
    where
        F: Fn(Handle, &RpcClient) -> W + Send + Sync + 'static,
        W: RemoteObject,
    {
        let factory: WrapperFactory = Arc::new(move |handle: Handle, client: &RpcClient| {
            Arc::new(factory(handle, client)) as Arc<dyn RemoteObject>
        });

        if self
            .factories
            .write()
            .insert(type_id.to_owned(), factory)
            .is_some()
        {
            warn!("Replaced wrapper factory for `{type_id}`");
        }
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.factories.read().contains_key(type_id)
    }

    /// Wrap `value` if it's a marshalled handle. Other values pass through
    pub fn wrap_if_handle(&self, value: Value, client: &RpcClient) -> RemoteValue {
        let Some(handle) = Handle::from_wire(&value) else {
            return RemoteValue::Value(value);
        };

        // Lock is released before calling the factory
        let factory = self.factories.read().get(handle.type_id()).cloned();

        match factory {
            Some(factory) => {
                trace!("Wrapping {handle}");
                RemoteValue::Object(factory(handle, client))
            }
            None => RemoteValue::Handle(handle),
        }
    }
}
