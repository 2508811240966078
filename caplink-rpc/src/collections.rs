//! Facades over host owned collections.
//! Every method is a single capability call referencing the collection handle

use std::any::Any;

use serde_json::Value;

use crate::{
    handle::{Handle, RemoteObject, RemoteValue, WrapperRegistry},
    rpc::RpcClient,
    serialize::{Args, Param},
};

pub const LIST_TYPE: &str = "List";
pub const DICT_TYPE: &str = "Dict";

/// Host side list
#[derive(Debug, Clone)]
pub struct RemoteList {
    handle: Handle,
    client: RpcClient,
}

impl RemoteList {
    pub fn new(handle: Handle, client: &RpcClient) -> Self {
        Self {
            handle,
            client: client.clone(),
        }
    }

    pub fn length(&self) -> crate::Result<usize> {
        let length = self.invoke("List.length", Args::new())?;
        count(length, "List.length")
    }

    pub fn get(&self, index: usize) -> crate::Result<RemoteValue> {
        self.invoke("List.get", Args::new().with("index", index as u64))
    }

    pub fn set(&self, index: usize, item: impl Into<Param>) -> crate::Result<()> {
        self.invoke(
            "List.set",
            Args::new().with("index", index as u64).with("item", item),
        )
        .map(drop)
    }

    pub fn add(&self, item: impl Into<Param>) -> crate::Result<()> {
        self.invoke("List.add", Args::new().with("item", item))
            .map(drop)
    }

    pub fn remove_at(&self, index: usize) -> crate::Result<()> {
        self.invoke("List.removeAt", Args::new().with("index", index as u64))
            .map(drop)
    }

    pub fn clear(&self) -> crate::Result<()> {
        self.invoke("List.clear", Args::new()).map(drop)
    }

    fn invoke(&self, capability_id: &str, args: Args) -> crate::Result<RemoteValue> {
        self.client
            .invoke_capability(capability_id, args.with("list", &self.handle))
    }
}

impl RemoteObject for RemoteList {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Host side dictionary
#[derive(Debug, Clone)]
pub struct RemoteDict {
    handle: Handle,
    client: RpcClient,
}

impl RemoteDict {
    pub fn new(handle: Handle, client: &RpcClient) -> Self {
        Self {
            handle,
            client: client.clone(),
        }
    }

    pub fn count(&self) -> crate::Result<usize> {
        let count_value = self.invoke("Dict.count", Args::new())?;
        count(count_value, "Dict.count")
    }

    pub fn get(&self, key: impl Into<Param>) -> crate::Result<RemoteValue> {
        self.invoke("Dict.get", Args::new().with("key", key))
    }

    pub fn set(&self, key: impl Into<Param>, value: impl Into<Param>) -> crate::Result<()> {
        self.invoke("Dict.set", Args::new().with("key", key).with("value", value))
            .map(drop)
    }

    /// Returns `true` if the key was present
    pub fn remove(&self, key: impl Into<Param>) -> crate::Result<bool> {
        let removed = self.invoke("Dict.remove", Args::new().with("key", key))?;
        Ok(removed.as_value().and_then(Value::as_bool).unwrap_or(false))
    }

    pub fn keys(&self) -> crate::Result<Vec<RemoteValue>> {
        match self.invoke("Dict.keys", Args::new())? {
            RemoteValue::Value(Value::Array(keys)) => Ok(keys
                .into_iter()
                .map(|key| self.client.wrappers().wrap_if_handle(key, &self.client))
                .collect()),
            RemoteValue::Value(Value::Null) => Ok(Vec::new()),
            other => Err(crate::Error::ProtocolViolation(format!(
                "Dict.keys returned a non-list: {:?}",
                other
            ))),
        }
    }

    pub fn contains_key(&self, key: impl Into<Param>) -> crate::Result<bool> {
        let contains = self.invoke("Dict.containsKey", Args::new().with("key", key))?;
        Ok(contains.as_value().and_then(Value::as_bool).unwrap_or(false))
    }

    pub fn clear(&self) -> crate::Result<()> {
        self.invoke("Dict.clear", Args::new()).map(drop)
    }

    fn invoke(&self, capability_id: &str, args: Args) -> crate::Result<RemoteValue> {
        self.client
            .invoke_capability(capability_id, args.with("dict", &self.handle))
    }
}

impl RemoteObject for RemoteDict {
    fn handle(&self) -> &Handle {
        &self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Install [RemoteList] and [RemoteDict] factories
pub fn register_collection_wrappers(registry: &WrapperRegistry) {
    registry.register(LIST_TYPE, RemoteList::new);
    registry.register(DICT_TYPE, RemoteDict::new);
}

fn count(value: RemoteValue, capability_id: &str) -> crate::Result<usize> {
    value
        .as_value()
        .and_then(Value::as_u64)
        .map(|count| count as usize)
        .ok_or_else(|| {
            crate::Error::ProtocolViolation(format!("{capability_id} returned a non-count value"))
        })
}
