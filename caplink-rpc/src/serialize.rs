use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::Serialize;
use serde_json::Value;

use crate::{
    expression::ReferenceExpression,
    handle::{Handle, RemoteObject, RemoteValue},
};

/// Value, which knows its own wire projection
pub trait Serializable: Send + Sync {
    fn to_wire(&self) -> crate::Result<Value>;
}

impl Serializable for Handle {
    fn to_wire(&self) -> crate::Result<Value> {
        Ok(Handle::to_wire(self))
    }
}

impl Serializable for Value {
    fn to_wire(&self) -> crate::Result<Value> {
        Ok(self.clone())
    }
}

/// Argument value passed to the host
#[derive(Clone)]
pub enum Param {
    /// Primitive or already serialized JSON
    Json(Value),
    Handle(Handle),
    /// Wrapper object received from the host
    Object(Arc<dyn RemoteObject>),
    Expression(ReferenceExpression),
    /// Custom [Serializable] value
    Custom(Arc<dyn Serializable>),
    List(Vec<Param>),
    Map(BTreeMap<String, Param>),
}

impl Param {
    pub const NULL: Param = Param::Json(Value::Null);

    /// Structured projection of any [serde::Serialize] value.
    /// Enums become their serde scalar representation
    pub fn structured<T: Serialize + ?Sized>(value: &T) -> crate::Result<Self> {
        Ok(Param::Json(serde_json::to_value(value)?))
    }

    pub fn custom<T: Serializable + 'static>(value: T) -> Self {
        Param::Custom(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Param::Json(Value::Null))
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Json(value) => write!(f, "{value}"),
            Param::Handle(handle) => write!(f, "{handle}"),
            Param::Object(object) => write!(f, "{object:?}"),
            Param::Expression(expression) => write!(f, "{expression:?}"),
            Param::Custom(_) => write!(f, "<custom>"),
            Param::List(list) => f.debug_list().entries(list).finish(),
            Param::Map(map) => f.debug_map().entries(map).finish(),
        }
    }
}

macro_rules! impl_json_param {
    ($($ty:ty),+) => {
        $(impl From<$ty> for Param {
            fn from(value: $ty) -> Self {
                Param::Json(Value::from(value))
            }
        })+
    };
}

impl_json_param!(bool, i32, i64, u32, u64, f64, &str, String);

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::Json(value)
    }
}

impl From<Handle> for Param {
    fn from(handle: Handle) -> Self {
        Param::Handle(handle)
    }
}

impl From<&Handle> for Param {
    fn from(handle: &Handle) -> Self {
        Param::Handle(handle.clone())
    }
}

impl From<ReferenceExpression> for Param {
    fn from(expression: ReferenceExpression) -> Self {
        Param::Expression(expression)
    }
}

impl From<RemoteValue> for Param {
    fn from(value: RemoteValue) -> Self {
        match value {
            RemoteValue::Value(value) => Param::Json(value),
            RemoteValue::Handle(handle) => Param::Handle(handle),
            RemoteValue::Object(object) => Param::Object(object),
        }
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(list: Vec<T>) -> Self {
        Param::List(list.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param>> From<BTreeMap<String, T>> for Param {
    fn from(map: BTreeMap<String, T>) -> Self {
        Param::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(value: Option<T>) -> Self {
        value.map_or(Param::NULL, Into::into)
    }
}

/// Named capability arguments
#[derive(Debug, Clone, Default)]
pub struct Args(BTreeMap<String, Param>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Param>) -> Self {
        self.0.insert(name.to_owned(), value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Param>) {
        self.0.insert(name.to_owned(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_wire(&self) -> crate::Result<Value> {
        self.0
            .iter()
            .map(|(name, value)| Ok((name.clone(), serialize(value)?)))
            .collect::<crate::Result<serde_json::Map<_, _>>>()
            .map(Value::Object)
    }
}

/// Recursively convert a value into its wire form
pub fn serialize(param: &Param) -> crate::Result<Value> {
    match param {
        Param::Json(value) => Ok(value.clone()),
        Param::Handle(handle) => Ok(handle.to_wire()),
        Param::Object(object) => Ok(object.handle().to_wire()),
        Param::Expression(expression) => expression.to_wire(),
        Param::Custom(custom) => custom.to_wire(),
        Param::List(list) => list
            .iter()
            .map(serialize)
            .collect::<crate::Result<Vec<_>>>()
            .map(Value::Array),
        Param::Map(map) => map
            .iter()
            .map(|(key, value)| Ok((key.clone(), serialize(value)?)))
            .collect::<crate::Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
    }
}

/// Stricter conversion for reference expression value providers.
/// Accepts primitives and handle-like values only
pub fn extract_reference_value(param: &Param) -> crate::Result<Value> {
    match param {
        Param::Json(Value::Null) => Err(crate::Error::InvalidArgument(
            "Reference expression value can't be null".into(),
        )),
        Param::Json(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
            Ok(value.clone())
        }
        Param::Json(value) => Err(crate::Error::InvalidArgument(format!(
            "Unsupported reference expression value: {value}"
        ))),
        Param::Handle(_) | Param::Object(_) | Param::Expression(_) | Param::Custom(_) => {
            serialize(param)
        }
        Param::List(_) | Param::Map(_) => Err(crate::Error::InvalidArgument(
            "Reference expression value can't be a collection".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    #[serde(rename_all = "lowercase")]
    enum Protocol {
        Http,
    }

    #[derive(Serialize)]
    struct Endpoint {
        name: String,
        protocol: Protocol,
        port: u16,
    }

    struct Secret(&'static str);

    impl Serializable for Secret {
        fn to_wire(&self) -> crate::Result<Value> {
            Ok(json!({"$secret": self.0}))
        }
    }

    #[test]
    fn test_nested_serialization() {
        let handle = Handle::new("h1", "List");
        let param = Param::from(vec![
            Param::from(1),
            Param::from(&handle),
            Param::from(BTreeMap::from([("inner".to_owned(), Param::custom(Secret("pwd")))])),
        ]);

        assert_eq!(
            serialize(&param).unwrap(),
            json!([1, {"$handle": "h1", "$type": "List"}, {"inner": {"$secret": "pwd"}}])
        );
    }

    #[test]
    fn test_structured_projection() {
        let endpoint = Endpoint {
            name: "api".into(),
            protocol: Protocol::Http,
            port: 8080,
        };

        let param = Param::structured(&endpoint).unwrap();
        assert_eq!(
            serialize(&param).unwrap(),
            json!({"name": "api", "protocol": "http", "port": 8080})
        );
        assert_eq!(
            serialize(&Param::structured(&Protocol::Http).unwrap()).unwrap(),
            json!("http")
        );
    }

    #[test]
    fn test_args() {
        let args = Args::new()
            .with("list", Handle::new("h", "List"))
            .with("item", 3)
            .with("label", None::<String>);

        assert_eq!(
            args.to_wire().unwrap(),
            json!({"item": 3, "label": null, "list": {"$handle": "h", "$type": "List"}})
        );
        assert_eq!(Args::new().to_wire().unwrap(), json!({}));
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(extract_reference_value(&"x".into()).unwrap(), json!("x"));
        assert_eq!(extract_reference_value(&5.into()).unwrap(), json!(5));
        assert_eq!(
            extract_reference_value(&Handle::new("h1", "T").into()).unwrap(),
            json!({"$handle": "h1", "$type": "T"})
        );

        for invalid in [
            Param::NULL,
            Param::from(json!({"a": 1})),
            Param::from(vec![1, 2]),
        ] {
            assert!(matches!(
                extract_reference_value(&invalid),
                Err(crate::Error::InvalidArgument(_))
            ));
        }
    }
}
