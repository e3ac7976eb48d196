//! Runtime values bound to template parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Unbound;
use crate::expand::{Options, Query};

/// A single bindable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Scalar::Json(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<serde_json::Value> for Scalar {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Scalar::Text(s),
            other => Scalar::Json(other),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

type Expand = dyn Fn(&Params, &Options) -> Result<Query, Unbound> + Send + Sync;

/// A callable that expands another query, possibly from a different set.
///
/// Invoked with the caller's running index in `Options::index`; the
/// returned statement and arguments are spliced into the caller.
#[derive(Clone)]
pub struct QueryRef {
    name: String,
    expand: Arc<Expand>,
}

impl QueryRef {
    pub fn new<F>(name: impl Into<String>, expand: F) -> Self
    where
        F: Fn(&Params, &Options) -> Result<Query, Unbound> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            expand: Arc::new(expand),
        }
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, params: &Params, options: &Options) -> Result<Query, Unbound> {
        (self.expand)(params, options)
    }
}

impl fmt::Debug for QueryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryRef").field(&self.name).finish()
    }
}

/// What an inner-composition entry points at.
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// A query of the set being expanded.
    Name(String),
    Ref(QueryRef),
}

/// One entry of an inner composition.
#[derive(Debug, Clone)]
pub struct QueryCall {
    pub target: CallTarget,
    /// Replaces the enclosing parameters for this call when present.
    pub params: Option<Params>,
}

impl QueryCall {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            target: CallTarget::Name(name.into()),
            params: None,
        }
    }

    pub fn reference(query: QueryRef) -> Self {
        Self {
            target: CallTarget::Ref(query),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn label(&self) -> &str {
        match &self.target {
            CallTarget::Name(name) => name,
            CallTarget::Ref(query) => query.name(),
        }
    }
}

impl From<&str> for QueryCall {
    fn from(name: &str) -> Self {
        QueryCall::name(name)
    }
}

impl From<QueryRef> for QueryCall {
    fn from(query: QueryRef) -> Self {
        QueryCall::reference(query)
    }
}

/// A parameter value.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Scalar),
    /// Expands to one placeholder per element, joined by `,`.
    In(Vec<Scalar>),
    /// Expands each call in order, joined by the separator.
    Inner(Vec<QueryCall>, String),
    Query(QueryRef),
}

impl Value {
    pub fn in_list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        Value::In(values.into_iter().map(Into::into).collect())
    }

    pub fn inner<I, C>(calls: I, separator: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<QueryCall>,
    {
        Value::Inner(calls.into_iter().map(Into::into).collect(), separator.into())
    }
}

impl From<Scalar> for Value {
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}

macro_rules! scalar_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_value!(bool, i32, i64, f64, &str, String, serde_json::Value);

impl<T: Into<Scalar>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        Value::Scalar(v.into())
    }
}

impl From<QueryRef> for Value {
    fn from(query: QueryRef) -> Self {
        Value::Query(query)
    }
}

/// Parameters for one expansion, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_in<I, T>(self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        self.with(name, Value::in_list(values))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_from() {
        assert_eq!(Scalar::from(true), Scalar::Bool(true));
        assert_eq!(Scalar::from(42i32), Scalar::Int(42));
        assert_eq!(Scalar::from(1.5f64), Scalar::Float(1.5));
        assert_eq!(Scalar::from("hello"), Scalar::Text("hello".to_string()));
        assert_eq!(Scalar::from(None::<i64>), Scalar::Null);
    }

    #[test]
    fn test_scalar_from_json() {
        assert_eq!(Scalar::from(json!(null)), Scalar::Null);
        assert_eq!(Scalar::from(json!(7)), Scalar::Int(7));
        assert_eq!(Scalar::from(json!(0.25)), Scalar::Float(0.25));
        assert_eq!(Scalar::from(json!("x")), Scalar::Text("x".to_string()));
        assert_eq!(Scalar::from(json!({"a": 1})), Scalar::Json(json!({"a": 1})));
    }

    #[test]
    fn test_scalar_display_quotes_text() {
        assert_eq!(Scalar::from("it's").to_string(), "'it''s'");
        assert_eq!(Scalar::Null.to_string(), "NULL");
    }

    #[test]
    fn test_params_builder() {
        let params = Params::new().with("id", 1).with_in("tags", ["a", "b"]);
        assert_eq!(params.len(), 2);
        assert!(matches!(params.get("id"), Some(Value::Scalar(Scalar::Int(1)))));
        match params.get("tags") {
            Some(Value::In(values)) => assert_eq!(values.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(params.get("missing").is_none());
    }

    #[test]
    fn test_params_from_iter() {
        let params: Params = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(params.len(), 2);
    }
}
