use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Value type for a request keyword.
///
/// Lists are rendered slash-separated, as MARS expects (`165.128/166.128`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValue {
    Str(String),
    List(Vec<String>),
}

impl From<&str> for RequestValue {
    fn from(value: &str) -> Self {
        RequestValue::Str(value.to_string())
    }
}

impl From<String> for RequestValue {
    fn from(value: String) -> Self {
        RequestValue::Str(value)
    }
}

impl From<&String> for RequestValue {
    fn from(value: &String) -> Self {
        RequestValue::Str(value.clone())
    }
}

impl From<i32> for RequestValue {
    fn from(value: i32) -> Self {
        RequestValue::Str(value.to_string())
    }
}

impl From<u32> for RequestValue {
    fn from(value: u32) -> Self {
        RequestValue::Str(value.to_string())
    }
}

impl From<Vec<String>> for RequestValue {
    fn from(value: Vec<String>) -> Self {
        RequestValue::List(value)
    }
}

impl From<&[String]> for RequestValue {
    fn from(value: &[String]) -> Self {
        RequestValue::List(value.to_vec())
    }
}

impl From<Vec<&str>> for RequestValue {
    fn from(value: Vec<&str>) -> Self {
        RequestValue::List(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RequestValue {
    fn from(value: [&str; N]) -> Self {
        RequestValue::List(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl RequestValue {
    /// Parse a user-provided string into a [`RequestValue`].
    ///
    /// `"165.128/166.128"` becomes a two-element list, anything without a
    /// slash stays a plain string. Empty segments are dropped.
    pub fn parse_auto(s: &str) -> Self {
        let t = s.trim();
        if !t.contains('/') {
            return RequestValue::Str(t.to_string());
        }
        RequestValue::List(
            t.split('/')
                .map(str::trim)
                .filter(|x| !x.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn as_strings(&self) -> Vec<String> {
        match self {
            RequestValue::Str(s) => vec![s.clone()],
            RequestValue::List(xs) => xs.clone(),
        }
    }

    /// Wire form of the value.
    pub fn render(&self) -> String {
        match self {
            RequestValue::Str(s) => s.clone(),
            RequestValue::List(xs) => xs.join("/"),
        }
    }
}

/// One retrieval job, expressed as MARS keyword/value pairs.
///
/// `target` is local-only: it names the file the result is written to and is
/// never sent to the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub(crate) inner: BTreeMap<String, RequestValue>,
}

impl Request {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Insert a keyword/value pair (value can be a scalar or list).
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<RequestValue>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Construct a request from string pairs (typical for config inputs).
    /// Values are parsed with [`RequestValue::parse_auto`].
    pub fn from_str_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut r = Self::new();
        for (k, v) in pairs {
            r = r.kw(k, RequestValue::parse_auto(v.as_ref()));
        }
        r
    }

    pub fn class(self, v: impl Into<RequestValue>) -> Self {
        self.kw("class", v)
    }

    pub fn dataset(self, v: impl Into<RequestValue>) -> Self {
        self.kw("dataset", v)
    }

    pub fn date(self, v: impl Into<RequestValue>) -> Self {
        self.kw("date", v)
    }

    pub fn expver(self, v: impl Into<RequestValue>) -> Self {
        self.kw("expver", v)
    }

    pub fn grid(self, v: impl Into<RequestValue>) -> Self {
        self.kw("grid", v)
    }

    pub fn levtype(self, v: impl Into<RequestValue>) -> Self {
        self.kw("levtype", v)
    }

    pub fn param(self, v: impl Into<RequestValue>) -> Self {
        self.kw("param", v)
    }

    pub fn stream(self, v: impl Into<RequestValue>) -> Self {
        self.kw("stream", v)
    }

    pub fn r#type(self, v: impl Into<RequestValue>) -> Self {
        self.kw("type", v)
    }

    pub fn area(self, v: impl Into<RequestValue>) -> Self {
        self.kw("area", v)
    }

    pub fn format(self, v: impl Into<RequestValue>) -> Self {
        self.kw("format", v)
    }

    pub fn target(self, v: impl Into<RequestValue>) -> Self {
        self.kw("target", v)
    }

    pub fn get(&self, key: &str) -> Option<&RequestValue> {
        self.inner.get(key)
    }

    /// Rendered value of `key`, if present.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(RequestValue::render)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequestValue)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// JSON object with every keyword rendered as a string, `target` included.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .inner
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.render())))
            .collect();
        Value::Object(map)
    }

    /// The body submitted to the service: everything except `target`.
    pub fn to_payload(&self) -> Value {
        let map: Map<String, Value> = self
            .inner
            .iter()
            .filter(|(k, _)| k.as_str() != "target")
            .map(|(k, v)| (k.clone(), Value::String(v.render())))
            .collect();
        Value::Object(map)
    }
}
