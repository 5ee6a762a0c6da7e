use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

/// Severity of an event, ordered from the most to the least severe.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Level {
    LogAlways,
    Critical,
    Error,
    Warning,
    #[default]
    Informational,
    Verbose,
}

impl Level {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::LogAlways => "LogAlways",
            Level::Critical => "Critical",
            Level::Error => "Error",
            Level::Warning => "Warning",
            Level::Informational => "Informational",
            Level::Verbose => "Verbose",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value of a payload field.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Bytes - usually representing a UTF8 String,
    Bytes(Bytes),

    /// Integer
    Integer(i64),

    /// Float
    Float(f64),

    /// Boolean
    Boolean(bool),

    /// Timestamp with UTC
    Timestamp(DateTime<Utc>),

    /// Object
    Object(BTreeMap<String, Value>),

    /// Array
    Array(Vec<Value>),

    /// Null
    Null,
}

impl Value {
    /// Returns the textual content, only if self is `Value::Bytes`.
    pub fn as_str(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Value::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    /// Renders the value the way it is written into a log line.
    ///
    /// Timestamps are rendered as RFC 3339, containers as JSON and `Null`
    /// as an empty string.
    pub fn render(&self) -> String {
        match self {
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::Object(_) | Value::Array(_) => self.to_json().to_string(),
            Value::Null => String::new(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Integer(i) => (*i).into(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => (*b).into(),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Array(array) => {
                serde_json::Value::Array(array.iter().map(Value::to_json).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Bytes(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<BTreeMap<String, Self>> for Value {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Object(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A structured telemetry event handed over by the hosting pipeline.
///
/// The payload keeps insertion order, which is also the order fields are
/// written into the log line.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub payload: IndexMap<String, Value>,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, level: Level) -> Self {
        Self {
            timestamp,
            level,
            payload: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_field(key, value);
        self
    }

    pub fn insert_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.payload.insert(key.into(), value.into())
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

#[macro_export]
macro_rules! fields {
    ( $($x:expr => $y:expr),* ) => ({
        let mut _map: $crate::indexmap::IndexMap<String, $crate::event::Value> =
            $crate::indexmap::IndexMap::new();
        $(
            _map.insert($x.into(), $y.into());
        )*
        _map
    });
    ( $($x:expr => $y:expr,)* ) => (
        $crate::fields!{$($x => $y),*}
    );
}
