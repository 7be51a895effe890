//! In-memory field values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that knows how to encode itself for a JSON column.
///
/// Implemented for every `Serialize` type, so any serde structure can be
/// stored in a JSON column and recovered with [`JsonValue::downcast_ref`].
pub trait Encode: Any + Send + Sync + fmt::Debug {
    /// Encodes the value into a JSON document.
    fn encode(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Upcast used to recover the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl<T> Encode for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Contents of a JSON column.
#[derive(Clone)]
pub enum JsonValue {
    /// An untyped document, written back as-is.
    Raw(serde_json::Value),
    /// A typed value carrying its own encoder.
    Encoded(Arc<dyn Encode>),
}

impl JsonValue {
    /// Wraps a typed value.
    pub fn encoded<T: Encode>(value: T) -> Self {
        Self::Encoded(Arc::new(value))
    }

    /// Wraps an untyped JSON document.
    pub fn raw(value: serde_json::Value) -> Self {
        Self::Raw(value)
    }

    /// Returns the typed value if this holds a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Encoded(value) => (**value).as_any().downcast_ref::<T>(),
            Self::Raw(_) => None,
        }
    }

    /// Returns the untyped document, if this is one.
    pub fn as_raw(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Raw(value) => Some(value),
            Self::Encoded(_) => None,
        }
    }

    /// Produces the JSON document that would be stored.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Raw(value) => Ok(value.clone()),
            Self::Encoded(value) => value.encode(),
        }
    }
}

impl fmt::Debug for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(value) => f.debug_tuple("Raw").field(value).finish(),
            Self::Encoded(value) => f.debug_tuple("Encoded").field(value).finish(),
        }
    }
}

impl PartialEq for JsonValue {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_json(), other.to_json()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

type DecodeFn = dyn Fn(serde_json::Value) -> Result<Arc<dyn Encode>, serde_json::Error> + Send + Sync;

/// Turns a parsed JSON document back into a typed value on read.
#[derive(Clone)]
pub struct JsonDecoder {
    type_name: &'static str,
    decode: Arc<DecodeFn>,
}

impl JsonDecoder {
    /// A decoder producing `T` through serde.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Encode,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            decode: Arc::new(
                |json: serde_json::Value| -> Result<Arc<dyn Encode>, serde_json::Error> {
                    let value: T = serde_json::from_value(json)?;
                    Ok(Arc::new(value) as Arc<dyn Encode>)
                },
            ),
        }
    }

    /// Name of the type this decoder produces.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Decodes a parsed document.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the document does not fit the type.
    pub fn decode(&self, json: serde_json::Value) -> Result<JsonValue, serde_json::Error> {
        (self.decode)(json).map(JsonValue::Encoded)
    }
}

impl fmt::Debug for JsonDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDecoder")
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// The in-memory value of one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Integer(i64),
    String(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Json(JsonValue),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
