//! Typed column definitions and value conversion.
//!
//! A [`Column`] converts one field between its storage form (a SQLite
//! [`Value`]) and its in-memory form (a [`FieldValue`]). Both directions are
//! total for well-typed input and fail with `ModelError::TypeMismatch`
//! otherwise, with one deliberate exception: unparsable JSON text is read
//! as an empty object.

use chrono::{NaiveDate, NaiveDateTime};
use plinth_db::Value;

use crate::error::ModelError;
use crate::value::{FieldValue, JsonDecoder, JsonValue};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATETIME_PARSE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    String,
    Boolean,
    Date,
    DateTime,
    Json,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Json => "json",
        }
    }
}

/// One persisted field of a model.
#[derive(Debug, Clone)]
pub struct Column {
    name: &'static str,
    ty: ColumnType,
    nullable: bool,
    primary: bool,
    decoder: Option<JsonDecoder>,
    generator: Option<fn() -> FieldValue>,
}

impl Column {
    pub fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            primary: false,
            decoder: None,
            generator: None,
        }
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, ColumnType::String)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn date(name: &'static str) -> Self {
        Self::new(name, ColumnType::Date)
    }

    pub fn datetime(name: &'static str) -> Self {
        Self::new(name, ColumnType::DateTime)
    }

    /// A JSON column. Without a [`decoder`](Self::decoder) values are read
    /// back as untyped documents.
    pub fn json(name: &'static str) -> Self {
        Self::new(name, ColumnType::Json)
    }

    /// A string primary key filled with a random v4 UUID on insert.
    pub fn uuid_primary(name: &'static str) -> Self {
        Self::string(name)
            .primary()
            .generated(|| FieldValue::String(uuid::Uuid::new_v4().to_string()))
    }

    /// Allows `NULL` in both directions.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks this column as the primary key. Integer primary keys are
    /// assigned by the database on insert.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Decodes JSON documents into a typed value on read.
    pub fn decoder(mut self, decoder: JsonDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Fills the column on insert when the instance leaves it undefined.
    pub fn generated(mut self, generator: fn() -> FieldValue) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Integer primary keys are never written; the database assigns them.
    pub fn is_auto_increment(&self) -> bool {
        self.primary && self.ty == ColumnType::Integer
    }

    pub(crate) fn generate(&self) -> Option<FieldValue> {
        self.generator.map(|generate| generate())
    }

    fn mismatch(&self, reason: impl Into<String>) -> ModelError {
        ModelError::TypeMismatch {
            column: self.name,
            reason: reason.into(),
        }
    }

    /// Converts an in-memory value into its storage form.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` for `Null` on a non-nullable
    /// column, for a value of the wrong kind, or for a JSON value that
    /// cannot be encoded.
    pub fn to_storage(&self, value: &FieldValue) -> Result<Value, ModelError> {
        match (self.ty, value) {
            (_, FieldValue::Null) if self.nullable => Ok(Value::Null),
            (_, FieldValue::Null) => Err(self.mismatch("null given to a non-nullable column")),
            (ColumnType::Integer, FieldValue::Integer(v)) => Ok(Value::Integer(*v)),
            (ColumnType::String, FieldValue::String(v)) => Ok(Value::Text(v.clone())),
            (ColumnType::Boolean, FieldValue::Boolean(v)) => Ok(Value::Integer(i64::from(*v))),
            (ColumnType::Date, FieldValue::Date(v)) => {
                Ok(Value::Text(v.format(DATE_FORMAT).to_string()))
            }
            (ColumnType::DateTime, FieldValue::DateTime(v)) => {
                Ok(Value::Text(v.format(DATETIME_FORMAT).to_string()))
            }
            (ColumnType::Json, FieldValue::Json(v)) => self.encode_json(v),
            (ty, other) => Err(self.mismatch(format!(
                "expected {}, got {}",
                ty.as_str(),
                other.kind()
            ))),
        }
    }

    fn encode_json(&self, value: &JsonValue) -> Result<Value, ModelError> {
        if let JsonValue::Raw(_) = value {
            tracing::warn!(
                column = self.name,
                "json column value has no encoder, storing it as-is"
            );
        }
        let json = value
            .to_json()
            .map_err(|e| self.mismatch(format!("failed to encode json: {e}")))?;
        serde_json::to_string(&json)
            .map(Value::Text)
            .map_err(|e| self.mismatch(format!("failed to encode json: {e}")))
    }

    /// Converts a storage value into its in-memory form.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::TypeMismatch` for `NULL` on a non-nullable
    /// column or when the stored data does not have the declared shape.
    pub fn from_storage(&self, value: Value) -> Result<FieldValue, ModelError> {
        match (self.ty, value) {
            (_, Value::Null) if self.nullable => Ok(FieldValue::Null),
            (_, Value::Null) => Err(self.mismatch("null stored in a non-nullable column")),
            (ColumnType::Integer, Value::Integer(v)) => Ok(FieldValue::Integer(v)),
            (ColumnType::Integer, Value::Real(v)) => {
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                    Ok(FieldValue::Integer(v as i64))
                } else {
                    Err(self.mismatch(format!("{v} is not an integer")))
                }
            }
            (ColumnType::String, Value::Text(v)) => Ok(FieldValue::String(v)),
            (ColumnType::Boolean, Value::Integer(1)) => Ok(FieldValue::Boolean(true)),
            (ColumnType::Boolean, Value::Integer(0)) => Ok(FieldValue::Boolean(false)),
            (ColumnType::Boolean, Value::Integer(v)) => {
                Err(self.mismatch(format!("boolean must be stored as 0 or 1, got {v}")))
            }
            (ColumnType::Date, Value::Text(v)) => NaiveDate::parse_from_str(&v, DATE_FORMAT)
                .map(FieldValue::Date)
                .map_err(|e| self.mismatch(format!("invalid date {v:?}: {e}"))),
            (ColumnType::DateTime, Value::Text(v)) => DATETIME_PARSE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(&v, format).ok())
                .map(FieldValue::DateTime)
                .ok_or_else(|| self.mismatch(format!("invalid datetime {v:?}"))),
            (ColumnType::Json, Value::Text(v)) => self.decode_json(&v),
            (ty, other) => Err(self.mismatch(format!(
                "expected {} storage, got {:?}",
                ty.as_str(),
                other.data_type()
            ))),
        }
    }

    fn decode_json(&self, text: &str) -> Result<FieldValue, ModelError> {
        let json = match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(
                    column = self.name,
                    error = %e,
                    "stored json could not be parsed, reading it as an empty object"
                );
                serde_json::Value::Object(serde_json::Map::new())
            }
        };

        match &self.decoder {
            Some(decoder) => decoder.decode(json).map(FieldValue::Json).map_err(|e| {
                self.mismatch(format!(
                    "json does not decode as {}: {e}",
                    decoder.type_name()
                ))
            }),
            None => Ok(FieldValue::Json(JsonValue::Raw(json))),
        }
    }
}
