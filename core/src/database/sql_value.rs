use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use uuid::Uuid;

/// An application value headed for a single column of a bulk statement.
///
/// Lists become SQL arrays (or JSON when the column is `json`/`jsonb`), maps become JSON or
/// `hstore` text depending on the column type. Map keys are kept sorted so rendering is
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    List(Vec<SqlValue>),
    Map(BTreeMap<String, SqlValue>),

    Json(serde_json::Value),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
}

impl SqlValue {
    /// Text form used when a value is embedded inside another text format (hstore pairs,
    /// the quoted fallback). `None` for null.
    pub fn to_plain_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(value) => Some(value.to_string()),
            SqlValue::Int(value) => Some(value.to_string()),
            SqlValue::Float(value) => Some(format_float(*value)),
            SqlValue::Decimal(value) => Some(value.to_string()),
            SqlValue::String(value) => Some(value.clone()),
            SqlValue::List(_) | SqlValue::Map(_) | SqlValue::Json(_) => {
                serde_json::to_string(self).ok()
            }
            SqlValue::Date(value) => Some(value.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(value) => Some(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            SqlValue::TimestampTz(value) => Some(value.to_rfc3339()),
            SqlValue::Uuid(value) => Some(value.to_string()),
        }
    }
}

/// Shortest text that round-trips the float. Non-finite values use the spelling Postgres
/// accepts for `double precision` input.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{:?}", value)
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(value) => serializer.serialize_bool(*value),
            SqlValue::Int(value) => serializer.serialize_i64(*value),
            SqlValue::Float(value) => {
                if value.is_finite() {
                    serializer.serialize_f64(*value)
                } else {
                    Err(S::Error::custom(format!("{} has no json representation", format_float(*value))))
                }
            }
            // a json number carrying the exact decimal digits
            SqlValue::Decimal(value) => serde_json::Number::from_str(&value.to_string())
                .map_err(S::Error::custom)?
                .serialize(serializer),
            SqlValue::String(value) => serializer.serialize_str(value),
            SqlValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            SqlValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            SqlValue::Json(value) => value.serialize(serializer),
            SqlValue::Date(_)
            | SqlValue::Timestamp(_)
            | SqlValue::TimestampTz(_)
            | SqlValue::Uuid(_) => match self.to_plain_text() {
                Some(text) => serializer.serialize_str(&text),
                None => serializer.serialize_none(),
            },
        }
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float(f64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Decimal(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        SqlValue::Json(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::TimestampTz(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for SqlValue {
    fn from(value: Vec<T>) -> Self {
        SqlValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SqlValue>> From<BTreeMap<String, T>> for SqlValue {
    fn from(value: BTreeMap<String, T>) -> Self {
        SqlValue::Map(value.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
