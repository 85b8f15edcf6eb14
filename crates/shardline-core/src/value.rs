// SPDX-License-Identifier: Apache-2.0

//! SQL value model
//!
//! A normalized representation of the cell values that flow through the
//! sharding core: sharding values resolved from predicates, statement
//! parameters, and the columns of physical result rows.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ShardingError, ShardingResult};

/// A single SQL value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Comparison family of a value.
///
/// Values of the same family are totally ordered; values of different
/// families never compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFamily {
    Null,
    Bool,
    Numeric,
    Text,
    Bytes,
    Temporal,
}

/// Requested type when reading a column from a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Decimal,
    Float,
    Text,
}

/// Hashable, equality-normalized form of a value used as a grouping key.
///
/// `Int(1)`, `Decimal(1.00)` and `Float(1.0)` all map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Number(Decimal),
    FloatBits(u64),
    Text(String),
    Bytes(Vec<u8>),
    Temporal(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn family(&self) -> ValueFamily {
        match self {
            Self::Null => ValueFamily::Null,
            Self::Bool(_) => ValueFamily::Bool,
            Self::Int(_) | Self::Decimal(_) | Self::Float(_) => ValueFamily::Numeric,
            Self::Text(_) => ValueFamily::Text,
            Self::Bytes(_) => ValueFamily::Bytes,
            Self::Date(_) | Self::DateTime(_) => ValueFamily::Temporal,
        }
    }

    /// Integer view of the value, parsing text and accepting integral decimals.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Text(s) => s.trim().parse::<i64>().ok(),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Int(v) => Some(Decimal::from(*v)),
            Self::Decimal(d) => Some(*d),
            Self::Float(f) => Decimal::try_from(*f).ok(),
            Self::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Decimal(d) => d.to_f64(),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Compares two values of the same family.
    ///
    /// Returns `None` when the families differ or either side is NULL
    /// (NULL placement is the caller's policy).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(_), _) | (_, Self::Float(_))
                if self.family() == ValueFamily::Numeric
                    && other.family() == ValueFamily::Numeric =>
            {
                let a = self.to_f64()?;
                let b = other.to_f64()?;
                Some(a.total_cmp(&b))
            }
            (a, b) if a.family() == ValueFamily::Numeric && b.family() == ValueFamily::Numeric => {
                Some(a.to_decimal()?.cmp(&b.to_decimal()?))
            }
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (a, b) if a.family() == ValueFamily::Temporal && b.family() == ValueFamily::Temporal => {
                Some(a.as_datetime()?.cmp(&b.as_datetime()?))
            }
            _ => None,
        }
    }

    /// Grouping key with numeric normalization.
    pub fn key(&self) -> ValueKey {
        match self {
            Self::Null => ValueKey::Null,
            Self::Bool(b) => ValueKey::Bool(*b),
            Self::Int(v) => ValueKey::Number(Decimal::from(*v)),
            Self::Decimal(d) => ValueKey::Number(d.normalize()),
            Self::Float(f) => match Decimal::try_from(*f) {
                Ok(d) => ValueKey::Number(d.normalize()),
                Err(_) => ValueKey::FloatBits(f.to_bits()),
            },
            Self::Text(s) => ValueKey::Text(s.clone()),
            Self::Bytes(b) => ValueKey::Bytes(b.clone()),
            Self::Date(_) | Self::DateTime(_) => match self.as_datetime() {
                Some(dt) => ValueKey::Temporal(dt),
                None => ValueKey::Null,
            },
        }
    }

    /// Converts the value to the requested type. NULL converts to NULL.
    pub fn cast(&self, value_type: ValueType) -> ShardingResult<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        let converted = match value_type {
            ValueType::Any => Some(self.clone()),
            ValueType::Int => self.as_i64().map(Value::Int),
            ValueType::Decimal => self.to_decimal().map(Value::Decimal),
            ValueType::Float => self.to_f64().map(Value::Float),
            ValueType::Text => Some(Value::Text(self.to_string())),
            ValueType::Bool => match self {
                Self::Bool(b) => Some(Value::Bool(*b)),
                other => other.as_i64().map(|v| Value::Bool(v != 0)),
            },
        };
        converted.ok_or_else(|| {
            ShardingError::cursor(format!("cannot convert {self} to {value_type:?}"))
        })
    }

    /// Renders the value as a SQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Decimal(d) => d.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
            Self::Date(_) | Self::DateTime(_) => format!("'{self}'"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
