//! Measurement values and the runtime types instruments report them as

use crate::error::StatusServerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single measured value.
///
/// `Null` is the "never observed" sentinel every attribute starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Runtime type an instrument declares for one of its attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    State,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Short => "short",
            ValueType::UShort => "ushort",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Long => "long",
            ValueType::ULong => "ulong",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::State => "state",
        }
    }

    /// Integer and floating point types; booleans and states are not numeric
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Short
                | ValueType::UShort
                | ValueType::Int
                | ValueType::UInt
                | ValueType::Long
                | ValueType::ULong
                | ValueType::Float
                | ValueType::Double
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = StatusServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "short" => Ok(ValueType::Short),
            "ushort" => Ok(ValueType::UShort),
            "int" | "integer" => Ok(ValueType::Int),
            "uint" => Ok(ValueType::UInt),
            "long" => Ok(ValueType::Long),
            "ulong" => Ok(ValueType::ULong),
            "float" => Ok(ValueType::Float),
            "double" => Ok(ValueType::Double),
            "string" => Ok(ValueType::String),
            "state" => Ok(ValueType::State),
            other => Err(StatusServerError::invalid_input(format!(
                "Unknown value type: {other}"
            ))),
        }
    }
}
