//! Interpolation policies: a value at an arbitrary instant from two bracketing samples
//!
//! Callers pass the floor (`left`) and ceiling (`right`) entries around `at`.
//! Outside the stored range both are the same sample, and every policy then
//! returns it unchanged.

use super::attribute_value::AttributeValue;
use super::timestamp::Timestamp;
use super::value::Value;
use crate::error::StatusServerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Hold the last value
    #[default]
    Last,
    /// Whichever sample is closer in time, left on ties
    Nearest,
    /// Linear in time between two numeric samples
    Linear,
}

impl Interpolation {
    pub fn interpolate(
        &self,
        left: &Arc<AttributeValue>,
        right: &Arc<AttributeValue>,
        at: Timestamp,
    ) -> Arc<AttributeValue> {
        if Arc::ptr_eq(left, right) || left.read_timestamp == right.read_timestamp {
            return left.clone();
        }

        match self {
            Interpolation::Last => left.clone(),
            Interpolation::Nearest => {
                let to_left = at.as_millis().abs_diff(left.read_timestamp.as_millis());
                let to_right = right.read_timestamp.as_millis().abs_diff(at.as_millis());
                if to_right < to_left {
                    right.clone()
                } else {
                    left.clone()
                }
            }
            Interpolation::Linear => Self::linear(left, right, at),
        }
    }

    fn linear(left: &Arc<AttributeValue>, right: &Arc<AttributeValue>, at: Timestamp) -> Arc<AttributeValue> {
        let (Some(y0), Some(y1)) = (left.value.as_f64(), right.value.as_f64()) else {
            return left.clone();
        };
        if at <= left.read_timestamp {
            return left.clone();
        }
        if at >= right.read_timestamp {
            return right.clone();
        }

        let x0 = left.read_timestamp.as_millis() as f64;
        let x1 = right.read_timestamp.as_millis() as f64;
        let ratio = (at.as_millis() as f64 - x0) / (x1 - x0);
        let value = y0 + (y1 - y0) * ratio;

        let w0 = left.write_timestamp.as_millis() as f64;
        let w1 = right.write_timestamp.as_millis() as f64;
        let write = Timestamp::from_millis((w0 + (w1 - w0) * ratio).round() as i64);

        Arc::new(left.with_value(Value::Float(value), at, write))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Last => "last",
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Interpolation {
    type Err = StatusServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" => Ok(Interpolation::Last),
            "nearest" => Ok(Interpolation::Nearest),
            "linear" => Ok(Interpolation::Linear),
            other => Err(StatusServerError::config(format!(
                "Unknown interpolation policy: {other}"
            ))),
        }
    }
}
