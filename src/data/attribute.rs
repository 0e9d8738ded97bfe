//! Per-attribute time-series store
//!
//! Each [`Attribute`] keeps an O(1) "last value" cell and an ordered,
//! concurrently readable history keyed by read timestamp. One writer per
//! attribute (a poll task or an event callback) and any number of readers may
//! use it at the same time; readers never block and never observe a
//! half-built sample.

use super::attribute_value::{AttributeName, AttributeValue};
use super::interpolation::Interpolation;
use super::timestamp::Timestamp;
use super::value::{Value, ValueType};
use arc_swap::ArcSwap;
use crossbeam_skiplist::SkipMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// How values reach an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Read on a timer
    #[default]
    #[serde(alias = "POLL")]
    Poll,
    /// Pushed by the instrument
    #[serde(alias = "EVENT")]
    Event,
}

/// Acceptance policy applied before a sample enters history
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeKind {
    /// Drops samples that moved less than `precision` from the last value
    Numeric { precision: f64 },
    /// Accepts everything
    NonNumeric,
}

impl AttributeKind {
    /// Numeric runtime types get the deduplicating policy
    pub fn for_type(value_type: ValueType, precision: f64) -> Self {
        if value_type.is_numeric() {
            AttributeKind::Numeric {
                precision: precision.abs(),
            }
        } else {
            AttributeKind::NonNumeric
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeKind::Numeric { .. })
    }

    fn accepts(&self, last: &AttributeValue, candidate: &AttributeValue) -> bool {
        match self {
            AttributeKind::NonNumeric => true,
            AttributeKind::Numeric { precision } => {
                match (last.value.as_f64(), candidate.value.as_f64()) {
                    (Some(previous), Some(next)) => (next - previous).abs() >= *precision,
                    _ => true,
                }
            }
        }
    }
}

pub struct Attribute {
    name: AttributeName,
    kind: AttributeKind,
    value_type: ValueType,
    method: Method,
    interpolation: Interpolation,
    poll_delay: Duration,
    last_value: ArcSwap<AttributeValue>,
    values: SkipMap<Timestamp, Arc<AttributeValue>>,
    size: AtomicUsize,
}

impl Attribute {
    /// New attribute whose last value is the `Null` placeholder
    pub fn new(name: AttributeName, kind: AttributeKind, value_type: ValueType) -> Self {
        let now = Timestamp::now();
        let placeholder = AttributeValue::new(&name, Value::Null, now, now);
        Self {
            name,
            kind,
            value_type,
            method: Method::Poll,
            interpolation: Interpolation::Last,
            poll_delay: Duration::from_millis(1_000),
            last_value: ArcSwap::from_pointee(placeholder),
            values: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_poll_delay(mut self, poll_delay: Duration) -> Self {
        self.poll_delay = poll_delay;
        self
    }

    /// Record a sample. Returns whether it was accepted.
    ///
    /// Samples must arrive with strictly increasing read timestamps; a sample
    /// at or before the newest stored key is dropped.
    pub fn add_value(&self, read_timestamp: Timestamp, value: Value, write_timestamp: Timestamp) -> bool {
        if let Some(newest) = self.values.back() {
            if *newest.key() >= read_timestamp {
                trace!(
                    "Dropping out-of-order sample for {} at {} (newest {})",
                    self.name,
                    read_timestamp,
                    newest.key()
                );
                return false;
            }
        }

        let candidate = AttributeValue::new(&self.name, value, read_timestamp, write_timestamp);
        if !self.kind.accepts(&self.last_value.load(), &candidate) {
            trace!("Sample for {} within precision, skipped", self.name);
            return false;
        }

        let candidate = Arc::new(candidate);
        self.last_value.store(candidate.clone());
        // the counter leads the map: a concurrent reader may briefly see one
        // more than the stored entries, never fewer
        self.size.fetch_add(1, Ordering::AcqRel);
        self.values.insert(read_timestamp, candidate);
        true
    }

    /// Overwrite the last value without touching history
    pub fn replace_value(&self, read_timestamp: Timestamp, value: Value, write_timestamp: Timestamp) {
        self.last_value.store(Arc::new(AttributeValue::new(
            &self.name,
            value,
            read_timestamp,
            write_timestamp,
        )));
    }

    /// Latest value, the `Null` placeholder until the first sample
    pub fn get_attribute_value(&self) -> Arc<AttributeValue> {
        self.last_value.load_full()
    }

    /// Value at `timestamp` using the attribute's own interpolation
    pub fn get_attribute_value_at(&self, timestamp: Timestamp) -> Arc<AttributeValue> {
        self.get_attribute_value_with(timestamp, self.interpolation)
    }

    /// Value at `timestamp` using the given interpolation
    pub fn get_attribute_value_with(&self, timestamp: Timestamp, interpolation: Interpolation) -> Arc<AttributeValue> {
        let left = self
            .values
            .upper_bound(Bound::Included(&timestamp))
            .or_else(|| self.values.front());
        let right = self
            .values
            .lower_bound(Bound::Included(&timestamp))
            .or_else(|| self.values.back());

        match (left, right) {
            (Some(left), Some(right)) => interpolation.interpolate(left.value(), right.value(), timestamp),
            _ => self.get_attribute_value(),
        }
    }

    /// All stored samples at or after `from`, oldest first
    pub fn get_attribute_values(&self, from: Timestamp) -> impl Iterator<Item = Arc<AttributeValue>> + '_ {
        self.values.range(from..).map(|entry| entry.value().clone())
    }

    /// Drop every sample strictly older than `timestamp`; returns how many went
    pub fn erase_head(&self, timestamp: Timestamp) -> usize {
        let mut removed = 0;
        for entry in self.values.range(..timestamp) {
            if entry.remove() {
                removed += 1;
            }
        }
        self.size.fetch_sub(removed, Ordering::AcqRel);
        removed
    }

    /// Empty history. The last value stays.
    pub fn clear(&self) {
        let mut removed = 0;
        while self.values.pop_front().is_some() {
            removed += 1;
        }
        self.size.fetch_sub(removed, Ordering::AcqRel);
    }

    /// Number of samples in history
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &AttributeName {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        self.name.full_name()
    }

    pub fn device_name(&self) -> &str {
        self.name.device_name()
    }

    pub fn alias(&self) -> Option<&str> {
        self.name.alias()
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn poll_delay(&self) -> Duration {
        self.poll_delay
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name.full_name())
            .field("kind", &self.kind)
            .field("value_type", &self.value_type)
            .field("method", &self.method)
            .field("interpolation", &self.interpolation)
            .field("size", &self.size())
            .finish()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Attribute {}
