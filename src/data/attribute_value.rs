//! Immutable samples and their textual renderings

use super::timestamp::Timestamp;
use super::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a monitored attribute: `<device>/<attribute>` plus an optional alias
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeName {
    device_name: String,
    name: String,
    alias: Option<String>,
    full_name: String,
}

impl AttributeName {
    pub fn new(device_name: &str, name: &str, alias: Option<&str>) -> Self {
        Self {
            device_name: device_name.to_string(),
            name: name.to_string(),
            alias: alias.filter(|a| !a.is_empty()).map(str::to_string),
            full_name: Self::full_name_of(device_name, name),
        }
    }

    /// Full name as used for interning and lookups
    pub fn full_name_of(device_name: &str, name: &str) -> String {
        format!("{device_name}/{name}")
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// One observation of an attribute.
///
/// `read_timestamp` is the local capture time, `write_timestamp` the time the
/// instrument reported for the value. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub full_name: String,
    pub alias: Option<String>,
    pub value: Value,
    pub read_timestamp: Timestamp,
    pub write_timestamp: Timestamp,
}

impl AttributeValue {
    pub fn new(
        name: &AttributeName,
        value: Value,
        read_timestamp: Timestamp,
        write_timestamp: Timestamp,
    ) -> Self {
        Self {
            full_name: name.full_name().to_string(),
            alias: name.alias().map(str::to_string),
            value,
            read_timestamp,
            write_timestamp,
        }
    }

    /// Same identity, different value and times
    pub fn with_value(&self, value: Value, read_timestamp: Timestamp, write_timestamp: Timestamp) -> Self {
        Self {
            full_name: self.full_name.clone(),
            alias: self.alias.clone(),
            value,
            read_timestamp,
            write_timestamp,
        }
    }

    /// Alias when requested and present, full name otherwise
    pub fn display_name(&self, use_alias: bool) -> &str {
        match (&self.alias, use_alias) {
            (Some(alias), true) => alias,
            _ => &self.full_name,
        }
    }

    /// `read_timestamp[value@write_timestamp]`
    pub fn sample_string(&self) -> String {
        format!("{}[{}@{}]", self.read_timestamp, self.value, self.write_timestamp)
    }

    /// `name=read_timestamp[value@write_timestamp]`
    pub fn render(&self, use_alias: bool) -> String {
        format!("{}={}", self.display_name(use_alias), self.sample_string())
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

/// Flat export form of a sample: six ordered fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub full_name: String,
    pub alias: String,
    pub value_type: String,
    pub value: String,
    pub read_timestamp: i64,
    pub write_timestamp: i64,
}

impl ExportRow {
    pub fn new(sample: &AttributeValue, value_type: ValueType) -> Self {
        Self {
            full_name: sample.full_name.clone(),
            alias: sample.alias.clone().unwrap_or_default(),
            value_type: value_type.name().to_string(),
            value: sample.value.to_string(),
            read_timestamp: sample.read_timestamp.as_millis(),
            write_timestamp: sample.write_timestamp.as_millis(),
        }
    }

    pub fn fields(&self) -> [String; 6] {
        [
            self.full_name.clone(),
            self.alias.clone(),
            self.value_type.clone(),
            self.value.clone(),
            self.read_timestamp.to_string(),
            self.write_timestamp.to_string(),
        ]
    }
}
