//! Capability contract for remote instrument clients
//!
//! The engine only needs to read, write, subscribe to and introspect
//! attributes of a device. Protocol bindings implement [`Client`]; one client
//! exists per device and is created through a [`ClientFactory`].

pub mod client_factory;
pub mod simulated;

use crate::data::{Timestamp, Value, ValueType};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use client_factory::{ClientFactory, ClientFailure, ClientsManager};
pub use simulated::{SimulatedClient, SimulatedClientFactory};

/// A value read from (or pushed by) a device, with the device-side timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeReading {
    pub value: Value,
    pub write_timestamp: Timestamp,
}

impl AttributeReading {
    pub fn new(value: Value, write_timestamp: Timestamp) -> Self {
        Self {
            value,
            write_timestamp,
        }
    }
}

/// Invoked by the client for every pushed event, on a thread the client owns
pub type EventCallback = Arc<dyn Fn(Result<AttributeReading>) + Send + Sync>;

/// Operations the engine consumes from a device
#[async_trait]
pub trait Client: Send + Sync {
    /// Device this client talks to
    fn device_name(&self) -> &str;

    /// Read the current value and its device-side timestamp
    async fn read_attribute(&self, name: &str) -> Result<AttributeReading>;

    /// Write a value
    async fn write_attribute(&self, name: &str, value: Value) -> Result<()>;

    /// Start delivering change events for `name` to `callback`
    async fn subscribe_event(&self, name: &str, callback: EventCallback) -> Result<()>;

    /// Stop delivering change events for `name`
    async fn unsubscribe_event(&self, name: &str) -> Result<()>;

    /// Whether the attribute exists and can be read
    async fn check_attribute(&self, name: &str) -> bool;

    /// Runtime type the device declares for the attribute
    async fn get_attribute_class(&self, name: &str) -> Result<ValueType>;
}
