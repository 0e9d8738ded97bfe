//! Common test utilities: a scripted device client and engine builders

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use instrument_status_server::client::{
    AttributeReading, Client, ClientFactory, ClientsManager, EventCallback,
};
use instrument_status_server::config::AttributeDescriptor;
use instrument_status_server::data::{Timestamp, Value, ValueType};
use instrument_status_server::registry::AttributesManager;
use instrument_status_server::{Engine, Result, Scheduler, StatusServerError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEVICE: &str = "test/device";

/// Reads return 1.0, 2.0, 3.0, ...; every `fail_every`-th read fails and
/// the `panic_on`-th read panics.
/// Events are pushed by the test with [`ScriptedClient::push`].
pub struct ScriptedClient {
    device_name: String,
    reads: AtomicUsize,
    fail_every: Option<usize>,
    panic_on: Option<usize>,
    callbacks: DashMap<String, EventCallback>,
    unavailable: DashSet<String>,
    types: DashMap<String, ValueType>,
}

impl ScriptedClient {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            reads: AtomicUsize::new(0),
            fail_every: None,
            panic_on: None,
            callbacks: DashMap::new(),
            unavailable: DashSet::new(),
            types: DashMap::new(),
        }
    }

    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    /// The `n`-th read panics instead of returning
    pub fn panicking_on(mut self, n: usize) -> Self {
        self.panic_on = Some(n);
        self
    }

    pub fn with_unavailable(self, name: &str) -> Self {
        self.unavailable.insert(name.to_string());
        self
    }

    pub fn with_type(self, name: &str, value_type: ValueType) -> Self {
        self.types.insert(name.to_string(), value_type);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Deliver an event; false when nobody is subscribed
    pub fn push(&self, name: &str, value: Value) -> bool {
        let Some(callback) = self.callbacks.get(name).map(|c| c.value().clone()) else {
            return false;
        };
        callback(Ok(AttributeReading::new(value, Timestamp::now())));
        true
    }

    pub fn push_error(&self, name: &str) -> bool {
        let Some(callback) = self.callbacks.get(name).map(|c| c.value().clone()) else {
            return false;
        };
        callback(Err(StatusServerError::client("scripted event failure")));
        true
    }
}

#[async_trait]
impl Client for ScriptedClient {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    async fn read_attribute(&self, name: &str) -> Result<AttributeReading> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(n) {
            panic!("scripted panic reading {name}");
        }
        if matches!(self.fail_every, Some(every) if n % every == 0) {
            return Err(StatusServerError::client(format!("scripted failure reading {name}")));
        }
        Ok(AttributeReading::new(Value::Float(n as f64), Timestamp::now()))
    }

    async fn write_attribute(&self, _name: &str, _value: Value) -> Result<()> {
        Ok(())
    }

    async fn subscribe_event(&self, name: &str, callback: EventCallback) -> Result<()> {
        self.callbacks.insert(name.to_string(), callback);
        Ok(())
    }

    async fn unsubscribe_event(&self, name: &str) -> Result<()> {
        self.callbacks.remove(name);
        Ok(())
    }

    async fn check_attribute(&self, name: &str) -> bool {
        !self.unavailable.contains(name)
    }

    async fn get_attribute_class(&self, name: &str) -> Result<ValueType> {
        Ok(self.types.get(name).map(|t| *t.value()).unwrap_or(ValueType::Double))
    }
}

/// Hands out pre-built scripted clients; unknown devices fail
#[derive(Default)]
pub struct ScriptedFactory {
    clients: DashMap<String, Arc<ScriptedClient>>,
}

impl ScriptedFactory {
    pub fn with_client(self, client: ScriptedClient) -> Self {
        self.clients.insert(client.device_name.clone(), Arc::new(client));
        self
    }

    pub fn client(&self, device_name: &str) -> Arc<ScriptedClient> {
        self.clients
            .get(device_name)
            .map(|c| c.value().clone())
            .expect("scripted client registered")
    }
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    async fn create_client(&self, device_name: &str) -> Result<Arc<dyn Client>> {
        match self.clients.get(device_name) {
            Some(client) => Ok(client.value().clone() as Arc<dyn Client>),
            None => Err(StatusServerError::client(format!("{device_name} is offline"))),
        }
    }
}

/// Engine over one scripted client with the given attributes
pub fn engine_with(
    client: Arc<ScriptedClient>,
    descriptors: &[(AttributeDescriptor, ValueType)],
    maintenance_interval: Duration,
) -> Engine {
    let manager = Arc::new(AttributesManager::new());
    for (descriptor, value_type) in descriptors {
        manager
            .create_attribute(descriptor, client.device_name(), *value_type)
            .expect("attribute created");
    }

    let clients = ClientsManager::new();
    clients.insert(client);

    Engine::new(
        Arc::new(Scheduler::current().expect("inside a tokio runtime")),
        manager,
        Arc::new(clients),
        maintenance_interval,
    )
}

pub fn full_name(name: &str) -> String {
    format!("{DEVICE}/{name}")
}
