//! Simulated instrument
//!
//! Serves any attribute name. Numeric attributes follow a noisy sine wave,
//! booleans toggle every second and text attributes cycle through a small
//! set of states. Used by the `status-server` binary and by tests that need a
//! device without hardware.

use super::{AttributeReading, Client, ClientFactory, EventCallback};
use crate::data::{Timestamp, Value, ValueType};
use crate::error::{Result, StatusServerError};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rand::Rng;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const STATES: [&str; 3] = ["ON", "MOVING", "STANDBY"];

struct Generator {
    device_name: String,
    value_types: HashMap<String, ValueType>,
    written: DashMap<String, Value>,
    started: Instant,
}

impl Generator {
    fn value_type_of(&self, name: &str) -> ValueType {
        self.value_types.get(name).copied().unwrap_or(ValueType::Double)
    }

    fn generate(&self, name: &str) -> AttributeReading {
        let now = Timestamp::now();
        if let Some(written) = self.written.get(name) {
            return AttributeReading::new(written.value().clone(), now);
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        // every attribute gets its own phase
        let phase = name.bytes().map(f64::from).sum::<f64>();
        let value = match self.value_type_of(name) {
            ValueType::Boolean => Value::Bool((elapsed as u64) % 2 == 0),
            ValueType::String | ValueType::State => {
                let index = ((elapsed / 5.0) as usize + phase as usize) % STATES.len();
                Value::from(STATES[index])
            }
            ValueType::Float | ValueType::Double => {
                let noise: f64 = rand::thread_rng().gen_range(-0.05..0.05);
                Value::Float((2.0 * PI * elapsed / 10.0 + phase).sin() * 10.0 + noise)
            }
            _ => Value::Int(self.started.elapsed().as_millis() as i64 / 100),
        };
        AttributeReading::new(value, now)
    }
}

pub struct SimulatedClient {
    generator: Arc<Generator>,
    subscriptions: DashMap<String, CancellationToken>,
    event_period: Duration,
}

impl SimulatedClient {
    pub fn new(device_name: &str) -> Self {
        Self {
            generator: Arc::new(Generator {
                device_name: device_name.to_string(),
                value_types: HashMap::new(),
                written: DashMap::new(),
                started: Instant::now(),
            }),
            subscriptions: DashMap::new(),
            event_period: Duration::from_millis(500),
        }
    }

    /// Declare the runtime type of one attribute; others are `double`.
    ///
    /// Only meaningful while building the client.
    pub fn with_attribute(mut self, name: &str, value_type: ValueType) -> Self {
        if let Some(generator) = Arc::get_mut(&mut self.generator) {
            generator.value_types.insert(name.to_string(), value_type);
        }
        self
    }

    pub fn with_event_period(mut self, event_period: Duration) -> Self {
        self.event_period = event_period;
        self
    }
}

#[async_trait]
impl Client for SimulatedClient {
    fn device_name(&self) -> &str {
        &self.generator.device_name
    }

    async fn read_attribute(&self, name: &str) -> Result<AttributeReading> {
        let reading = self.generator.generate(name);
        trace!("{}/{} -> {}", self.device_name(), name, reading.value);
        Ok(reading)
    }

    async fn write_attribute(&self, name: &str, value: Value) -> Result<()> {
        debug!("{}/{} <- {}", self.device_name(), name, value);
        self.generator.written.insert(name.to_string(), value);
        Ok(())
    }

    async fn subscribe_event(&self, name: &str, callback: EventCallback) -> Result<()> {
        if self.subscriptions.contains_key(name) {
            return Err(StatusServerError::client(format!(
                "{}/{} is already subscribed",
                self.device_name(),
                name
            )));
        }

        let token = CancellationToken::new();
        self.subscriptions.insert(name.to_string(), token.clone());

        let source = self.generator.clone();
        let name = name.to_string();
        let period = self.event_period;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => callback(Ok(source.generate(&name))),
                }
            }
            debug!("Event stream for {}/{} closed", source.device_name, name);
        });
        Ok(())
    }

    async fn unsubscribe_event(&self, name: &str) -> Result<()> {
        match self.subscriptions.remove(name) {
            Some((_, token)) => {
                token.cancel();
                Ok(())
            }
            None => Err(StatusServerError::client(format!(
                "{}/{} is not subscribed",
                self.device_name(),
                name
            ))),
        }
    }

    async fn check_attribute(&self, _name: &str) -> bool {
        true
    }

    async fn get_attribute_class(&self, name: &str) -> Result<ValueType> {
        Ok(self.generator.value_type_of(name))
    }
}

impl Drop for SimulatedClient {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().cancel();
        }
    }
}

/// Builds [`SimulatedClient`]s; devices can be marked unreachable
#[derive(Default)]
pub struct SimulatedClientFactory {
    value_types: DashMap<String, HashMap<String, ValueType>>,
    unreachable: DashSet<String>,
    event_period: Option<Duration>,
}

impl SimulatedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(self, device_name: &str, name: &str, value_type: ValueType) -> Self {
        self.value_types
            .entry(device_name.to_string())
            .or_default()
            .insert(name.to_string(), value_type);
        self
    }

    pub fn with_unreachable_device(self, device_name: &str) -> Self {
        self.unreachable.insert(device_name.to_string());
        self
    }

    pub fn with_event_period(mut self, event_period: Duration) -> Self {
        self.event_period = Some(event_period);
        self
    }
}

#[async_trait]
impl ClientFactory for SimulatedClientFactory {
    async fn create_client(&self, device_name: &str) -> Result<Arc<dyn Client>> {
        if self.unreachable.contains(device_name) {
            return Err(StatusServerError::client(format!("{device_name} is not reachable")));
        }

        let mut client = SimulatedClient::new(device_name);
        if let Some(types) = self.value_types.get(device_name) {
            for (name, value_type) in types.iter() {
                client = client.with_attribute(name, *value_type);
            }
        }
        if let Some(period) = self.event_period {
            client = client.with_event_period(period);
        }
        Ok(Arc::new(client))
    }
}
