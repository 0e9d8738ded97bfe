//! Client factory pattern and the per-device client registry
//!
//! Clients are created once per device at setup. A device whose client can
//! not be created is recorded as a [`ClientFailure`] and skipped; the other
//! devices are still served.

use super::Client;
use crate::error::{Result, StatusServerError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Creates the client for one device
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create_client(&self, device_name: &str) -> Result<Arc<dyn Client>>;
}

/// A device whose client could not be created
#[derive(Debug, Clone, Serialize)]
pub struct ClientFailure {
    pub device_name: String,
    pub error: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// One client per device
pub struct ClientsManager {
    clients: DashMap<String, Arc<dyn Client>>,
    failures: Vec<ClientFailure>,
    creation_timeout: Duration,
}

impl Default for ClientsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientsManager {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            failures: Vec::new(),
            creation_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_creation_timeout(mut self, creation_timeout: Duration) -> Self {
        self.creation_timeout = creation_timeout;
        self
    }

    /// Create clients for every device; failures are collected, not returned
    pub async fn initialize<I, S>(mut self, factory: &dyn ClientFactory, device_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for device_name in device_names {
            let device_name = device_name.as_ref();
            if self.clients.contains_key(device_name) {
                continue;
            }

            debug!("Creating client for {}", device_name);
            let created = match timeout(self.creation_timeout, factory.create_client(device_name)).await {
                Ok(result) => result,
                Err(_) => Err(StatusServerError::timeout(format!(
                    "Client creation for {device_name} took longer than {:?}",
                    self.creation_timeout
                ))),
            };

            match created {
                Ok(client) => {
                    self.clients.insert(device_name.to_string(), client);
                }
                Err(e) => {
                    warn!("Can not create client for {}: {}", device_name, e);
                    self.failures.push(ClientFailure {
                        device_name: device_name.to_string(),
                        error: e.to_string(),
                        occurred_at: chrono::Utc::now(),
                    });
                }
            }
        }

        info!(
            "Clients ready: {} created, {} failed",
            self.clients.len(),
            self.failures.len()
        );
        self
    }

    /// Register an already built client
    pub fn insert(&self, client: Arc<dyn Client>) {
        self.clients.insert(client.device_name().to_string(), client);
    }

    pub fn get_client(&self, device_name: &str) -> Result<Arc<dyn Client>> {
        self.clients
            .get(device_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StatusServerError::not_found(format!("No client for device {device_name}")))
    }

    pub fn contains(&self, device_name: &str) -> bool {
        self.clients.contains_key(device_name)
    }

    pub fn failures(&self) -> &[ClientFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SimulatedClientFactory;

    #[tokio::test]
    async fn test_failures_are_collected() {
        let factory = SimulatedClientFactory::new().with_unreachable_device("sim/broken");
        let manager = ClientsManager::new()
            .initialize(&factory, ["sim/ok", "sim/broken", "sim/ok"])
            .await;

        assert_eq!(manager.len(), 1);
        assert!(manager.contains("sim/ok"));
        assert_eq!(manager.failures().len(), 1);
        assert_eq!(manager.failures()[0].device_name, "sim/broken");
        assert!(matches!(
            manager.get_client("sim/broken"),
            Err(StatusServerError::NotFound(_))
        ));
    }
}
