//! Collection engine
//!
//! Wires every attribute to its client (a repeating poll task or an event
//! subscription), runs the retention maintenance task and answers snapshot
//! and range queries.
//!
//! ```text
//!          start()                     stop()
//!   IDLE ───────────────► HEAVY_DUTY ─────────► IDLE
//!     │  start_light_polling()          stop()
//!     ├─────────────────► LIGHT_POLLING ──────► IDLE
//!     │  start_light_polling_at_fixed_rate(d)   stop()
//!     └─────────────────► LIGHT_POLLING_AT_FIXED_RATE ──► IDLE
//! ```

pub mod filter;
pub mod scheduler;
pub mod setup;
pub mod tasks;

pub use filter::AttributeFilter;
pub use scheduler::{ScheduledTask, Scheduler};
pub use setup::{build_engine, SetupReport};

use crate::client::{Client, ClientsManager};
use crate::data::{Attribute, AttributeValue, Method, Timestamp};
use crate::error::{Result, StatusServerError};
use crate::log_structured_error;
use crate::registry::AttributesManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tasks::Maintenance;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Collection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    #[default]
    Idle,
    LightPolling,
    LightPollingAtFixedRate,
    HeavyDuty,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "IDLE",
            EngineState::LightPolling => "LIGHT_POLLING",
            EngineState::LightPollingAtFixedRate => "LIGHT_POLLING_AT_FIXED_RATE",
            EngineState::HeavyDuty => "HEAVY_DUTY",
        }
    }

    /// Whether accepted samples go to history or only to the last value
    fn appends(&self) -> bool {
        matches!(self, EngineState::HeavyDuty)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Running {
    state: EngineState,
    poll_tasks: Vec<ScheduledTask>,
    subscriptions: Vec<(Arc<dyn Client>, Arc<Attribute>)>,
    maintenance: Option<ScheduledTask>,
}

pub struct Engine {
    scheduler: Arc<Scheduler>,
    attributes: Arc<AttributesManager>,
    clients: Arc<ClientsManager>,
    maintenance_interval_ms: AtomicU64,
    running: Mutex<Running>,
}

impl Engine {
    pub fn new(
        scheduler: Arc<Scheduler>,
        attributes: Arc<AttributesManager>,
        clients: Arc<ClientsManager>,
        maintenance_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            attributes,
            clients,
            maintenance_interval_ms: AtomicU64::new(duration_millis(maintenance_interval)),
            running: Mutex::new(Running::default()),
        }
    }

    /// Heavy duty: every accepted sample is kept in history
    pub async fn start(&self) -> Result<()> {
        self.start_in(EngineState::HeavyDuty, None).await
    }

    /// Only last values are updated, each attribute at its own delay
    pub async fn start_light_polling(&self) -> Result<()> {
        self.start_in(EngineState::LightPolling, None).await
    }

    /// Only last values are updated, every attribute at `delay_ms`
    pub async fn start_light_polling_at_fixed_rate(&self, delay_ms: i64) -> Result<()> {
        if delay_ms <= 0 {
            return Err(StatusServerError::invalid_input(format!(
                "delay must be positive, got {delay_ms}"
            )));
        }
        let delay = Duration::from_millis(delay_ms.unsigned_abs());
        self.start_in(EngineState::LightPollingAtFixedRate, Some(delay)).await
    }

    async fn start_in(&self, target: EngineState, fixed_delay: Option<Duration>) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.state != EngineState::Idle {
            return Err(StatusServerError::invalid_state(format!(
                "Can not switch to {target} while {}",
                running.state
            )));
        }

        let append = target.appends();
        // resolve every client before anything is scheduled
        let mut wiring = Vec::new();
        for attribute in self.attributes.attributes() {
            let client = self.clients.get_client(attribute.device_name())?;
            wiring.push((client, attribute));
        }

        info!("Starting {} for {} attribute(s)", target, wiring.len());
        for (client, attribute) in wiring {
            match attribute.method() {
                Method::Poll => {
                    let delay = fixed_delay.unwrap_or_else(|| attribute.poll_delay());
                    let task_client = client.clone();
                    let task_attribute = attribute.clone();
                    let task = self.scheduler.schedule_with_fixed_delay(attribute.full_name(), delay, move || {
                        tasks::poll_once(task_client.clone(), task_attribute.clone(), append)
                    });
                    running.poll_tasks.push(task);
                }
                Method::Event => {
                    debug!("Subscribing to {}", attribute);
                    let callback = tasks::event_callback(attribute.clone(), append);
                    match client.subscribe_event(attribute.name().name(), callback).await {
                        Ok(()) => running.subscriptions.push((client, attribute)),
                        Err(e) => {
                            log_structured_error!(e, "engine", "subscribe_event", attribute.full_name());
                        }
                    }
                }
            }
        }

        let interval = self.maintenance_interval();
        let maintenance = Arc::new(Maintenance::new(self.attributes.clone()));
        running.maintenance = Some(self.scheduler.schedule_at_fixed_rate(
            "maintenance",
            interval,
            interval,
            move || {
                let maintenance = maintenance.clone();
                async move {
                    maintenance.run();
                }
            },
        ));

        running.state = target;
        info!("Engine is {}", target);
        Ok(())
    }

    /// Back to IDLE. Poll runs in flight complete; maintenance is aborted.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.state == EngineState::Idle {
            debug!("Engine already idle");
            return Ok(());
        }

        for task in running.poll_tasks.drain(..) {
            debug!("Cancelling poll task {}", task.name());
            task.cancel(false);
        }
        for (client, attribute) in running.subscriptions.drain(..) {
            debug!("Unsubscribing from {}", attribute);
            if let Err(e) = client.unsubscribe_event(attribute.name().name()).await {
                log_structured_error!(e, "engine", "unsubscribe_event", attribute.full_name());
            }
        }
        if let Some(maintenance) = running.maintenance.take() {
            maintenance.cancel(true);
        }

        info!("Engine stopped (was {})", running.state);
        running.state = EngineState::Idle;
        Ok(())
    }

    /// Empty every attribute's history; last values stay
    pub fn clear(&self) {
        for attribute in self.attributes.attributes() {
            attribute.clear();
        }
        debug!("History cleared");
    }

    /// [`Engine::clear`], allowed only while IDLE
    pub async fn erase_data(&self) -> Result<()> {
        let running = self.running.lock().await;
        if running.state != EngineState::Idle {
            return Err(StatusServerError::invalid_state(format!(
                "Data can only be erased while IDLE, engine is {}",
                running.state
            )));
        }
        self.clear();
        Ok(())
    }

    /// Samples since `since` per attribute, oldest first, or only the last
    /// value of each attribute when `since` is `None`
    pub fn get_all_attribute_values(
        &self,
        since: Option<Timestamp>,
        filter: &AttributeFilter,
    ) -> BTreeMap<String, Vec<Arc<AttributeValue>>> {
        filter
            .select(&self.attributes)
            .into_iter()
            .map(|attribute| {
                let values = match since {
                    Some(since) => attribute.get_attribute_values(since).collect(),
                    None => vec![attribute.get_attribute_value()],
                };
                (attribute.full_name().to_string(), values)
            })
            .collect()
    }

    /// One value per attribute at `timestamp`
    pub fn get_values(&self, timestamp: Timestamp, filter: &AttributeFilter) -> Vec<Arc<AttributeValue>> {
        filter
            .select(&self.attributes)
            .iter()
            .map(|attribute| attribute.get_attribute_value_at(timestamp))
            .collect()
    }

    /// Last value of every matching attribute
    pub fn get_latest_values(&self, filter: &AttributeFilter) -> Vec<Arc<AttributeValue>> {
        filter
            .select(&self.attributes)
            .iter()
            .map(|attribute| attribute.get_attribute_value())
            .collect()
    }

    pub fn get_attribute_by_name(&self, full_name: &str) -> Result<Arc<Attribute>> {
        self.attributes.get_attribute(full_name)
    }

    pub fn attributes(&self) -> Vec<Arc<Attribute>> {
        self.attributes.attributes()
    }

    pub fn attributes_manager(&self) -> &Arc<AttributesManager> {
        &self.attributes
    }

    pub fn clients(&self) -> &Arc<ClientsManager> {
        &self.clients
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn state(&self) -> EngineState {
        self.running.lock().await.state
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms.load(Ordering::Acquire))
    }

    /// Takes effect on the next start
    pub fn set_maintenance_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(StatusServerError::invalid_input("maintenance interval must not be zero"));
        }
        self.maintenance_interval_ms
            .store(duration_millis(interval), Ordering::Release);
        Ok(())
    }

    /// Stop collection and release the worker pool
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await?;
        self.scheduler.shutdown();
        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SimulatedClientFactory;
    use crate::config::AttributeDescriptor;
    use crate::data::{Value, ValueType};
    use pretty_assertions::assert_eq;

    async fn engine() -> Engine {
        let manager = Arc::new(AttributesManager::new());
        let a = manager
            .create_attribute(&AttributeDescriptor::new("A", Method::Poll), "sim/dev", ValueType::Double)
            .unwrap();
        let b = manager
            .create_attribute(&AttributeDescriptor::new("B", Method::Poll), "sim/dev", ValueType::Double)
            .unwrap();
        manager.create_attributes_group("g1", &[a.full_name()]).unwrap();

        a.add_value(Timestamp::from_millis(1_000), Value::from(1.0), Timestamp::from_millis(1_000));
        b.add_value(Timestamp::from_millis(1_000), Value::from(2.0), Timestamp::from_millis(1_000));

        let clients = ClientsManager::new()
            .initialize(&SimulatedClientFactory::new(), ["sim/dev"])
            .await;
        Engine::new(
            Arc::new(Scheduler::current().unwrap()),
            manager,
            Arc::new(clients),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(EngineState::default().to_string(), "IDLE");
        assert_eq!(EngineState::LightPollingAtFixedRate.as_str(), "LIGHT_POLLING_AT_FIXED_RATE");
        assert_eq!(
            serde_json::to_string(&EngineState::HeavyDuty).unwrap(),
            "\"HEAVY_DUTY\""
        );
    }

    #[tokio::test]
    async fn test_snapshot_by_group() {
        let engine = engine().await;
        let values = engine.get_values(Timestamp::from_millis(2_000), &AttributeFilter::by_group("g1"));
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].full_name, "sim/dev/A");
        assert!(engine
            .get_values(Timestamp::from_millis(2_000), &AttributeFilter::by_group("nope"))
            .is_empty());
    }

    #[tokio::test]
    async fn test_all_values_since() {
        let engine = engine().await;
        let all = engine.get_all_attribute_values(Some(Timestamp::from_millis(1_000)), &AttributeFilter::None);
        assert_eq!(all.len(), 2);
        assert_eq!(all["sim/dev/B"].len(), 1);
        let none = engine.get_all_attribute_values(Some(Timestamp::from_millis(1_001)), &AttributeFilter::None);
        assert!(none.values().all(Vec::is_empty));
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let engine = engine().await;
        assert!(matches!(
            engine.start_light_polling_at_fixed_rate(-1).await,
            Err(StatusServerError::InvalidInput(_))
        ));
        assert_eq!(engine.state().await, EngineState::Idle);

        engine.start_light_polling().await.unwrap();
        assert_eq!(engine.state().await, EngineState::LightPolling);
        assert!(matches!(engine.start().await, Err(StatusServerError::InvalidState(_))));
        assert!(matches!(engine.erase_data().await, Err(StatusServerError::InvalidState(_))));

        engine.stop().await.unwrap();
        assert_eq!(engine.state().await, EngineState::Idle);
        engine.erase_data().await.unwrap();
        assert_eq!(engine.get_attribute_by_name("sim/dev/A").unwrap().size(), 0);
    }

    #[tokio::test]
    async fn test_missing_client_fails_start() {
        let manager = Arc::new(AttributesManager::new());
        manager
            .create_attribute(&AttributeDescriptor::new("A", Method::Poll), "sim/other", ValueType::Double)
            .unwrap();
        let engine = Engine::new(
            Arc::new(Scheduler::current().unwrap()),
            manager,
            Arc::new(ClientsManager::new()),
            Duration::from_secs(30),
        );
        assert!(matches!(engine.start().await, Err(StatusServerError::NotFound(_))));
        assert_eq!(engine.state().await, EngineState::Idle);
    }
}
