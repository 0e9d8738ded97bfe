//! Engine construction from configuration
//!
//! A device that can not be reached, or an attribute the device does not
//! expose, is recorded in the [`SetupReport`] and skipped. Setup only fails
//! when the configuration itself is unusable.

use super::{Engine, Scheduler};
use crate::client::{ClientFactory, ClientFailure, ClientsManager};
use crate::config::StatusServerConfig;
use crate::data::AttributeName;
use crate::error::Result;
use crate::registry::AttributesManager;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// An attribute left out of collection
#[derive(Debug, Clone, Serialize)]
pub struct SkippedAttribute {
    pub full_name: String,
    pub reason: String,
}

/// What setup could not wire
#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupReport {
    pub client_failures: Vec<ClientFailure>,
    pub skipped_attributes: Vec<SkippedAttribute>,
    pub skipped_groups: Vec<String>,
}

impl SetupReport {
    pub fn is_clean(&self) -> bool {
        self.client_failures.is_empty() && self.skipped_attributes.is_empty() && self.skipped_groups.is_empty()
    }
}

pub async fn build_engine(
    config: &StatusServerConfig,
    factory: &dyn ClientFactory,
    scheduler: Arc<Scheduler>,
) -> Result<(Engine, SetupReport)> {
    config.validate()?;

    let clients = ClientsManager::new()
        .initialize(factory, config.devices.iter().map(|d| d.name.as_str()))
        .await;
    let mut report = SetupReport {
        client_failures: clients.failures().to_vec(),
        ..SetupReport::default()
    };
    for failure in &report.client_failures {
        error!("Device {} is unavailable: {}", failure.device_name, failure.error);
    }

    let attributes = AttributesManager::new();
    for device in &config.devices {
        let Ok(client) = clients.get_client(&device.name) else {
            for descriptor in &device.attributes {
                report.skipped_attributes.push(SkippedAttribute {
                    full_name: AttributeName::full_name_of(&device.name, &descriptor.name),
                    reason: "device unavailable".to_string(),
                });
            }
            continue;
        };

        for descriptor in &device.attributes {
            let full_name = AttributeName::full_name_of(&device.name, &descriptor.name);
            if !client.check_attribute(&descriptor.name).await {
                warn!("Attribute {} is not available, skipping", full_name);
                report.skipped_attributes.push(SkippedAttribute {
                    full_name,
                    reason: "attribute not available".to_string(),
                });
                continue;
            }

            let value_type = match client.get_attribute_class(&descriptor.name).await {
                Ok(value_type) => value_type,
                Err(e) => {
                    warn!("Can not resolve type of {}: {}", full_name, e);
                    report.skipped_attributes.push(SkippedAttribute {
                        full_name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            attributes.create_attribute(descriptor, &device.name, value_type)?;
        }
    }

    for group in &config.groups {
        let members: Vec<&str> = group
            .attributes
            .iter()
            .map(String::as_str)
            .filter(|name| attributes.contains(name))
            .collect();
        if members.len() < group.attributes.len() {
            warn!(
                "Group {} lost {} member(s) that could not be set up",
                group.name,
                group.attributes.len() - members.len()
            );
            report.skipped_groups.push(group.name.clone());
        }
        attributes.create_attributes_group(&group.name, &members)?;
    }

    info!(
        "Setup done: {} attribute(s) on {} device(s), {} skipped",
        attributes.len(),
        clients.len(),
        report.skipped_attributes.len()
    );

    let engine = Engine::new(
        scheduler,
        Arc::new(attributes),
        Arc::new(clients),
        config.engine.maintenance_interval,
    );
    Ok((engine, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SimulatedClientFactory;
    use crate::data::{AttributeKind, ValueType};

    const CONFIG: &str = r#"
[[devices]]
name = "sim/motor"
[[devices.attributes]]
name = "position"
[[devices.attributes]]
name = "state"
method = "event"

[[devices]]
name = "sim/broken"
[[devices.attributes]]
name = "current"

[[groups]]
name = "all"
attributes = ["sim/motor/position", "sim/broken/current"]
"#;

    #[tokio::test]
    async fn test_build_engine_collects_failures() {
        let config = StatusServerConfig::from_toml_str(CONFIG).unwrap();
        let factory = SimulatedClientFactory::new()
            .with_attribute("sim/motor", "state", ValueType::State)
            .with_unreachable_device("sim/broken");

        let (engine, report) = build_engine(&config, &factory, Arc::new(Scheduler::current().unwrap()))
            .await
            .unwrap();

        assert_eq!(engine.attributes().len(), 2);
        assert_eq!(report.client_failures.len(), 1);
        assert_eq!(report.skipped_attributes[0].full_name, "sim/broken/current");
        assert_eq!(report.skipped_groups, vec!["all".to_string()]);
        assert!(!report.is_clean());

        let position = engine.get_attribute_by_name("sim/motor/position").unwrap();
        assert!(position.kind().is_numeric());
        let state = engine.get_attribute_by_name("sim/motor/state").unwrap();
        assert_eq!(state.kind(), AttributeKind::NonNumeric);
        assert_eq!(engine.attributes_manager().get_attributes_by_group("all").len(), 1);
    }
}
