//! Command surface of the status server
//!
//! [`StatusServer`] exposes the engine to a dispatch layer: mode commands,
//! per-client update tracking, snapshot queries rendered as
//! `name=read_timestamp[value@write_timestamp]` records, groups and export.

use crate::data::{AttributeValue, ExportRow, Timestamp};
use crate::engine::{AttributeFilter, Engine, EngineState};
use crate::error::{Result, StatusServerError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Coarse device state next to the detailed [`EngineState`] status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    /// Not initialised, or shut down
    Off,
    /// Ready, not collecting
    On,
    /// Collecting
    Running,
}

pub struct StatusServer {
    engine: Arc<Engine>,
    client_ids: AtomicU64,
    /// Per client: next read timestamp to deliver, per attribute
    client_cursors: DashMap<u64, HashMap<String, Timestamp>>,
    use_aliases: AtomicBool,
    shut_down: AtomicBool,
}

impl StatusServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            client_ids: AtomicU64::new(0),
            client_cursors: DashMap::new(),
            use_aliases: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_use_aliases(self, use_aliases: bool) -> Self {
        self.use_aliases.store(use_aliases, Ordering::Release);
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn erase_data(&self) -> Result<()> {
        self.engine.erase_data().await
    }

    pub async fn start_light_polling(&self) -> Result<()> {
        self.engine.start_light_polling().await
    }

    pub async fn start_light_polling_at_fixed_rate(&self, delay_ms: i64) -> Result<()> {
        self.engine.start_light_polling_at_fixed_rate(delay_ms).await
    }

    pub async fn start_collect_data(&self) -> Result<()> {
        self.engine.start().await
    }

    pub async fn stop_collect_data(&self) -> Result<()> {
        self.engine.stop().await
    }

    /// New id for [`StatusServer::get_data_updates`]; ids start at 1
    pub fn register_client(&self) -> u64 {
        let id = self.client_ids.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Registered client {}", id);
        id
    }

    /// Everything recorded since this client's previous call.
    ///
    /// The first call for a client returns the last value of each attribute.
    /// Attributes without new samples are left out. Each attribute resumes
    /// just after the newest sample already delivered, so a sample is
    /// delivered exactly once.
    pub fn get_data_updates(&self, client_id: u64) -> Result<Vec<String>> {
        if client_id == 0 || client_id > self.client_ids.load(Ordering::Acquire) {
            return Err(StatusServerError::not_found(format!("Unknown client id {client_id}")));
        }
        let first_call = !self.client_cursors.contains_key(&client_id);
        let mut cursors = self.client_cursors.entry(client_id).or_default();

        let mut updates = BTreeMap::new();
        for attribute in self.engine.attributes() {
            let samples: Vec<Arc<AttributeValue>> = if first_call {
                vec![attribute.get_attribute_value()]
            } else {
                let since = cursors.get(attribute.full_name()).copied().unwrap_or(Timestamp::ZERO);
                attribute.get_attribute_values(since).collect()
            };
            if let Some(newest) = samples.last() {
                cursors.insert(
                    attribute.full_name().to_string(),
                    newest.read_timestamp.add(Duration::from_millis(1)),
                );
            }
            updates.insert(attribute.full_name().to_string(), samples);
        }
        Ok(self.render_series(&updates))
    }

    /// Whole history of every attribute
    pub fn get_data(&self) -> Vec<String> {
        let values = self
            .engine
            .get_all_attribute_values(Some(Timestamp::ZERO), &AttributeFilter::None);
        self.render_series(&values)
    }

    pub fn get_latest_snapshot(&self) -> Vec<String> {
        self.render(&self.engine.get_values(Timestamp::now(), &AttributeFilter::None))
    }

    pub fn get_latest_snapshot_by_group(&self, group: &str) -> Vec<String> {
        self.render(&self.engine.get_values(Timestamp::now(), &AttributeFilter::by_group(group)))
    }

    pub fn get_snapshot(&self, timestamp_ms: i64) -> Vec<String> {
        self.render(
            &self
                .engine
                .get_values(Timestamp::from_millis(timestamp_ms), &AttributeFilter::None),
        )
    }

    pub fn get_snapshot_by_group(&self, timestamp_ms: i64, group: &str) -> Vec<String> {
        self.render(&self.engine.get_values(
            Timestamp::from_millis(timestamp_ms),
            &AttributeFilter::by_group(group),
        ))
    }

    /// `args[0]` is the group name, the rest are attribute full names
    pub fn create_attributes_group(&self, args: &[String]) -> Result<()> {
        let (name, members) = args
            .split_first()
            .ok_or_else(|| StatusServerError::invalid_input("Group name is missing"))?;
        self.engine.attributes_manager().create_attributes_group(name, members)
    }

    /// Whole history as a JSON array of export rows
    pub fn get_data_encoded(&self) -> Result<String> {
        let mut rows = Vec::new();
        for attribute in self.engine.attributes() {
            rows.extend(
                attribute
                    .get_attribute_values(Timestamp::ZERO)
                    .map(|sample| ExportRow::new(&sample, attribute.value_type())),
            );
        }
        Ok(serde_json::to_string(&rows)?)
    }

    pub async fn status(&self) -> EngineState {
        self.engine.state().await
    }

    pub async fn device_state(&self) -> DeviceState {
        if self.shut_down.load(Ordering::Acquire) {
            return DeviceState::Off;
        }
        match self.engine.state().await {
            EngineState::Idle => DeviceState::On,
            _ => DeviceState::Running,
        }
    }

    pub fn crt_timestamp(&self) -> i64 {
        Timestamp::now().as_millis()
    }

    pub fn use_aliases(&self) -> bool {
        self.use_aliases.load(Ordering::Acquire)
    }

    pub fn set_use_aliases(&self, use_aliases: bool) {
        self.use_aliases.store(use_aliases, Ordering::Release);
    }

    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.engine.shutdown().await?;
        info!("Status server shut down");
        Ok(())
    }

    fn render(&self, values: &[Arc<AttributeValue>]) -> Vec<String> {
        let use_aliases = self.use_aliases();
        values.iter().map(|value| value.render(use_aliases)).collect()
    }

    /// `name=r[v@w],r[v@w],...` per attribute
    fn render_series(&self, values: &BTreeMap<String, Vec<Arc<AttributeValue>>>) -> Vec<String> {
        let use_aliases = self.use_aliases();
        values
            .values()
            .filter_map(|samples| {
                let first = samples.first()?;
                let series: Vec<String> = samples.iter().map(|s| s.sample_string()).collect();
                Some(format!("{}={}", first.display_name(use_aliases), series.join(",")))
            })
            .collect()
    }
}
