//! Bodies of the poll, event and maintenance tasks
//!
//! None of them return an error: a failure is reported and the next run
//! proceeds as scheduled.

use crate::client::{AttributeReading, Client, EventCallback};
use crate::data::{Attribute, Timestamp};
use crate::error::StatusServerError;
use crate::log_structured_error;
use crate::registry::AttributesManager;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Store one reading, stamped with the local receipt time
fn record(attribute: &Attribute, reading: AttributeReading, append: bool) {
    let read_timestamp = Timestamp::now();
    if append {
        attribute.add_value(read_timestamp, reading.value, reading.write_timestamp);
    } else {
        attribute.replace_value(read_timestamp, reading.value, reading.write_timestamp);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One poll cycle. A panicking client is reported like a failed read.
pub async fn poll_once(client: Arc<dyn Client>, attribute: Arc<Attribute>, append: bool) {
    let read = AssertUnwindSafe(client.read_attribute(attribute.name().name()))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(StatusServerError::client(format!(
                "read_attribute panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

    match read {
        Ok(reading) => {
            trace!("Polled {} -> {}", attribute, reading.value);
            record(&attribute, reading, append);
        }
        Err(e) => {
            log_structured_error!(e, "poll_task", "read_attribute", attribute.full_name());
        }
    }
}

/// Callback handed to the client for an event-driven attribute
pub fn event_callback(attribute: Arc<Attribute>, append: bool) -> EventCallback {
    Arc::new(move |result| match result {
        Ok(reading) => record(&attribute, reading, append),
        Err(e) => {
            log_structured_error!(e, "event_task", "receive_event", attribute.full_name());
        }
    })
}

/// Rolling retention: each run drops what is older than the start of the
/// previous run.
#[derive(Debug)]
pub struct Maintenance {
    attributes: Arc<AttributesManager>,
    previous_run: AtomicI64,
}

impl Maintenance {
    /// The first run trims up to the moment of construction
    pub fn new(attributes: Arc<AttributesManager>) -> Self {
        Self {
            attributes,
            previous_run: AtomicI64::new(Timestamp::now().as_millis()),
        }
    }

    /// Returns the number of samples removed
    pub fn run(&self) -> usize {
        let now = Timestamp::now();
        let cutoff = Timestamp::from_millis(self.previous_run.swap(now.as_millis(), Ordering::AcqRel));

        let removed: usize = self
            .attributes
            .attributes()
            .iter()
            .map(|attribute| attribute.erase_head(cutoff))
            .sum();
        debug!("Maintenance removed {} sample(s) older than {}", removed, cutoff);
        removed
    }

    pub fn previous_run(&self) -> Timestamp {
        Timestamp::from_millis(self.previous_run.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeDescriptor;
    use crate::data::{Method, Value, ValueType};

    fn attribute(manager: &AttributesManager) -> Arc<Attribute> {
        manager
            .create_attribute(&AttributeDescriptor::new("x", Method::Poll), "sim/dev", ValueType::Double)
            .unwrap()
    }

    #[test]
    fn test_maintenance_keeps_previous_window() {
        let manager = Arc::new(AttributesManager::new());
        let attr = attribute(&manager);
        let maintenance = Maintenance::new(manager.clone());
        let start = maintenance.previous_run();

        attr.add_value(start.sub(std::time::Duration::from_millis(10)), Value::from(1.0), start);
        attr.add_value(start.add(std::time::Duration::from_secs(60)), Value::from(2.0), start);

        // trims before the construction time only
        assert_eq!(maintenance.run(), 1);
        assert_eq!(attr.size(), 1);
        assert!(maintenance.previous_run() >= start);
    }

    #[test]
    fn test_event_callback_paths() {
        let manager = AttributesManager::new();
        let attr = attribute(&manager);

        let append = event_callback(attr.clone(), true);
        append(Ok(AttributeReading::new(Value::from(1.0), Timestamp::from_millis(5))));
        assert_eq!(attr.size(), 1);
        assert_eq!(attr.get_attribute_value().write_timestamp, Timestamp::from_millis(5));

        append(Err(StatusServerError::client("device offline")));
        assert_eq!(attr.size(), 1);

        let replace = event_callback(attr.clone(), false);
        replace(Ok(AttributeReading::new(Value::from(9.0), Timestamp::from_millis(6))));
        assert_eq!(attr.size(), 1);
        assert_eq!(attr.get_attribute_value().value, Value::from(9.0));
    }
}
