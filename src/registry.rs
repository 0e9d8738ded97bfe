//! Attribute factory, interning and named groups
//!
//! [`AttributesManager`] builds one [`Attribute`] per full name from the
//! configured descriptors and keeps the many-to-many association between
//! group names and attribute full names.

use crate::config::AttributeDescriptor;
use crate::data::{Attribute, AttributeKind, AttributeName, ValueType};
use crate::error::{Result, StatusServerError};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct AttributesManager {
    attributes: DashMap<String, Arc<Attribute>>,
    groups: DashMap<String, BTreeSet<String>>,
}

impl AttributesManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the attribute for `descriptor` on `device_name`.
    ///
    /// Numeric runtime types get the deduplicating numeric variant, anything
    /// else the accept-all variant. Asking again for a full name that already
    /// exists returns the existing instance.
    pub fn create_attribute(
        &self,
        descriptor: &AttributeDescriptor,
        device_name: &str,
        value_type: ValueType,
    ) -> Result<Arc<Attribute>> {
        let full_name = AttributeName::full_name_of(device_name, &descriptor.name);
        if let Some(existing) = self.attributes.get(&full_name) {
            debug!("Attribute {} already registered", full_name);
            return Ok(existing.value().clone());
        }

        let interpolation = descriptor.interpolation_policy()?;
        let kind = AttributeKind::for_type(value_type, descriptor.precision);
        let name = AttributeName::new(device_name, &descriptor.name, descriptor.alias.as_deref());

        let entry = self.attributes.entry(full_name).or_insert_with(|| {
            debug!(
                "Creating {} attribute {} ({}, {})",
                if kind.is_numeric() { "numeric" } else { "non-numeric" },
                name,
                value_type,
                interpolation
            );
            Arc::new(
                Attribute::new(name, kind, value_type)
                    .with_method(descriptor.method)
                    .with_interpolation(interpolation)
                    .with_poll_delay(descriptor.poll_delay()),
            )
        });
        Ok(entry.value().clone())
    }

    /// Fails with `NotFound` for an unknown full name
    pub fn get_attribute(&self, full_name: &str) -> Result<Arc<Attribute>> {
        self.attributes
            .get(full_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StatusServerError::not_found(format!("No such attribute: {full_name}")))
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.attributes.contains_key(full_name)
    }

    /// All attributes, ordered by full name
    pub fn attributes(&self) -> Vec<Arc<Attribute>> {
        let mut all: Vec<Arc<Attribute>> = self.attributes.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.full_name().cmp(b.full_name()));
        all
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Store `full_names` under `name`, replacing any previous members.
    ///
    /// Every name must already be registered.
    pub fn create_attributes_group<S: AsRef<str>>(&self, name: &str, full_names: &[S]) -> Result<()> {
        if let Some(unknown) = full_names.iter().map(AsRef::as_ref).find(|n| !self.contains(n)) {
            return Err(StatusServerError::config(format!(
                "Can not create group {name}: unknown attribute {unknown}"
            )));
        }

        let members: BTreeSet<String> = full_names.iter().map(|n| n.as_ref().to_string()).collect();
        info!("Group {} now has {} attribute(s)", name, members.len());
        self.groups.insert(name.to_string(), members);
        Ok(())
    }

    /// Members of the group, empty for an unknown group
    pub fn get_attributes_by_group(&self, name: &str) -> Vec<Arc<Attribute>> {
        let Some(members) = self.groups.get(name) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|full_name| self.attributes.get(full_name).map(|e| e.value().clone()))
            .collect()
    }

    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Interpolation, Method};
    use rstest::rstest;
    use std::time::Duration;

    const DEVICE: &str = "Test";

    fn descriptor() -> AttributeDescriptor {
        AttributeDescriptor::new("test-attr", Method::Poll)
            .with_poll_delay_ms(20)
            .with_alias("ta")
    }

    #[rstest]
    #[case(ValueType::Float, true)]
    #[case(ValueType::Double, true)]
    #[case(ValueType::Int, true)]
    #[case(ValueType::String, false)]
    #[case(ValueType::Boolean, false)]
    fn test_create_attribute_variant(#[case] value_type: ValueType, #[case] numeric: bool) {
        let manager = AttributesManager::new();
        let attr = manager.create_attribute(&descriptor(), DEVICE, value_type).unwrap();
        assert_eq!(attr.kind().is_numeric(), numeric);
    }

    #[test]
    fn test_descriptor_settings_applied() {
        let manager = AttributesManager::new();
        let descriptor = descriptor().with_interpolation("nearest").with_precision(0.5);
        let attr = manager.create_attribute(&descriptor, DEVICE, ValueType::Double).unwrap();

        assert_eq!(attr.full_name(), "Test/test-attr");
        assert_eq!(attr.alias(), Some("ta"));
        assert_eq!(attr.interpolation(), Interpolation::Nearest);
        assert_eq!(attr.poll_delay(), Duration::from_millis(20));
        assert_eq!(attr.kind(), AttributeKind::Numeric { precision: 0.5 });
    }

    #[test]
    fn test_interning_is_idempotent() {
        let manager = AttributesManager::new();
        let first = manager.create_attribute(&descriptor(), DEVICE, ValueType::Double).unwrap();
        let second = manager.create_attribute(&descriptor(), DEVICE, ValueType::Double).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_unknown_attribute_lookup_fails() {
        let manager = AttributesManager::new();
        let err = manager.get_attribute("Test/nope").unwrap_err();
        assert!(matches!(err, StatusServerError::NotFound(_)));
    }

    #[test]
    fn test_attributes_group() {
        let manager = AttributesManager::new();
        let attr = manager.create_attribute(&descriptor(), DEVICE, ValueType::Double).unwrap();
        manager.create_attributes_group("group1", &[attr.full_name()]).unwrap();

        let result = manager.get_attributes_by_group("group1");
        assert_eq!(result.len(), 1);
        assert!(Arc::ptr_eq(&result[0], &attr));
    }

    #[test]
    fn test_group_with_unregistered_name_rejected() {
        let manager = AttributesManager::new();
        let err = manager.create_attributes_group("g", &["unknown-attr"]).unwrap_err();
        assert!(matches!(err, StatusServerError::Config(_)));
        assert!(manager.group_names().is_empty());
    }

    #[test]
    fn test_group_replaced_and_unknown_group_empty() {
        let manager = AttributesManager::new();
        let a = manager
            .create_attribute(&AttributeDescriptor::new("A", Method::Poll), DEVICE, ValueType::Double)
            .unwrap();
        let b = manager
            .create_attribute(&AttributeDescriptor::new("B", Method::Event), DEVICE, ValueType::String)
            .unwrap();

        manager.create_attributes_group("g", &[a.full_name(), b.full_name()]).unwrap();
        manager.create_attributes_group("g", &[b.full_name()]).unwrap();

        let members: Vec<String> = manager
            .get_attributes_by_group("g")
            .iter()
            .map(|a| a.full_name().to_string())
            .collect();
        assert_eq!(members, vec!["Test/B".to_string()]);
        assert!(manager.get_attributes_by_group("missing").is_empty());
    }
}
