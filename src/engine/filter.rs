use crate::data::Attribute;
use crate::registry::AttributesManager;
use std::sync::Arc;

/// Selects the attributes a query covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeFilter {
    /// Every attribute
    #[default]
    None,
    /// Members of a group; nothing for an unknown group
    ByGroup(String),
    /// Attributes of one device
    ByDevice(String),
}

impl AttributeFilter {
    pub fn by_group(name: &str) -> Self {
        AttributeFilter::ByGroup(name.to_string())
    }

    pub fn by_device(name: &str) -> Self {
        AttributeFilter::ByDevice(name.to_string())
    }

    /// Matching attributes, ordered by full name
    pub fn select(&self, manager: &AttributesManager) -> Vec<Arc<Attribute>> {
        let mut selected = match self {
            AttributeFilter::None => manager.attributes(),
            AttributeFilter::ByGroup(group) => manager.get_attributes_by_group(group),
            AttributeFilter::ByDevice(device) => manager
                .attributes()
                .into_iter()
                .filter(|a| a.device_name() == device)
                .collect(),
        };
        selected.sort_by(|a, b| a.full_name().cmp(b.full_name()));
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeDescriptor;
    use crate::data::{Method, ValueType};
    use rstest::rstest;

    fn manager() -> AttributesManager {
        let manager = AttributesManager::new();
        for (device, name) in [("dev/a", "x"), ("dev/a", "y"), ("dev/b", "x")] {
            manager
                .create_attribute(&AttributeDescriptor::new(name, Method::Poll), device, ValueType::Double)
                .unwrap();
        }
        manager.create_attributes_group("g", &["dev/b/x", "dev/a/y"]).unwrap();
        manager
    }

    #[rstest]
    #[case(AttributeFilter::None, &["dev/a/x", "dev/a/y", "dev/b/x"])]
    #[case(AttributeFilter::by_group("g"), &["dev/a/y", "dev/b/x"])]
    #[case(AttributeFilter::by_group("missing"), &[])]
    #[case(AttributeFilter::by_device("dev/a"), &["dev/a/x", "dev/a/y"])]
    fn test_select(#[case] filter: AttributeFilter, #[case] expected: &[&str]) {
        let names: Vec<String> = filter
            .select(&manager())
            .iter()
            .map(|a| a.full_name().to_string())
            .collect();
        assert_eq!(names, expected);
    }
}
