//! Measurement data model and the per-attribute store

pub mod attribute;
pub mod attribute_value;
pub mod interpolation;
pub mod timestamp;
pub mod value;

pub use attribute::{Attribute, AttributeKind, Method};
pub use attribute_value::{AttributeName, AttributeValue, ExportRow};
pub use interpolation::Interpolation;
pub use timestamp::Timestamp;
pub use value::{Value, ValueType};
