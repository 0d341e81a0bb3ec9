//! Validated attribute container.
//!
//! A `Resource` is a named bag of attributes checked against a declared
//! schema at construction time: every required field must be present and
//! type-conformant, or the build fails with a `ConfigurationError`. The
//! schema is immutable after construction; attribute values may change
//! through `set`, which re-validates declared fields.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{PageError, Result};

/// Expected shape of a declared resource field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Bool,
    Array,
    Object,
    /// Presence only; any value conforms.
    Any,
}

impl FieldKind {
    fn admits(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

/// Required-field declarations for a `Resource`.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    required: Vec<(String, FieldKind)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.required.push((name.into(), kind));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.required.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.required
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, kind)| *kind)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resource {
    attributes: BTreeMap<String, Value>,
    schema: Schema,
}

impl Resource {
    /// An empty resource with no schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    /// Build a resource from attributes, enforcing `schema`.
    pub fn with_schema(attributes: BTreeMap<String, Value>, schema: Schema) -> Result<Self> {
        validate(&attributes, &schema)?;
        Ok(Self { attributes, schema })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Set an attribute, re-validating it against the schema if declared.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        if let Some(kind) = self.schema.kind_of(&name) {
            if !kind.admits(&value) {
                return Err(PageError::ConfigurationError(format!(
                    "resource field {:?} is not of type {:?} as expected",
                    name, kind
                )));
            }
        }
        self.attributes.insert(name, value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

fn validate(attributes: &BTreeMap<String, Value>, schema: &Schema) -> Result<()> {
    for (name, kind) in schema.fields() {
        match attributes.get(name) {
            None => {
                return Err(PageError::ConfigurationError(format!(
                    "resource missing required field {:?}",
                    name
                )))
            }
            Some(value) if !kind.admits(value) => {
                return Err(PageError::ConfigurationError(format!(
                    "resource field {:?} is not of type {:?} as expected",
                    name, kind
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attributes: BTreeMap<String, Value>,
    schema: Schema,
}

impl ResourceBuilder {
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn require(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.schema = self.schema.require(name, kind);
        self
    }

    pub fn build(self) -> Result<Resource> {
        Resource::with_schema(self.attributes, self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_when_required_fields_present() {
        let resource = Resource::builder()
            .attribute("base_url", "http://localhost:3000")
            .attribute("retries", 3)
            .require("base_url", FieldKind::String)
            .require("retries", FieldKind::Integer)
            .build()
            .unwrap();
        assert_eq!(resource.get_str("base_url"), Some("http://localhost:3000"));
        assert_eq!(resource.get_i64("retries"), Some(3));
    }

    #[test]
    fn missing_required_field_fails_at_construction() {
        let err = Resource::builder()
            .require("base_url", FieldKind::String)
            .build()
            .unwrap_err();
        assert!(matches!(err, PageError::ConfigurationError(_)));
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn wrong_type_fails_at_construction() {
        let err = Resource::builder()
            .attribute("retries", "three")
            .require("retries", FieldKind::Integer)
            .build()
            .unwrap_err();
        assert!(matches!(err, PageError::ConfigurationError(_)));
    }

    #[test]
    fn set_revalidates_declared_fields() {
        let mut resource = Resource::builder()
            .attribute("retries", 3)
            .require("retries", FieldKind::Integer)
            .build()
            .unwrap();
        assert!(resource.set("retries", 5).is_ok());
        assert!(resource.set("retries", "five").is_err());
        assert_eq!(resource.get_i64("retries"), Some(5));
    }

    #[test]
    fn undeclared_fields_are_unconstrained() {
        let mut resource = Resource::new();
        resource.set("anything", serde_json::json!({"nested": true})).unwrap();
        assert!(resource.contains("anything"));
    }

    #[test]
    fn any_kind_only_requires_presence() {
        let resource = Resource::builder()
            .attribute("payload", serde_json::Value::Null)
            .require("payload", FieldKind::Any)
            .build()
            .unwrap();
        assert!(resource.contains("payload"));
    }
}
