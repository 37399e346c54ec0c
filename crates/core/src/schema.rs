//! Typed argument schemas for tool calls.
//!
//! Tools self-describe their arguments with a small structural schema
//! instead of a loosely-typed JSON-schema map. The conversation loop
//! validates calls against it before dispatch; violations surface to the
//! model as `missing_args` / `invalid_type` feedback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The accepted argument value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
}

/// Constraints for a single named argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub kind: ArgKind,

    /// Inclusive lower bound, checked for any numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive upper bound, checked for any numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl PropertySpec {
    pub fn new(kind: ArgKind) -> Self {
        Self {
            kind,
            minimum: None,
            maximum: None,
        }
    }

    pub fn string() -> Self {
        Self::new(ArgKind::String)
    }

    pub fn integer() -> Self {
        Self::new(ArgKind::Integer)
    }

    pub fn number() -> Self {
        Self::new(ArgKind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(ArgKind::Boolean)
    }

    pub fn object() -> Self {
        Self::new(ArgKind::Object)
    }

    pub fn with_minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    pub fn with_maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    fn kind_matches(&self, value: &Value) -> bool {
        match self.kind {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Number => value.is_number(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::Object => value.is_object(),
        }
    }

    fn bounds_hold(&self, value: &Value) -> bool {
        let Some(n) = value.as_f64() else {
            return true;
        };
        if self.minimum.is_some_and(|min| n < min) {
            return false;
        }
        if self.maximum.is_some_and(|max| n > max) {
            return false;
        }
        true
    }
}

/// A schema violation, carrying the offending argument names in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// Required arguments absent from the call
    Missing(Vec<String>),
    /// Arguments present but of the wrong type or out of range
    InvalidType(Vec<String>),
}

/// The declared argument schema of one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySpec>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn property(mut self, name: impl Into<String>, spec: PropertySpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    /// Validate an argument object structurally.
    ///
    /// Missing required arguments are reported first; only when all required
    /// arguments are present are per-property type and range constraints
    /// checked.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), SchemaViolation> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|k| !args.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SchemaViolation::Missing(missing));
        }

        let mut invalid: Vec<String> = Vec::new();
        for (key, spec) in &self.properties {
            let Some(value) = args.get(key) else {
                continue;
            };
            if !spec.kind_matches(value) || !spec.bounds_hold(value) {
                invalid.push(key.clone());
            }
        }
        if !invalid.is_empty() {
            return Err(SchemaViolation::InvalidType(invalid));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn accepts_valid_args() {
        let schema = ArgSchema::new()
            .required("path")
            .property("path", PropertySpec::string())
            .property("max_bytes", PropertySpec::integer().with_minimum(1.0));
        assert!(
            schema
                .validate(&args(json!({"path": "/tmp/x", "max_bytes": 10})))
                .is_ok()
        );
    }

    #[test]
    fn reports_missing_before_types() {
        let schema = ArgSchema::new()
            .required("path")
            .property("depth", PropertySpec::integer());
        // depth has the wrong type too, but the missing required arg wins
        let err = schema
            .validate(&args(json!({"depth": "three"})))
            .unwrap_err();
        assert_eq!(err, SchemaViolation::Missing(vec!["path".into()]));
    }

    #[test]
    fn reports_type_mismatch() {
        let schema = ArgSchema::new().property("count", PropertySpec::integer());
        let err = schema
            .validate(&args(json!({"count": "many"})))
            .unwrap_err();
        assert_eq!(err, SchemaViolation::InvalidType(vec!["count".into()]));
    }

    #[test]
    fn integer_rejects_float() {
        let schema = ArgSchema::new().property("count", PropertySpec::integer());
        assert!(schema.validate(&args(json!({"count": 1.5}))).is_err());
        assert!(schema.validate(&args(json!({"count": 2}))).is_ok());
    }

    #[test]
    fn numeric_range_enforced() {
        let schema = ArgSchema::new().property(
            "width",
            PropertySpec::integer().with_minimum(1.0).with_maximum(4096.0),
        );
        assert!(schema.validate(&args(json!({"width": 0}))).is_err());
        assert!(schema.validate(&args(json!({"width": 5000}))).is_err());
        assert!(schema.validate(&args(json!({"width": 1920}))).is_ok());
    }

    #[test]
    fn extra_args_ignored() {
        let schema = ArgSchema::new().property("path", PropertySpec::string());
        assert!(
            schema
                .validate(&args(json!({"path": "x", "verbose": true})))
                .is_ok()
        );
    }
}
