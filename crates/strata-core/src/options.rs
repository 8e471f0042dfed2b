//! Vendor options and their required/available key schema.

use crate::error::{DaoError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Flat, string-keyed construction options of a DAO
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaoOptions(BTreeMap<String, Value>);

impl DaoOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Booleans may also be written as `"true"` / `"false"`
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Present, not null and not the empty string
    pub fn has_value(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DaoOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Required and available option keys of a vendor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSchema {
    required: BTreeSet<String>,
    available: BTreeSet<String>,
}

impl OptionSchema {
    /// Required keys are always available
    pub fn new(required: &[&str], available: &[&str]) -> Self {
        let required: BTreeSet<String> = required.iter().map(|s| s.to_string()).collect();
        let mut available: BTreeSet<String> = available.iter().map(|s| s.to_string()).collect();
        available.extend(required.iter().cloned());
        Self {
            required,
            available,
        }
    }

    /// Add keys on top of a vendor's own declaration
    pub fn extend(mut self, required: &[&str], available: &[&str]) -> Self {
        for key in required {
            self.required.insert(key.to_string());
            self.available.insert(key.to_string());
        }
        for key in available {
            self.available.insert(key.to_string());
        }
        self
    }

    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(String::as_str)
    }

    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.available.iter().map(String::as_str)
    }

    pub fn is_available(&self, key: &str) -> bool {
        self.available.contains(key)
    }

    /// Reject missing required keys first, then unknown keys
    pub fn validate(&self, dao_name: &str, options: &DaoOptions) -> Result<()> {
        if let Some(missing) = self.required.iter().find(|key| !options.has_value(key)) {
            return Err(DaoError::missing_field(format!(
                "{dao_name}: \"options.{missing}\" is required"
            )));
        }

        let unknown: Vec<&str> = options
            .keys()
            .filter(|key| !self.available.contains(*key))
            .collect();
        if !unknown.is_empty() {
            return Err(DaoError::invalid_parameter(format!(
                "{dao_name}: unknown options: {}",
                unknown.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKey;
    use serde_json::json;

    fn schema() -> OptionSchema {
        OptionSchema::new(&["url"], &["user", "password"])
    }

    #[test]
    fn test_valid_options() {
        let options = DaoOptions::new()
            .with("url", "http://localhost:7474")
            .with("user", "neo4j");
        assert!(schema().validate("Graph DAO (neo4j)", &options).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = schema()
            .validate("Graph DAO (neo4j)", &DaoOptions::new().with("user", "a"))
            .unwrap_err();
        assert_eq!(err.key(), ErrorKey::MissingField);
        assert_eq!(
            err.message(),
            "Graph DAO (neo4j): \"options.url\" is required"
        );
    }

    #[test]
    fn test_null_and_empty_count_as_missing() {
        let null = DaoOptions::new().with("url", Value::Null);
        let empty = DaoOptions::new().with("url", "");
        assert!(schema().validate("x", &null).is_err());
        assert!(schema().validate("x", &empty).is_err());
    }

    #[test]
    fn test_unknown_options_listed_sorted() {
        let options = DaoOptions::new()
            .with("url", "http://x")
            .with("zeta", 1)
            .with("alpha", true);
        let err = schema().validate("Index DAO (es)", &options).unwrap_err();
        assert_eq!(err.key(), ErrorKey::InvalidParameter);
        assert_eq!(err.message(), "Index DAO (es): unknown options: alpha, zeta");
    }

    #[test]
    fn test_typed_getters() {
        let options: DaoOptions = serde_json::from_value(json!({
            "port": 7474,
            "secure": "true",
            "flag": false,
            "name": "graph"
        }))
        .unwrap();
        assert_eq!(options.get_u64("port"), Some(7474));
        assert_eq!(options.get_bool("secure"), Some(true));
        assert_eq!(options.get_bool("flag"), Some(false));
        assert_eq!(options.get_str("name"), Some("graph"));
        assert_eq!(options.get_str("missing"), None);
    }

    #[test]
    fn test_schema_extend() {
        let schema = schema().extend(&["indexName"], &["skipEdgeIndexation"]);
        assert!(schema.is_available("indexName"));
        assert!(schema.is_available("skipEdgeIndexation"));
        assert_eq!(schema.required().count(), 2);
    }
}
