//! Composable validation rules
//!
//! Rules are registered once under stable names and instantiated with
//! per-pipeline parameters. A rule judges every record and reports the
//! indices that failed; the pipeline drops failed records before loading
//! (or aborts, per pipeline config).

use chrono::{DateTime, Duration, Utc};
use grc_common::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One record-level validation failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Index of the failing record in the batch
    pub index: usize,
    /// Field that failed, when attributable
    pub field: Option<String>,
    /// What went wrong
    pub message: String,
}

/// Result of running validation over a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether every record passed
    pub valid: bool,
    /// Record-level failures
    pub errors: Vec<ValidationError>,
    /// Non-fatal observations
    pub warnings: Vec<String>,
    /// Aggregate statistics
    pub stats: Value,
}

impl ValidationResult {
    /// A passing result over `count` records
    pub fn passing(count: usize) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            stats: json!({ "records": count }),
        }
    }

    /// Indices of records that failed any rule
    pub fn failed_indices(&self) -> HashSet<usize> {
        self.errors.iter().map(|error| error.index).collect()
    }

    /// Fold another rule's result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// A parameterised validation over a record batch
pub type ValidationFn = Arc<dyn Fn(&[Value], &Value) -> ValidationResult + Send + Sync>;

/// Registry of named validation rules
pub struct ValidationRegistry {
    rules: RwLock<HashMap<String, ValidationFn>>,
}

impl ValidationRegistry {
    /// Create a registry preloaded with the built-in rules
    pub fn new() -> Self {
        let registry = Self {
            rules: RwLock::new(HashMap::new()),
        };
        registry.register("required_fields", Arc::new(required_fields));
        registry.register("data_ranges", Arc::new(data_ranges));
        registry.register("referential_integrity", Arc::new(referential_integrity));
        registry.register("freshness", Arc::new(freshness));
        registry.register("no_duplicates", Arc::new(no_duplicates));
        registry
    }

    /// Register a rule under a stable name
    pub fn register(&self, name: &str, rule: ValidationFn) {
        self.rules.write().insert(name.to_string(), rule);
    }

    /// Resolve a rule; unknown names are a construction error
    pub fn resolve(&self, name: &str) -> CoreResult<ValidationFn> {
        self.rules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("validation rule {}", name)))
    }
}

impl Default for ValidationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// params: {"fields": ["a", "b"]}
fn required_fields(records: &[Value], params: &Value) -> ValidationResult {
    let fields: Vec<&str> = params["fields"]
        .as_array()
        .map(|list| list.iter().filter_map(|f| f.as_str()).collect())
        .unwrap_or_default();

    let mut result = ValidationResult::passing(records.len());
    for (index, record) in records.iter().enumerate() {
        for field in &fields {
            let present = record
                .get(field)
                .map(|value| !value.is_null())
                .unwrap_or(false);
            if !present {
                result.valid = false;
                result.errors.push(ValidationError {
                    index,
                    field: Some(field.to_string()),
                    message: format!("missing required field {}", field),
                });
            }
        }
    }
    result
}

// params: {"ranges": {"score": {"min": 0.0, "max": 1.0}}}
fn data_ranges(records: &[Value], params: &Value) -> ValidationResult {
    let empty = serde_json::Map::new();
    let ranges = params["ranges"].as_object().unwrap_or(&empty);

    let mut result = ValidationResult::passing(records.len());
    for (index, record) in records.iter().enumerate() {
        for (field, bounds) in ranges {
            let Some(value) = record.get(field).and_then(|v| v.as_f64()) else {
                continue;
            };
            let min = bounds["min"].as_f64().unwrap_or(f64::NEG_INFINITY);
            let max = bounds["max"].as_f64().unwrap_or(f64::INFINITY);
            if value < min || value > max {
                result.valid = false;
                result.errors.push(ValidationError {
                    index,
                    field: Some(field.clone()),
                    message: format!("{} = {} outside [{}, {}]", field, value, min, max),
                });
            }
        }
    }
    result
}

// params: {"field": "control_id", "allowed": ["CC6.1", ...]}
fn referential_integrity(records: &[Value], params: &Value) -> ValidationResult {
    let field = params["field"].as_str().unwrap_or_default();
    let allowed: HashSet<&str> = params["allowed"]
        .as_array()
        .map(|list| list.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let mut result = ValidationResult::passing(records.len());
    for (index, record) in records.iter().enumerate() {
        if let Some(value) = record.get(field).and_then(|v| v.as_str()) {
            if !allowed.contains(value) {
                result.valid = false;
                result.errors.push(ValidationError {
                    index,
                    field: Some(field.to_string()),
                    message: format!("{} references unknown {}", value, field),
                });
            }
        }
    }
    result
}

// params: {"field": "collected_at", "max_age_hours": 24}
fn freshness(records: &[Value], params: &Value) -> ValidationResult {
    let field = params["field"].as_str().unwrap_or_default();
    let max_age_hours = params["max_age_hours"].as_i64().unwrap_or(24);
    let cutoff = Utc::now() - Duration::hours(max_age_hours);

    let mut result = ValidationResult::passing(records.len());
    for (index, record) in records.iter().enumerate() {
        let Some(raw) = record.get(field).and_then(|v| v.as_str()) else {
            continue;
        };
        match DateTime::parse_from_rfc3339(raw) {
            Ok(timestamp) if timestamp.with_timezone(&Utc) < cutoff => {
                result.valid = false;
                result.errors.push(ValidationError {
                    index,
                    field: Some(field.to_string()),
                    message: format!("{} older than {}h", field, max_age_hours),
                });
            }
            Ok(_) => {}
            Err(_) => result
                .warnings
                .push(format!("record {}: unparseable {}", index, field)),
        }
    }
    result
}

// params: {"key": "id"}
fn no_duplicates(records: &[Value], params: &Value) -> ValidationResult {
    let key = params["key"].as_str().unwrap_or_default();
    let mut seen: HashSet<String> = HashSet::new();

    let mut result = ValidationResult::passing(records.len());
    for (index, record) in records.iter().enumerate() {
        let Some(value) = record.get(key) else {
            continue;
        };
        if !seen.insert(value.to_string()) {
            result.valid = false;
            result.errors.push(ValidationError {
                index,
                field: Some(key.to_string()),
                message: format!("duplicate {} = {}", key, value),
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields_flags_missing() {
        let registry = ValidationRegistry::new();
        let rule = registry.resolve("required_fields").unwrap();
        let records = vec![
            json!({"id": 1, "name": "ok"}),
            json!({"id": 2}),
            json!({"id": 3, "name": null}),
        ];
        let result = rule(&records, &json!({"fields": ["name"]}));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.failed_indices(), [1, 2].into_iter().collect());
    }

    #[test]
    fn test_data_ranges() {
        let registry = ValidationRegistry::new();
        let rule = registry.resolve("data_ranges").unwrap();
        let records = vec![json!({"score": 0.5}), json!({"score": 1.7})];
        let result = rule(
            &records,
            &json!({"ranges": {"score": {"min": 0.0, "max": 1.0}}}),
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 1);
    }

    #[test]
    fn test_referential_integrity() {
        let registry = ValidationRegistry::new();
        let rule = registry.resolve("referential_integrity").unwrap();
        let records = vec![json!({"control_id": "CC6.1"}), json!({"control_id": "XX.9"})];
        let result = rule(
            &records,
            &json!({"field": "control_id", "allowed": ["CC6.1", "CC6.2"]}),
        );
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_freshness() {
        let registry = ValidationRegistry::new();
        let rule = registry.resolve("freshness").unwrap();
        let stale = (Utc::now() - Duration::hours(48)).to_rfc3339();
        let fresh = Utc::now().to_rfc3339();
        let records = vec![
            json!({ "collected_at": stale }),
            json!({ "collected_at": fresh }),
            json!({"collected_at": "not-a-date"}),
        ];
        let result = rule(&records, &json!({"field": "collected_at", "max_age_hours": 24}));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 0);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_no_duplicates() {
        let registry = ValidationRegistry::new();
        let rule = registry.resolve("no_duplicates").unwrap();
        let records = vec![json!({"id": "a"}), json!({"id": "b"}), json!({"id": "a"})];
        let result = rule(&records, &json!({"key": "id"}));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 2);
    }

    #[test]
    fn test_merge_accumulates() {
        let mut base = ValidationResult::passing(10);
        let mut other = ValidationResult::passing(10);
        other.valid = false;
        other.errors.push(ValidationError {
            index: 3,
            field: None,
            message: "bad".into(),
        });
        base.merge(other);
        assert!(!base.valid);
        assert_eq!(base.errors.len(), 1);
    }
}
