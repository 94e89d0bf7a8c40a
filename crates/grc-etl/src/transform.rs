//! Named transformation registry
//!
//! Transformations are registered once at startup and referenced by name
//! from pipeline definitions. The built-ins cover the common record
//! cleanup work; domain transformations register alongside them.

use grc_common::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A transformation over a record batch
pub type TransformFn = Arc<dyn Fn(Vec<Value>) -> CoreResult<Vec<Value>> + Send + Sync>;

/// Registry of named transformations
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, TransformFn>>,
}

impl TransformRegistry {
    /// Create a registry preloaded with the built-in transformations
    pub fn new() -> Self {
        let registry = Self {
            transforms: RwLock::new(HashMap::new()),
        };
        registry.register("clean_text", Arc::new(clean_text));
        registry.register("normalize_dates", Arc::new(normalize_dates));
        registry.register("remove_duplicates", Arc::new(remove_duplicates));
        registry
    }

    /// Register a transformation under a stable name
    pub fn register(&self, name: &str, transform: TransformFn) {
        self.transforms.write().insert(name.to_string(), transform);
    }

    /// Register a lookup-table enrichment: `field` values are mapped
    /// through `table` into `target_field`
    pub fn register_enrichment(
        &self,
        name: &str,
        field: String,
        target_field: String,
        table: HashMap<String, Value>,
    ) {
        let transform: TransformFn = Arc::new(move |mut records| {
            for record in records.iter_mut() {
                let Some(map) = record.as_object_mut() else {
                    continue;
                };
                let lookup = map
                    .get(&field)
                    .and_then(|value| value.as_str())
                    .and_then(|key| table.get(key).cloned());
                if let Some(enriched) = lookup {
                    map.insert(target_field.clone(), enriched);
                }
            }
            Ok(records)
        });
        self.register(name, transform);
    }

    /// Resolve a transformation; unknown names are a construction error
    pub fn resolve(&self, name: &str) -> CoreResult<TransformFn> {
        self.transforms
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("transformation {}", name)))
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Trim strings and collapse internal whitespace runs
fn clean_text(mut records: Vec<Value>) -> CoreResult<Vec<Value>> {
    for record in records.iter_mut() {
        if let Some(map) = record.as_object_mut() {
            for value in map.values_mut() {
                if let Value::String(s) = value {
                    let cleaned = s.split_whitespace().collect::<Vec<_>>().join(" ");
                    *s = cleaned;
                }
            }
        }
    }
    Ok(records)
}

// Re-encode parseable date strings as RFC 3339 UTC
fn normalize_dates(mut records: Vec<Value>) -> CoreResult<Vec<Value>> {
    for record in records.iter_mut() {
        if let Some(map) = record.as_object_mut() {
            for value in map.values_mut() {
                if let Value::String(s) = value {
                    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(s) {
                        *s = parsed.with_timezone(&chrono::Utc).to_rfc3339();
                    } else if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                        if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
                            *s = datetime.and_utc().to_rfc3339();
                        }
                    }
                }
            }
        }
    }
    Ok(records)
}

// Drop records whose full canonical form repeats
fn remove_duplicates(records: Vec<Value>) -> CoreResult<Vec<Value>> {
    let mut seen = HashSet::new();
    Ok(records
        .into_iter()
        .filter(|record| seen.insert(record.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_text() {
        let registry = TransformRegistry::new();
        let transform = registry.resolve("clean_text").unwrap();
        let out = transform(vec![json!({"name": "  acme   corp  "})]).unwrap();
        assert_eq!(out[0]["name"], "acme corp");
    }

    #[test]
    fn test_normalize_dates() {
        let registry = TransformRegistry::new();
        let transform = registry.resolve("normalize_dates").unwrap();
        let out = transform(vec![json!({"collected": "2025-03-01"})]).unwrap();
        assert_eq!(out[0]["collected"], "2025-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_remove_duplicates() {
        let registry = TransformRegistry::new();
        let transform = registry.resolve("remove_duplicates").unwrap();
        let out = transform(vec![
            json!({"id": 1}),
            json!({"id": 1}),
            json!({"id": 2}),
        ])
        .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_enrichment_lookup() {
        let registry = TransformRegistry::new();
        let mut table = HashMap::new();
        table.insert("us-east-1".to_string(), json!({"region_name": "N. Virginia"}));
        registry.register_enrichment("region_names", "region".into(), "region_info".into(), table);

        let transform = registry.resolve("region_names").unwrap();
        let out = transform(vec![json!({"region": "us-east-1"}), json!({"region": "eu-west-9"})])
            .unwrap();
        assert_eq!(out[0]["region_info"]["region_name"], "N. Virginia");
        assert!(out[1].get("region_info").is_none());
    }

    #[test]
    fn test_unknown_name_rejected() {
        let registry = TransformRegistry::new();
        assert!(matches!(
            registry.resolve("does_not_exist"),
            Err(CoreError::NotFound(_))
        ));
    }
}
