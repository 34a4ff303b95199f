//! Per-request filter results
//!
//! Every filter that runs on a request publishes one [`FilterResult`] into the
//! request's [`FilterContext`], keyed by the filter's tag. Handlers and
//! templates read the context afterwards; reads of missing tags or names
//! yield `null` instead of failing.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

static NULL: Value = Value::Null;

/// Values extracted by one filter for one request
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    tag: String,
    values: IndexMap<String, Value>,
}

impl FilterResult {
    /// Create an empty result owned by the filter `tag`
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            values: IndexMap::new(),
        }
    }

    /// Tag of the filter that produced this result
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Set a named value, replacing any previous one
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a named value, `null` when absent
    pub fn value(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    /// Get a named value as a string slice
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// All values in parameter declaration order
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Serialized as a plain map so templates can write `{{ tag.name }}`.
impl Serialize for FilterResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Mutable per-request bag shared by filters, handlers and templates
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    results: IndexMap<String, FilterResult>,
    values: IndexMap<String, Value>,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a result under its tag, replacing any previous result
    pub fn publish(&mut self, result: FilterResult) {
        self.results.insert(result.tag().to_string(), result);
    }

    /// Result published under `tag`, if that filter ran
    pub fn result(&self, tag: &str) -> Option<&FilterResult> {
        self.results.get(tag)
    }

    /// Value `name` of the result under `tag`, `null` when either is absent
    pub fn value(&self, tag: &str, name: &str) -> &Value {
        self.result(tag).map_or(&NULL, |r| r.value(name))
    }

    /// Tags of published results, in publication order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn results(&self) -> impl Iterator<Item = &FilterResult> {
        self.results.values()
    }

    /// Store a free-form value (used by custom pre-handlers)
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Free-form value stored under `key`, `null` when absent
    pub fn get(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&NULL)
    }

    pub fn extras(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_get_with_default() {
        let mut result = FilterResult::new("f1");
        result.set("path", json!("/abc"));

        assert_eq!(result.tag(), "f1");
        assert_eq!(result.get_str("path"), Some("/abc"));
        assert_eq!(result.value("missing"), &Value::Null);
        assert!(result.get("missing").is_none());
    }

    #[test]
    fn test_result_keeps_declaration_order() {
        let mut result = FilterResult::new("f");
        result.set("b", json!(1));
        result.set("a", json!(2));
        let names: Vec<_> = result.values().keys().cloned().collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_result_serializes_as_map() {
        let mut result = FilterResult::new("f2");
        result.set("zed", json!("9"));
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"zed": "9"}));
    }

    #[test]
    fn test_context_missing_tag_reads_null() {
        let ctx = FilterContext::new();
        assert!(ctx.result("f3").is_none());
        assert_eq!(ctx.value("f3", "path"), &Value::Null);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_context_publish_overwrites_same_tag() {
        let mut ctx = FilterContext::new();
        let mut first = FilterResult::new("f");
        first.set("n", json!(1));
        let mut second = FilterResult::new("f");
        second.set("n", json!(2));

        ctx.publish(first);
        ctx.publish(second);

        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.value("f", "n"), &json!(2));
    }

    #[test]
    fn test_context_extras() {
        let mut ctx = FilterContext::new();
        ctx.set("custom_before_func", json!(true));
        assert_eq!(ctx.get("custom_before_func"), &json!(true));
        assert_eq!(ctx.get("other"), &Value::Null);
    }
}
