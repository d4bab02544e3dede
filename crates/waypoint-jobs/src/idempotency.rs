//! Idempotency key derivation for research job submissions.
//!
//! Canonicalizes the subset of request parameters spec.md §4.5 marks as
//! significant, then derives a stable key so two submissions with the
//! same meaningful inputs collapse onto the same job.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

const DEFAULT_COST_PREFERENCE: &str = "low";
const DEFAULT_AUDIENCE_LEVEL: &str = "intermediate";
const DEFAULT_OUTPUT_FORMAT: &str = "report";

/// Reduce one attachment to `{count, first_hash}`, where `first_hash` is
/// a 16-char prefix of SHA-256 over the first element's canonical
/// serialization.
fn summarize_attachments(values: &[Value], first_serialization: impl Fn(&Value) -> String) -> Value {
    let mut obj = Map::new();
    obj.insert("count".to_string(), Value::from(values.len()));
    if let Some(first) = values.first() {
        let serialized = first_serialization(first);
        let hash = hex::encode(Sha256::digest(serialized.as_bytes()));
        obj.insert("first_hash".to_string(), Value::String(hash[..16].to_string()));
    }
    Value::Object(obj)
}

fn image_serialization(v: &Value) -> String {
    v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())
}

fn text_document_serialization(v: &Value) -> String {
    let text = v.as_str().unwrap_or_default();
    text.chars().take(1000).collect()
}

fn structured_data_serialization(v: &Value) -> String {
    canonicalize_value(v).to_string()
}

/// Recursively sort object keys so serialization is deterministic
/// regardless of insertion order.
fn canonicalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_value).collect()),
        other => other.clone(),
    }
}

/// Reduce a raw research-job params blob to the canonical subset spec.md
/// §4.5 says is significant for idempotency purposes, applying every
/// stated default along the way.
pub fn canonicalize(params: &Value) -> Value {
    let query = params
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    let cost_preference = params
        .get("costPreference")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_COST_PREFERENCE)
        .to_string();

    let audience_level = params
        .get("audienceLevel")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_AUDIENCE_LEVEL)
        .to_string();

    let output_format = params
        .get("outputFormat")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_OUTPUT_FORMAT)
        .to_string();

    let include_sources = params
        .get("includeSources")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let max_length = params.get("maxLength").cloned().unwrap_or(Value::Null);

    let images = params
        .get("images")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let text_documents = params
        .get("textDocuments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let structured_data = params
        .get("structuredData")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut canonical = Map::new();
    canonical.insert("query".to_string(), Value::String(query));
    canonical.insert("cost_preference".to_string(), Value::String(cost_preference));
    canonical.insert("audience_level".to_string(), Value::String(audience_level));
    canonical.insert("output_format".to_string(), Value::String(output_format));
    canonical.insert("include_sources".to_string(), Value::Bool(include_sources));
    canonical.insert("max_length".to_string(), max_length);
    canonical.insert("images".to_string(), summarize_attachments(&images, image_serialization));
    canonical.insert(
        "text_documents".to_string(),
        summarize_attachments(&text_documents, text_document_serialization),
    );
    canonical.insert(
        "structured_data".to_string(),
        summarize_attachments(&structured_data, structured_data_serialization),
    );

    canonicalize_value(&Value::Object(canonical))
}

/// Derive the idempotency key: sorted-key JSON serialization of the
/// canonical params, SHA-256, first 16 hex chars.
pub fn derive_key(canonical: &Value) -> String {
    let serialized = canonical.to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_applies_defaults() {
        let canonical = canonicalize(&json!({"query": "  What is X?  "}));
        assert_eq!(canonical["query"], "what is x?");
        assert_eq!(canonical["cost_preference"], "low");
        assert_eq!(canonical["audience_level"], "intermediate");
        assert_eq!(canonical["output_format"], "report");
        assert_eq!(canonical["include_sources"], true);
    }

    #[test]
    fn canonicalize_is_case_and_whitespace_insensitive() {
        let a = canonicalize(&json!({"query": "What Is X?"}));
        let b = canonicalize(&json!({"query": "  what is x?  "}));
        assert_eq!(a, b);
    }

    #[test]
    fn derive_key_is_stable_for_equivalent_params() {
        let a = canonicalize(&json!({"query": "hello", "costPreference": "low"}));
        let b = canonicalize(&json!({"query": "HELLO", "costPreference": "low"}));
        assert_eq!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn derive_key_differs_for_different_queries() {
        let a = canonicalize(&json!({"query": "hello"}));
        let b = canonicalize(&json!({"query": "goodbye"}));
        assert_ne!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn derive_key_is_16_hex_chars() {
        let canonical = canonicalize(&json!({"query": "hello"}));
        let key = derive_key(&canonical);
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn attachments_reduce_to_count_and_hash() {
        let canonical = canonicalize(&json!({
            "query": "hello",
            "textDocuments": ["first doc content", "second doc content"],
        }));
        assert_eq!(canonical["text_documents"]["count"], 2);
        assert!(canonical["text_documents"]["first_hash"].is_string());
    }

    #[test]
    fn key_unaffected_by_json_key_order() {
        let a = canonicalize(&json!({"query": "hello", "costPreference": "low"}));
        let b = canonicalize(&json!({"costPreference": "low", "query": "hello"}));
        assert_eq!(derive_key(&a), derive_key(&b));
    }
}
