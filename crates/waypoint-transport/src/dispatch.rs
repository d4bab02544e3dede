//! `tools/call(name, arguments)` → typed handler invocation.
//!
//! Five independently unit-testable steps, each a pure function over a
//! `serde_json::Map`: global aliases → category aliases → category
//! defaults → type coercion → schema validation.

use std::sync::OnceLock;

use regex::Regex;
use schemars::schema::{InstanceType, RootSchema, SingleOrVec};
use serde_json::{Map, Value};

use waypoint_core::{Error, Result};

/// Step 1 aliases, applied to every tool call regardless of category.
pub static GLOBAL_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "q" => "query",
    "k" => "limit",
    "cost" => "costPreference",
    "aud" => "audienceLevel",
    "fmt" => "outputFormat",
    "src" => "includeSources",
    "imgs" => "images",
    "docs" => "textDocuments",
    "data" => "structuredData",
};

/// Which alias table and default set a tool draws from. The catalog
/// assigns each tool one of these at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Research,
    Search,
    Job,
    Report,
    Graph,
    Other,
}

static JOB_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "job_id" => "id",
    "jobId" => "id",
};

static REPORT_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "reportId" => "id",
    "report_id" => "id",
};

static GRAPH_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "startNode" => "node",
};

fn category_aliases(category: ToolCategory) -> &'static phf::Map<&'static str, &'static str> {
    match category {
        ToolCategory::Job => &JOB_ALIASES,
        ToolCategory::Report => &REPORT_ALIASES,
        ToolCategory::Graph => &GRAPH_ALIASES,
        ToolCategory::Research | ToolCategory::Search | ToolCategory::Other => &GLOBAL_ALIASES,
    }
}

/// Step 1/2: rewrite alias keys to their canonical name. Aliasing never
/// overwrites a key the caller already supplied under its canonical
/// name, so an explicit `query` always wins over a stray `q`.
fn apply_aliases(args: &mut Map<String, Value>, aliases: &phf::Map<&'static str, &'static str>) {
    let present: Vec<String> = args.keys().cloned().collect();
    for key in present {
        if let Some(&canonical) = aliases.get(key.as_str()) {
            if !args.contains_key(canonical) {
                if let Some(value) = args.remove(&key) {
                    args.insert(canonical.to_string(), value);
                }
            } else {
                args.remove(&key);
            }
        }
    }
}

/// Step 3: category-level defaults, applied only for keys the caller
/// left unset.
fn apply_category_defaults(args: &mut Map<String, Value>, category: ToolCategory) {
    let defaults: &[(&str, Value)] = match category {
        ToolCategory::Research => &[],
        ToolCategory::Search => &[],
        _ => &[],
    };
    // Defaults that need a non-const `Value` (bool/number literals are
    // fine as consts, but `Value` itself isn't `const`-constructible) are
    // applied explicitly below instead of via the table above.
    let _ = defaults;
    match category {
        ToolCategory::Research => {
            args.entry("costPreference").or_insert_with(|| Value::String("low".to_string()));
            args.entry("async").or_insert(Value::Bool(true));
        }
        ToolCategory::Search => {
            args.entry("limit").or_insert(Value::from(10u64));
            args.entry("scope").or_insert_with(|| Value::String("both".to_string()));
        }
        _ => {}
    }
}

fn schema_instance_type(schema: &RootSchema, field: &str) -> Option<InstanceType> {
    let object = schema.schema.object.as_ref()?;
    let prop = object.properties.get(field)?;
    let subschema = prop.clone().into_object();
    match subschema.instance_type? {
        SingleOrVec::Single(t) => Some(*t),
        SingleOrVec::Vec(ts) => ts.into_iter().next(),
    }
}

/// Step 4: coerce numeric strings and `"true"`/`"1"`/`"false"`/`"0"`
/// strings into the type the schema declares for that field, leaving
/// anything that doesn't parse for the validator to reject with a
/// precise message.
fn coerce_types(args: &mut Map<String, Value>, schema: &RootSchema) {
    let keys: Vec<String> = args.keys().cloned().collect();
    for key in keys {
        let Some(expected) = schema_instance_type(schema, &key) else {
            continue;
        };
        let Some(Value::String(raw)) = args.get(&key) else {
            continue;
        };
        let coerced = match expected {
            InstanceType::Integer => raw.parse::<i64>().ok().map(Value::from),
            InstanceType::Number => raw.parse::<f64>().ok().map(Value::from),
            InstanceType::Boolean => match raw.as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        if let Some(value) = coerced {
            args.insert(key, value);
        }
    }
}

fn cross_alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^job_\d+_[a-z0-9]{6,}$").unwrap())
}

/// A caller that passes a job id where a numeric report id is expected
/// gets a specific explanation rather than a generic type-mismatch
/// error.
fn detect_cross_alias(args: &Map<String, Value>, schema: &RootSchema) -> Result<()> {
    if let Some(Value::String(id)) = args.get("id") {
        if matches!(schema_instance_type(schema, "id"), Some(InstanceType::Integer))
            && cross_alias_pattern().is_match(id)
        {
            return Err(Error::Validation(format!(
                "`id` looks like a job id ({id}), not a report id; pass the numeric \
                 report id returned in a job's `report_id` result field instead"
            )));
        }
    }
    Ok(())
}

/// Step 5: validate the normalized arguments against the tool's declared
/// input schema, collecting every violation into one message.
fn validate_schema(args: &Value, schema: &RootSchema) -> Result<()> {
    let schema_value = serde_json::to_value(schema).map_err(|e| Error::Internal(e.to_string()))?;
    let compiled = jsonschema::validator_for(&schema_value)
        .map_err(|e| Error::Internal(format!("invalid tool schema: {e}")))?;
    let errors: Vec<String> = compiled.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors.join("; ")))
    }
}

/// Run the full normalization + validation pipeline against one tool
/// call's raw arguments, returning the normalized value ready for
/// `serde_json::from_value` into the tool's typed params struct.
pub fn normalize(category: ToolCategory, schema: &RootSchema, arguments: Value) -> Result<Value> {
    let Value::Object(mut args) = arguments else {
        return Err(Error::Validation("tool arguments must be a JSON object".to_string()));
    };

    apply_aliases(&mut args, &GLOBAL_ALIASES);
    apply_aliases(&mut args, category_aliases(category));
    apply_category_defaults(&mut args, category);
    coerce_types(&mut args, schema);
    detect_cross_alias(&args, schema)?;

    let value = Value::Object(args);
    validate_schema(&value, schema)?;
    Ok(value)
}
