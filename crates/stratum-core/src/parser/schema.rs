//! Structural schema validation and the spec-version registry.
//!
//! A hand-rolled structural check is preferred here over a general
//! JSON-Schema engine, since the document shape is small and fixed: each
//! known version gets one function that walks a `serde_yaml::Value` tree and
//! returns the single most specific `ValidationError` it finds, or `Ok(())`.

use std::collections::HashSet;

use serde_yaml::Value;

use crate::error::ValidationError;

/// All spec-format versions this build understands. Adding a new version is
/// exactly one match arm here plus one entry in `KNOWN_VERSIONS`.
pub const KNOWN_VERSIONS: &[&str] = &["0.1"];

/// Validate `tree` (the parsed-but-untyped document) against the schema for
/// `version`. Returns the single most specific violation found, depth-first,
/// left-to-right.
pub fn validate_structure(version: &str, tree: &Value) -> Result<(), ValidationError> {
    match version {
        "0.1" => validate_v0_1(tree),
        other => Err(ValidationError::new(
            "version",
            format!("unknown spec version '{other}'"),
        )
        .with_suggestion(format!("known versions: {}", KNOWN_VERSIONS.join(", ")))),
    }
}

const TOP_LEVEL_FIELDS: &[&str] = &["version", "contracts", "functions", "flows"];
const CONTRACT_FIELD_KEYS: &[&str] = &["type"];
const PRIMITIVE_TYPES: &[&str] = &["string", "number", "integer", "boolean"];
const FUNCTION_MODES: &[&str] = &["infer", "compute"];
const FUNCTION_FIELDS: &[&str] = &[
    "mode", "intent", "input", "output", "ensure", "retries", "model",
];
const FLOW_FIELDS: &[&str] = &["input", "output", "steps"];
const STEP_FIELDS: &[&str] = &["id", "function", "inputs", "depends_on"];

fn validate_v0_1(tree: &Value) -> Result<(), ValidationError> {
    let root = as_mapping(tree, "")?;

    reject_additional(root, TOP_LEVEL_FIELDS, "")?;
    require_scalar_string(root, "version", "")?;

    let contracts = require_mapping(root, "contracts", "")?;
    for (name, def) in contracts {
        let name = scalar_key(name, "contracts")?;
        validate_contract(def, &format!("contracts.{name}"))?;
    }

    let functions = require_mapping(root, "functions", "")?;
    for (name, def) in functions {
        let name = scalar_key(name, "functions")?;
        validate_function(def, &format!("functions.{name}"))?;
    }

    let flows = require_mapping(root, "flows", "")?;
    for (name, def) in flows {
        let name = scalar_key(name, "flows")?;
        validate_flow(def, &format!("flows.{name}"))?;
    }

    Ok(())
}

fn validate_contract(def: &Value, path: &str) -> Result<(), ValidationError> {
    let fields = as_mapping(def, path)?;
    validate_typed_field_map(fields, path)
}

/// Validate a `field name -> {type: <primitive>}` map, the shape shared by
/// contract field declarations and function/flow `input` maps.
fn validate_typed_field_map(
    fields: &serde_yaml::Mapping,
    path: &str,
) -> Result<(), ValidationError> {
    for (field_name, field_def) in fields {
        let field_name = scalar_key(field_name, path)?;
        let field_path = format!("{path}.{field_name}");
        let field_map = as_mapping(field_def, &field_path)?;
        reject_additional(field_map, CONTRACT_FIELD_KEYS, &field_path)?;
        let type_value = require_scalar_string(field_map, "type", &field_path)?;
        require_enum(&type_value, PRIMITIVE_TYPES, &format!("{field_path}.type"))?;
    }
    Ok(())
}

fn validate_function(def: &Value, path: &str) -> Result<(), ValidationError> {
    let map = as_mapping(def, path)?;
    reject_additional(map, FUNCTION_FIELDS, path)?;

    let mode = require_scalar_string(map, "mode", path)?;
    require_enum(&mode, FUNCTION_MODES, &format!("{path}.mode"))?;

    let intent = require_scalar_string(map, "intent", path)?;
    if intent.trim().is_empty() {
        return Err(ValidationError::new(
            format!("{path}.intent"),
            "intent must be a non-empty string",
        ));
    }

    let input = require_mapping(map, "input", path)?;
    validate_typed_field_map(input, &format!("{path}.input"))?;

    require_scalar_string(map, "output", path)?;

    if let Some(ensure) = map.get(&Value::from("ensure")) {
        let items = as_sequence(ensure, &format!("{path}.ensure"))?;
        for (i, item) in items.iter().enumerate() {
            scalar_string(item, &format!("{path}.ensure[{i}]"))?;
        }
    }

    if let Some(retries) = map.get(&Value::from("retries")) {
        let n = retries.as_i64().ok_or_else(|| {
            ValidationError::new(format!("{path}.retries"), "retries must be an integer")
        })?;
        if n < 0 {
            return Err(ValidationError::new(
                format!("{path}.retries"),
                "retries must be a non-negative integer",
            ));
        }
    }

    if let Some(model) = map.get(&Value::from("model")) {
        scalar_string(model, &format!("{path}.model"))?;
    }

    Ok(())
}

fn validate_flow(def: &Value, path: &str) -> Result<(), ValidationError> {
    let map = as_mapping(def, path)?;
    reject_additional(map, FLOW_FIELDS, path)?;

    let input = require_mapping(map, "input", path)?;
    validate_typed_field_map(input, &format!("{path}.input"))?;

    require_scalar_string(map, "output", path)?;

    let steps_value = map.get(&Value::from("steps")).ok_or_else(|| {
        ValidationError::new(format!("{path}.steps"), "missing required field 'steps'")
            .with_suggestion("add required field 'steps'")
    })?;
    let steps = as_sequence(steps_value, &format!("{path}.steps"))?;
    if steps.is_empty() {
        return Err(ValidationError::new(
            format!("{path}.steps"),
            "steps must contain at least one entry",
        ));
    }

    let mut seen_ids = HashSet::new();
    for (i, step) in steps.iter().enumerate() {
        let step_path = format!("{path}.steps[{i}]");
        let id = validate_step(step, &step_path)?;
        if !seen_ids.insert(id.clone()) {
            return Err(ValidationError::new(
                format!("{step_path}.id"),
                format!("duplicate step id '{id}' within flow"),
            ));
        }
    }

    Ok(())
}

fn validate_step(def: &Value, path: &str) -> Result<String, ValidationError> {
    let map = as_mapping(def, path)?;
    reject_additional(map, STEP_FIELDS, path)?;

    let id = require_scalar_string(map, "id", path)?;
    require_scalar_string(map, "function", path)?;

    let inputs = require_mapping(map, "inputs", path)?;
    for (param, value) in inputs {
        let param = scalar_key(param, path)?;
        scalar_string(value, &format!("{path}.inputs.{param}"))?;
    }

    if let Some(depends_on) = map.get(&Value::from("depends_on")) {
        let items = as_sequence(depends_on, &format!("{path}.depends_on"))?;
        for (i, item) in items.iter().enumerate() {
            scalar_string(item, &format!("{path}.depends_on[{i}]"))?;
        }
    }

    Ok(id)
}

// ---- small structural helpers -------------------------------------------

fn as_mapping<'a>(value: &'a Value, path: &str) -> Result<&'a serde_yaml::Mapping, ValidationError> {
    value.as_mapping().ok_or_else(|| {
        ValidationError::new(
            empty_to_root(path),
            "expected a mapping (key: value block) at this node",
        )
    })
}

fn as_sequence<'a>(value: &'a Value, path: &str) -> Result<&'a Vec<Value>, ValidationError> {
    value
        .as_sequence()
        .ok_or_else(|| ValidationError::new(path, "expected a list at this node"))
}

fn scalar_key(key: &Value, path: &str) -> Result<String, ValidationError> {
    key.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ValidationError::new(empty_to_root(path), "expected a string key"))
}

fn scalar_string(value: &Value, path: &str) -> Result<String, ValidationError> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ValidationError::new(path, "expected a string value"))
}

fn require_scalar_string(
    map: &serde_yaml::Mapping,
    field: &str,
    path: &str,
) -> Result<String, ValidationError> {
    let field_path = join(path, field);
    let value = map.get(&Value::from(field)).ok_or_else(|| {
        ValidationError::new(field_path.clone(), format!("missing required field '{field}'"))
            .with_suggestion(format!("add required field '{field}'"))
    })?;
    scalar_string(value, &field_path)
}

fn require_mapping<'a>(
    map: &'a serde_yaml::Mapping,
    field: &str,
    path: &str,
) -> Result<&'a serde_yaml::Mapping, ValidationError> {
    let field_path = join(path, field);
    let value = map.get(&Value::from(field)).ok_or_else(|| {
        ValidationError::new(field_path.clone(), format!("missing required field '{field}'"))
            .with_suggestion(format!("add required field '{field}'"))
    })?;
    as_mapping(value, &field_path)
}

fn require_enum(value: &str, allowed: &[&str], path: &str) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new(
            path,
            format!("'{value}' is not one of the allowed values"),
        )
        .with_suggestion(format!("use one of: {}", allowed.join(", "))))
    }
}

fn reject_additional(
    map: &serde_yaml::Mapping,
    allowed: &[&str],
    path: &str,
) -> Result<(), ValidationError> {
    for key in map.keys() {
        let Some(key_str) = key.as_str() else {
            return Err(ValidationError::new(empty_to_root(path), "expected a string key"));
        };
        if !allowed.contains(&key_str) {
            return Err(ValidationError::new(
                join(path, key_str),
                format!("unrecognized field '{key_str}'"),
            )
            .with_suggestion("remove unrecognized fields"));
        }
    }
    Ok(())
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

fn empty_to_root(path: &str) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn accepts_minimal_valid_doc() {
        let doc = parse(
            r#"
version: "0.1"
contracts:
  Summary:
    text: {type: string}
functions:
  summarize:
    mode: infer
    intent: "Summarize the input"
    input:
      text: {type: string}
    output: Summary
flows:
  main:
    input:
      text: {type: string}
    output: Summary
    steps:
      - id: s1
        function: summarize
        inputs:
          text: "$.input.text"
"#,
        );
        assert!(validate_structure("0.1", &doc).is_ok());
    }

    #[test]
    fn rejects_unknown_version() {
        let doc = parse("version: \"9.9\"\ncontracts: {}\nfunctions: {}\nflows: {}\n");
        let err = validate_structure("9.9", &doc).unwrap_err();
        assert!(err.suggestion.unwrap().contains("0.1"));
    }

    #[test]
    fn rejects_additional_properties() {
        let doc = parse("version: \"0.1\"\ncontracts: {}\nfunctions: {}\nflows: {}\nextra: true\n");
        let err = validate_structure("0.1", &doc).unwrap_err();
        assert_eq!(err.path, "extra");
        assert_eq!(err.suggestion.as_deref(), Some("remove unrecognized fields"));
    }

    #[test]
    fn rejects_empty_steps() {
        let doc = parse(
            r#"
version: "0.1"
contracts: {}
functions: {}
flows:
  main:
    input: {}
    output: X
    steps: []
"#,
        );
        let err = validate_structure("0.1", &doc).unwrap_err();
        assert_eq!(err.path, "flows.main.steps");
    }

    #[test]
    fn rejects_bad_enum() {
        let doc = parse(
            r#"
version: "0.1"
contracts: {}
functions:
  f:
    mode: bogus
    intent: "x"
    input: {}
    output: X
flows: {}
"#,
        );
        let err = validate_structure("0.1", &doc).unwrap_err();
        assert_eq!(err.path, "functions.f.mode");
        assert!(err.suggestion.unwrap().contains("infer"));
    }
}
