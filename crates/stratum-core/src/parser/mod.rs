//! IR parser and schema validator.
//!
//! `parse_and_validate` runs the five stages described in the controller
//! spec: text -> tree, version select, structural schema validation,
//! structural -> typed IR, and semantic validation. Each stage produces a
//! distinct error class; the function is pure and idempotent.

mod semantic;
pub mod schema;

use std::collections::HashMap;

use serde_yaml::Value;

use crate::error::{ParseError, StratumError, ValidationError};
use crate::ir::{Contract, FlowDef, FunctionDef, FunctionMode, PrimitiveType, Spec, StepDef};

const DEFAULT_RETRIES: u32 = 3;

/// Parse and fully validate a spec document, producing a typed `Spec` or the
/// first error encountered across all five stages.
pub fn parse_and_validate(raw_text: &str) -> Result<Spec, StratumError> {
    let tree: Value = serde_yaml::from_str(raw_text).map_err(|e| {
        StratumError::Parse(ParseError {
            message: e.to_string(),
        })
    })?;

    let root = tree.as_mapping().ok_or_else(|| {
        StratumError::Validation(ValidationError::new(
            "$",
            "expected a mapping at the document root",
        ))
    })?;

    let version = root
        .get(&Value::from("version"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            StratumError::Validation(
                ValidationError::new("version", "missing required field 'version'")
                    .with_suggestion(format!(
                        "known versions: {}",
                        schema::KNOWN_VERSIONS.join(", ")
                    )),
            )
        })?
        .to_string();

    if !schema::KNOWN_VERSIONS.contains(&version.as_str()) {
        return Err(StratumError::Validation(
            ValidationError::new("version", format!("unknown spec version '{version}'"))
                .with_suggestion(format!(
                    "known versions: {}",
                    schema::KNOWN_VERSIONS.join(", ")
                )),
        ));
    }

    schema::validate_structure(&version, &tree).map_err(StratumError::Validation)?;

    let spec = build_ir(&version, root)?;

    semantic::validate_semantics(&spec).map_err(StratumError::Semantic)?;

    Ok(spec)
}

fn build_ir(version: &str, root: &serde_yaml::Mapping) -> Result<Spec, StratumError> {
    let contracts = build_contracts(get_mapping(root, "contracts"))?;
    let functions = build_functions(get_mapping(root, "functions"))?;
    let flows = build_flows(get_mapping(root, "flows"))?;

    Ok(Spec {
        version: version.to_string(),
        contracts,
        functions,
        flows,
    })
}

fn get_mapping(root: &serde_yaml::Mapping, field: &str) -> &serde_yaml::Mapping {
    root.get(&Value::from(field))
        .and_then(|v| v.as_mapping())
        .expect("schema validation already guaranteed this field is a mapping")
}

/// Build a `field name -> PrimitiveType` map from the `{type: <primitive>}`
/// shape shared by contract field declarations and function/flow `input`
/// maps; schema validation already guaranteed this shape.
fn build_typed_field_map(map: &serde_yaml::Mapping) -> HashMap<String, PrimitiveType> {
    let mut fields = HashMap::new();
    for (field_name, field_def) in map {
        let field_name = field_name.as_str().unwrap().to_string();
        let type_str = field_def
            .as_mapping()
            .and_then(|m| m.get(&Value::from("type")))
            .and_then(|v| v.as_str())
            .unwrap();
        let ty = PrimitiveType::parse(type_str).unwrap();
        fields.insert(field_name, ty);
    }
    fields
}

fn build_contracts(
    map: &serde_yaml::Mapping,
) -> Result<HashMap<String, Contract>, StratumError> {
    let mut out = HashMap::new();
    for (name, def) in map {
        let name = name.as_str().unwrap().to_string();
        let field_map = def.as_mapping().unwrap();
        let fields = build_typed_field_map(field_map);
        out.insert(name.clone(), Contract { name, fields });
    }
    Ok(out)
}

fn build_functions(
    map: &serde_yaml::Mapping,
) -> Result<HashMap<String, FunctionDef>, StratumError> {
    let mut out = HashMap::new();
    for (name, def) in map {
        let name = name.as_str().unwrap().to_string();
        let m = def.as_mapping().unwrap();

        let mode = match m.get(&Value::from("mode")).and_then(|v| v.as_str()).unwrap() {
            "infer" => FunctionMode::Infer,
            "compute" => FunctionMode::Compute,
            _ => unreachable!("schema validation already checked the enum"),
        };
        let intent = m
            .get(&Value::from("intent"))
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();

        let input = m
            .get(&Value::from("input"))
            .and_then(|v| v.as_mapping())
            .map(build_typed_field_map)
            .unwrap_or_default();

        let output = m
            .get(&Value::from("output"))
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();

        let ensure = m
            .get(&Value::from("ensure"))
            .and_then(|v| v.as_sequence())
            .map(|seq| {
                seq.iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let retries = m
            .get(&Value::from("retries"))
            .and_then(|v| v.as_i64())
            .map(|n| n as u32)
            .unwrap_or(DEFAULT_RETRIES);

        let model = m
            .get(&Value::from("model"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        out.insert(
            name.clone(),
            FunctionDef {
                name,
                mode,
                intent,
                input,
                output,
                ensure,
                retries,
                model,
            },
        );
    }
    Ok(out)
}

fn build_flows(map: &serde_yaml::Mapping) -> Result<HashMap<String, FlowDef>, StratumError> {
    let mut out = HashMap::new();
    for (name, def) in map {
        let name = name.as_str().unwrap().to_string();
        let m = def.as_mapping().unwrap();

        let input = m
            .get(&Value::from("input"))
            .and_then(|v| v.as_mapping())
            .map(build_typed_field_map)
            .unwrap_or_default();

        let output = m
            .get(&Value::from("output"))
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string();

        let steps_seq = m
            .get(&Value::from("steps"))
            .and_then(|v| v.as_sequence())
            .unwrap();

        let mut steps = Vec::with_capacity(steps_seq.len());
        for step_def in steps_seq {
            steps.push(build_step(step_def));
        }

        out.insert(
            name.clone(),
            FlowDef {
                name,
                input,
                output,
                steps,
            },
        );
    }
    Ok(out)
}

fn build_step(def: &Value) -> StepDef {
    let m = def.as_mapping().unwrap();
    let id = m
        .get(&Value::from("id"))
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let function = m
        .get(&Value::from("function"))
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let mut inputs = HashMap::new();
    if let Some(inputs_map) = m.get(&Value::from("inputs")).and_then(|v| v.as_mapping()) {
        for (param, value) in inputs_map {
            let param = param.as_str().unwrap().to_string();
            let value = value.as_str().unwrap().to_string();
            inputs.insert(param, value);
        }
    }

    let depends_on = m
        .get(&Value::from("depends_on"))
        .and_then(|v| v.as_sequence())
        .map(|seq| {
            seq.iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect()
        })
        .unwrap_or_default();

    StepDef {
        id,
        function,
        inputs,
        depends_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
version: "0.1"
contracts:
  Summary:
    text: {type: string}
    score: {type: number}
functions:
  summarize:
    mode: infer
    intent: "Summarize the input text"
    input:
      text: {type: string}
    output: Summary
    ensure:
      - "result.score >= 0.0"
    retries: 2
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
"#;

    #[test]
    fn parses_valid_spec() {
        let spec = parse_and_validate(VALID).unwrap();
        assert_eq!(spec.version, "0.1");
        assert!(spec.contract("Summary").is_some());
        let f = spec.function("summarize").unwrap();
        assert_eq!(f.retries, 2);
        assert_eq!(f.max_attempts(), 3);
        let flow = spec.flow("main").unwrap();
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn defaults_retries_and_ensure_and_depends_on() {
        let minimal = r#"
version: "0.1"
contracts:
  Out: {}
functions:
  f:
    mode: compute
    intent: "do a thing"
    input: {}
    output: Out
flows:
  main:
    input: {}
    output: Out
    steps:
      - id: s1
        function: f
        inputs: {}
"#;
        let spec = parse_and_validate(minimal).unwrap();
        let f = spec.function("f").unwrap();
        assert_eq!(f.retries, 3);
        assert!(f.ensure.is_empty());
        let step = &spec.flow("main").unwrap().steps[0];
        assert!(step.depends_on.is_empty());
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = parse_and_validate("version: [unterminated").unwrap_err();
        assert!(matches!(err, StratumError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_function_reference() {
        let bad = r#"
version: "0.1"
contracts:
  Out: {}
functions: {}
flows:
  main:
    input: {}
    output: Out
    steps:
      - id: s1
        function: missing
        inputs: {}
"#;
        let err = parse_and_validate(bad).unwrap_err();
        assert!(matches!(err, StratumError::Semantic(_)));
    }

    #[test]
    fn is_idempotent() {
        let a = parse_and_validate(VALID).unwrap();
        let b = parse_and_validate(VALID).unwrap();
        assert_eq!(a.version, b.version);
        assert_eq!(a.functions.len(), b.functions.len());
        assert_eq!(a.flows.len(), b.flows.len());
    }
}
