//! The `$`-reference resolver.
//!
//! Resolution happens at step dispatch time, never at plan time: a step's
//! inputs are resolved against the flow state as it exists the moment that
//! step is about to be dispatched.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ResolutionError;

const INPUT_PREFIX: &str = "$.input.";
const STEPS_PREFIX: &str = "$.steps.";

/// Resolve a single reference-or-literal string against the current flow
/// inputs and completed step outputs.
///
/// - `$.input.<field>` returns `flow_inputs[field]`.
/// - `$.steps.<id>.output` returns `step_outputs[id]`.
/// - `$.steps.<id>.output.<path>` navigates `output` by dotted path.
/// - Anything else (including strings that merely contain `$`) passes
///   through verbatim as a JSON string literal.
pub fn resolve(
    reference: &str,
    flow_inputs: &HashMap<String, Value>,
    step_outputs: &HashMap<String, Value>,
) -> Result<Value, ResolutionError> {
    if let Some(field) = reference.strip_prefix(INPUT_PREFIX) {
        return flow_inputs
            .get(field)
            .cloned()
            .ok_or_else(|| ResolutionError::UnknownInput {
                field: field.to_string(),
                reference: reference.to_string(),
            });
    }

    if let Some(rest) = reference.strip_prefix(STEPS_PREFIX) {
        return resolve_step_reference(reference, rest, step_outputs);
    }

    if reference.starts_with('$') {
        return Err(ResolutionError::Malformed {
            reference: reference.to_string(),
        });
    }

    Ok(Value::String(reference.to_string()))
}

fn resolve_step_reference(
    full_reference: &str,
    rest: &str,
    step_outputs: &HashMap<String, Value>,
) -> Result<Value, ResolutionError> {
    // `rest` is `<id>.output` or `<id>.output.<path>`.
    let mut parts = rest.splitn(3, '.');
    let step_id = parts.next().unwrap_or_default();
    let marker = parts.next();
    let path = parts.next();

    if step_id.is_empty() || marker != Some("output") {
        return Err(ResolutionError::Malformed {
            reference: full_reference.to_string(),
        });
    }

    let output = step_outputs
        .get(step_id)
        .ok_or_else(|| ResolutionError::StepNotReady {
            step_id: step_id.to_string(),
            reference: full_reference.to_string(),
        })?;

    match path {
        None => Ok(output.clone()),
        Some(path) => navigate(output, path).ok_or_else(|| ResolutionError::PathNotFound {
            step_id: step_id.to_string(),
            path: path.to_string(),
            reference: full_reference.to_string(),
        }),
    }
}

/// Navigate a dotted path over a JSON value, using key lookup on objects and
/// index lookup on arrays for purely-numeric segments.
fn navigate(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Extract the step id referenced by a `$.steps.<id>...` input binding, if
/// the string is such a reference. Used by the scheduler to derive implicit
/// dependency edges without performing full resolution.
pub fn referenced_step_id(binding: &str) -> Option<&str> {
    let rest = binding.strip_prefix(STEPS_PREFIX)?;
    let id = rest.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("text".to_string(), json!("hello"));
        m
    }

    fn outputs() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("s1".to_string(), json!({"x": 1, "nested": {"y": 2}}));
        m
    }

    #[test]
    fn resolves_flow_input() {
        let v = resolve("$.input.text", &inputs(), &outputs()).unwrap();
        assert_eq!(v, json!("hello"));
    }

    #[test]
    fn unknown_input_errors() {
        let err = resolve("$.input.missing", &inputs(), &outputs()).unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownInput { .. }));
    }

    #[test]
    fn resolves_step_output_whole() {
        let v = resolve("$.steps.s1.output", &inputs(), &outputs()).unwrap();
        assert_eq!(v, json!({"x": 1, "nested": {"y": 2}}));
    }

    #[test]
    fn resolves_step_output_path() {
        let v = resolve("$.steps.s1.output.nested.y", &inputs(), &outputs()).unwrap();
        assert_eq!(v, json!(2));
    }

    #[test]
    fn step_not_ready_errors() {
        let err = resolve("$.steps.s2.output", &inputs(), &outputs()).unwrap_err();
        assert!(matches!(err, ResolutionError::StepNotReady { .. }));
    }

    #[test]
    fn path_not_found_errors() {
        let err = resolve("$.steps.s1.output.missing", &inputs(), &outputs()).unwrap_err();
        assert!(matches!(err, ResolutionError::PathNotFound { .. }));
    }

    #[test]
    fn malformed_dollar_errors() {
        let err = resolve("$.bogus.thing", &inputs(), &outputs()).unwrap_err();
        assert!(matches!(err, ResolutionError::Malformed { .. }));
    }

    #[test]
    fn literal_passes_through() {
        let v = resolve("plain-literal", &inputs(), &outputs()).unwrap();
        assert_eq!(v, json!("plain-literal"));
    }

    #[test]
    fn referenced_step_id_extracts_id() {
        assert_eq!(referenced_step_id("$.steps.s1.output.x"), Some("s1"));
        assert_eq!(referenced_step_id("$.input.text"), None);
        assert_eq!(referenced_step_id("literal"), None);
    }
}
