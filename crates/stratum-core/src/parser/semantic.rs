//! Stage 5: reference-integrity checks over the typed IR.
//!
//! Deliberately does *not* check `$.steps.<id>` references inside step input
//! bindings — those are enforced implicitly by the scheduler and the
//! reference resolver (forward/unknown references surface there instead).

use crate::error::SemanticError;
use crate::ir::Spec;

pub fn validate_semantics(spec: &Spec) -> Result<(), SemanticError> {
    for function in spec.functions.values() {
        if !spec.contracts.contains_key(&function.output) {
            return Err(SemanticError::new(
                format!("functions.{}.output", function.name),
                format!(
                    "function '{}' declares output contract '{}', which is not defined",
                    function.name, function.output
                ),
            ));
        }
    }

    for flow in spec.flows.values() {
        if !spec.contracts.contains_key(&flow.output) {
            return Err(SemanticError::new(
                format!("flows.{}.output", flow.name),
                format!(
                    "flow '{}' declares output contract '{}', which is not defined",
                    flow.name, flow.output
                ),
            ));
        }

        for (index, step) in flow.steps.iter().enumerate() {
            if !spec.functions.contains_key(&step.function) {
                return Err(SemanticError::new(
                    format!("flows.{}.steps[{}].function", flow.name, index),
                    format!(
                        "step '{}' references undefined function '{}'",
                        step.id, step.function
                    ),
                ));
            }

            for dep in &step.depends_on {
                let earlier = flow.steps[..index].iter().any(|s| &s.id == dep);
                if !earlier {
                    return Err(SemanticError::new(
                        format!("flows.{}.steps[{}].depends_on", flow.name, index),
                        format!(
                            "step '{}' depends_on '{}', which is not an earlier step in flow '{}'",
                            step.id, dep, flow.name
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}
