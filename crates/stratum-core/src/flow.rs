//! The per-flow state machine and the process-wide flow registry.
//!
//! `FlowState` is the authoritative runtime record described in the
//! controller spec's data model: a topologically ordered step cursor,
//! accumulated step outputs, attempt counters, and an append-only audit
//! trace. `FlowRegistry` owns every live `FlowState` and is the only code
//! path permitted to mutate one — the protocol front-end in `stratum-cli`
//! serializes all access to it behind a single lock, so every method here
//! assumes exclusive `&mut self` access and never has to reason about
//! concurrent mutation itself.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ExecutionError, StratumError};
use crate::ir::Spec;
use crate::resolve;
use crate::sandbox;
use crate::schedule;

/// Final disposition of one step, recorded once in the audit trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    RetryExhausted,
    /// The step itself completed, but preparing the *next* step's dispatch
    /// failed (e.g. an unresolvable `$`-reference not caught by semantic
    /// validation). The flow aborts; `step_id` on this record names the step
    /// whose dispatch could not be built, not the one that just finished.
    DispatchFailed,
}

/// An append-only audit entry. Never rewritten once pushed.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step_id: String,
    pub function_name: String,
    pub attempts: u32,
    pub dispatched_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: StepOutcome,
}

/// One postcondition (or synthetic contract-shape) violation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub expression: String,
    pub failed_to_evaluate: bool,
}

impl Violation {
    /// The verbatim text the protocol front-end puts on the wire,
    /// distinguishing "evaluated false" from "failed to evaluate".
    pub fn display_text(&self) -> String {
        if self.failed_to_evaluate {
            format!("{} (failed to evaluate)", self.expression)
        } else {
            self.expression.clone()
        }
    }
}

/// Everything the protocol front-end needs to build a dispatch envelope for
/// one step. `flow_id` is filled in by whichever `FlowRegistry` method
/// produced this value.
#[derive(Debug, Clone)]
pub struct StepDispatch {
    pub flow_id: String,
    pub step_id: String,
    pub function: String,
    pub intent: String,
    pub inputs: HashMap<String, Value>,
    pub output_contract: String,
    pub output_fields: HashMap<String, String>,
    pub ensure: Vec<String>,
    pub retries_remaining: u32,
}

/// Outcome of a `plan` request (or the step_done advance that reaches the
/// terminal step).
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    ExecuteStep(StepDispatch),
    Complete { output: Value },
}

/// Outcome of a `step_done` request.
#[derive(Debug, Clone)]
pub enum StepDoneOutcome {
    ExecuteStep(StepDispatch),
    EnsureFailed {
        step_id: String,
        violations: Vec<Violation>,
        retries_remaining: u32,
    },
    Complete {
        output: Value,
    },
    Failed {
        step_id: String,
        violations: Vec<Violation>,
        final_flag: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dispatching,
    AwaitingResult,
    Completed,
    Failed,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Dispatching => "dispatching",
            Phase::AwaitingResult => "awaiting_result",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

/// The authoritative runtime record for one in-flight or terminated flow.
pub struct FlowState {
    id: String,
    spec: Arc<Spec>,
    flow_name: String,
    order: Vec<String>,
    cursor: usize,
    phase: Phase,
    flow_inputs: HashMap<String, Value>,
    step_outputs: HashMap<String, Value>,
    attempts: HashMap<String, u32>,
    first_dispatch_at: HashMap<String, DateTime<Utc>>,
    records: Vec<StepRecord>,
    current_step: Option<String>,
}

impl FlowState {
    /// Create a new flow state: order the steps (§4.4), then immediately
    /// produce the first dispatch (or `Complete` for a zero-step flow).
    fn create(
        spec: Arc<Spec>,
        flow_name: &str,
        flow_inputs: HashMap<String, Value>,
    ) -> Result<(Self, DispatchOutcome), StratumError> {
        let flow_def = spec
            .flow(flow_name)
            .ok_or_else(|| StratumError::Execution(ExecutionError::UnknownFlowName {
                flow_name: flow_name.to_string(),
            }))?;

        let order = schedule::order(flow_def).map_err(StratumError::Execution)?;

        let mut state = FlowState {
            id: Uuid::new_v4().to_string(),
            spec: Arc::clone(&spec),
            flow_name: flow_name.to_string(),
            order,
            cursor: 0,
            phase: Phase::Dispatching,
            flow_inputs,
            step_outputs: HashMap::new(),
            attempts: HashMap::new(),
            first_dispatch_at: HashMap::new(),
            records: Vec::new(),
            current_step: None,
        };

        let outcome = state.advance_to_next_dispatch()?;
        Ok((state, outcome))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Move the cursor forward to either the next step's dispatch or, if the
    /// cursor has run off the end, the terminal `complete` outcome. Does not
    /// itself advance the cursor past a failure or a pending result — callers
    /// only invoke this right after construction or right after a successful
    /// `step_done`.
    fn advance_to_next_dispatch(&mut self) -> Result<DispatchOutcome, StratumError> {
        if self.cursor >= self.order.len() {
            self.phase = Phase::Completed;
            self.current_step = None;
            let output = self.terminal_output();
            return Ok(DispatchOutcome::Complete { output });
        }

        self.phase = Phase::Dispatching;
        let step_id = self.order[self.cursor].clone();
        let dispatch = self.build_dispatch(&step_id)?;
        self.first_dispatch_at
            .entry(step_id.clone())
            .or_insert_with(Utc::now);
        self.current_step = Some(step_id);
        self.phase = Phase::AwaitingResult;
        Ok(DispatchOutcome::ExecuteStep(dispatch))
    }

    fn build_dispatch(&self, step_id: &str) -> Result<StepDispatch, StratumError> {
        let flow_def = self.spec.flow(&self.flow_name).expect("flow exists");
        let step = flow_def.step(step_id).expect("step exists in flow");
        let function = self.spec.function(&step.function).ok_or_else(|| {
            StratumError::Execution(ExecutionError::UnknownFunction {
                step: step_id.to_string(),
                function: step.function.clone(),
            })
        })?;

        let mut inputs = HashMap::with_capacity(step.inputs.len());
        for (param, binding) in &step.inputs {
            let value = resolve::resolve(binding, &self.flow_inputs, &self.step_outputs)
                .map_err(crate::error::StratumError::Resolution)?;
            inputs.insert(param.clone(), value);
        }

        let output_contract = self.spec.contract(&function.output).ok_or_else(|| {
            StratumError::internal(format!(
                "function '{}' output contract '{}' missing after semantic validation",
                function.name, function.output
            ))
        })?;
        let output_fields = output_contract
            .fields
            .iter()
            .map(|(name, ty)| (name.clone(), ty.as_str().to_string()))
            .collect();

        let attempts_so_far = *self.attempts.get(step_id).unwrap_or(&0);
        let retries_remaining = function.max_attempts().saturating_sub(attempts_so_far);

        Ok(StepDispatch {
            flow_id: self.id.clone(),
            step_id: step_id.to_string(),
            function: function.name.clone(),
            intent: function.intent.clone(),
            inputs,
            output_contract: function.output.clone(),
            output_fields,
            ensure: function.ensure.clone(),
            retries_remaining,
        })
    }

    /// Terminal output: the last step's output, or `Value::Null` for a
    /// zero-step flow (there is no step output to surface).
    fn terminal_output(&self) -> Value {
        self.order
            .last()
            .and_then(|id| self.step_outputs.get(id))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Handle a `step_done` report for `step_id`.
    pub fn report_step_done(
        &mut self,
        step_id: &str,
        result: Value,
    ) -> Result<StepDoneOutcome, StratumError> {
        if self.phase != Phase::AwaitingResult {
            return Err(StratumError::Execution(ExecutionError::UnexpectedResult {
                flow_id: self.id.clone(),
                state: self.phase.label().to_string(),
            }));
        }

        let expected = self.current_step.clone().unwrap_or_default();
        if expected != step_id {
            return Err(StratumError::Execution(ExecutionError::StepMismatch {
                expected,
                reported: step_id.to_string(),
            }));
        }

        let attempts = {
            let counter = self.attempts.entry(step_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        let flow_def = self.spec.flow(&self.flow_name).expect("flow exists");
        let step = flow_def.step(step_id).expect("step exists");
        let function = self
            .spec
            .function(&step.function)
            .expect("function exists, checked at dispatch time");

        let mut violations = self.check_contract_shape(function, &result);
        violations.extend(self.evaluate_postconditions(function, &result));

        let dispatched_at = *self
            .first_dispatch_at
            .get(step_id)
            .unwrap_or(&Utc::now());

        if violations.is_empty() {
            self.records.push(StepRecord {
                step_id: step_id.to_string(),
                function_name: function.name.clone(),
                attempts,
                dispatched_at,
                completed_at: Utc::now(),
                outcome: StepOutcome::Completed,
            });
            self.step_outputs.insert(step_id.to_string(), result);
            self.current_step = None;
            self.cursor += 1;

            return match self.advance_to_next_dispatch() {
                Ok(DispatchOutcome::ExecuteStep(d)) => Ok(StepDoneOutcome::ExecuteStep(d)),
                Ok(DispatchOutcome::Complete { output }) => {
                    Ok(StepDoneOutcome::Complete { output })
                }
                // Dispatch prep for the next step failed (e.g. a `$`-reference
                // semantic validation didn't catch). §7: abort the flow
                // rather than leave it stuck mid-`Dispatching`.
                Err(err) => {
                    let next_step_id = self.order.get(self.cursor).cloned().unwrap_or_default();
                    self.records.push(StepRecord {
                        step_id: next_step_id,
                        function_name: String::new(),
                        attempts: 0,
                        dispatched_at: Utc::now(),
                        completed_at: Utc::now(),
                        outcome: StepOutcome::DispatchFailed,
                    });
                    self.phase = Phase::Failed;
                    Err(err)
                }
            };
        }

        if attempts <= function.retries {
            let retries_remaining = function.max_attempts().saturating_sub(attempts);
            return Ok(StepDoneOutcome::EnsureFailed {
                step_id: step_id.to_string(),
                violations,
                retries_remaining,
            });
        }

        self.records.push(StepRecord {
            step_id: step_id.to_string(),
            function_name: function.name.clone(),
            attempts,
            dispatched_at,
            completed_at: Utc::now(),
            outcome: StepOutcome::RetryExhausted,
        });
        self.phase = Phase::Failed;
        self.current_step = None;

        Ok(StepDoneOutcome::Failed {
            step_id: step_id.to_string(),
            violations,
            final_flag: true,
        })
    }

    /// §4.6: every field declared on the function's output contract must be
    /// present in `result` with a conforming type. A zero-field contract
    /// accepts any object (documented open question).
    fn check_contract_shape(
        &self,
        function: &crate::ir::FunctionDef,
        result: &Value,
    ) -> Vec<Violation> {
        let Some(contract) = self.spec.contract(&function.output) else {
            return Vec::new();
        };

        let mut violations = Vec::new();
        for (field_name, expected_type) in &contract.fields {
            let ok = match result.get(field_name) {
                Some(value) => expected_type.accepts(value),
                None => false,
            };
            if !ok {
                let present = result.get(field_name).is_some();
                let kind = if present { "wrong type" } else { "missing" };
                violations.push(Violation {
                    expression: format!("contract: field '{field_name}' {kind}"),
                    failed_to_evaluate: false,
                });
            }
        }
        violations
    }

    fn evaluate_postconditions(
        &self,
        function: &crate::ir::FunctionDef,
        result: &Value,
    ) -> Vec<Violation> {
        let mut violations = Vec::new();
        for expr_text in &function.ensure {
            // Compiled once already at parse time (parser rejects
            // uncompilable expressions before any step runs); recompiling
            // here is cheap and keeps this function pure and stateless.
            match sandbox::compile_ensure(expr_text) {
                Ok(compiled) => match compiled.evaluate(result) {
                    Ok(true) => {}
                    Ok(false) => violations.push(Violation {
                        expression: expr_text.clone(),
                        failed_to_evaluate: false,
                    }),
                    Err(_) => violations.push(Violation {
                        expression: expr_text.clone(),
                        failed_to_evaluate: true,
                    }),
                },
                Err(_) => violations.push(Violation {
                    expression: expr_text.clone(),
                    failed_to_evaluate: true,
                }),
            }
        }
        violations
    }

    pub fn audit(&self) -> &[StepRecord] {
        &self.records
    }
}

/// Owns every live flow. Single owner, serialized access — see module docs.
#[derive(Default)]
pub struct FlowRegistry {
    flows: HashMap<String, FlowState>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self {
            flows: HashMap::new(),
        }
    }

    /// `plan`: order the flow's steps, create its state, and produce the
    /// first dispatch envelope (or an immediate `complete` for zero steps).
    pub fn plan(
        &mut self,
        spec: Arc<Spec>,
        flow_name: &str,
        inputs: HashMap<String, Value>,
    ) -> Result<DispatchOutcome, StratumError> {
        let (state, outcome) = FlowState::create(spec, flow_name, inputs)?;
        self.flows.insert(state.id().to_string(), state);
        Ok(outcome)
    }

    pub fn step_done(
        &mut self,
        flow_id: &str,
        step_id: &str,
        result: Value,
    ) -> Result<StepDoneOutcome, StratumError> {
        let state = self.flows.get_mut(flow_id).ok_or_else(|| {
            StratumError::Execution(ExecutionError::UnknownFlow {
                flow_id: flow_id.to_string(),
            })
        })?;
        state.report_step_done(step_id, result)
    }

    pub fn audit(&self, flow_id: &str) -> Result<&[StepRecord], StratumError> {
        let state = self.flows.get(flow_id).ok_or_else(|| {
            StratumError::Execution(ExecutionError::UnknownFlow {
                flow_id: flow_id.to_string(),
            })
        })?;
        Ok(state.audit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;
    use serde_json::json;

    fn spec_linear() -> Arc<Spec> {
        let mut contracts = HashMap::new();
        let mut out_fields = HashMap::new();
        out_fields.insert("x".to_string(), PrimitiveType::Integer);
        contracts.insert(
            "Out".to_string(),
            Contract {
                name: "Out".to_string(),
                fields: out_fields,
            },
        );

        let mut functions = HashMap::new();
        functions.insert(
            "f".to_string(),
            FunctionDef {
                name: "f".to_string(),
                mode: FunctionMode::Compute,
                intent: "do work".to_string(),
                input: HashMap::new(),
                output: "Out".to_string(),
                ensure: vec![],
                retries: 3,
                model: None,
            },
        );

        let steps = vec![
            StepDef {
                id: "s1".to_string(),
                function: "f".to_string(),
                inputs: HashMap::new(),
                depends_on: vec![],
            },
            StepDef {
                id: "s2".to_string(),
                function: "f".to_string(),
                inputs: [("x".to_string(), "$.steps.s1.output.x".to_string())]
                    .into_iter()
                    .collect(),
                depends_on: vec!["s1".to_string()],
            },
            StepDef {
                id: "s3".to_string(),
                function: "f".to_string(),
                inputs: [("x".to_string(), "$.steps.s2.output.x".to_string())]
                    .into_iter()
                    .collect(),
                depends_on: vec![],
            },
        ];

        let mut flows = HashMap::new();
        flows.insert(
            "main".to_string(),
            FlowDef {
                name: "main".to_string(),
                input: HashMap::new(),
                output: "Out".to_string(),
                steps,
            },
        );

        Arc::new(Spec {
            version: "0.1".to_string(),
            contracts,
            functions,
            flows,
        })
    }

    #[test]
    fn linear_happy_path() {
        let spec = spec_linear();
        let mut registry = FlowRegistry::new();
        let outcome = registry.plan(spec, "main", HashMap::new()).unwrap();
        let DispatchOutcome::ExecuteStep(d1) = outcome else {
            panic!("expected dispatch")
        };
        assert_eq!(d1.step_id, "s1");
        let flow_id = d1.flow_id.clone();

        let r2 = registry
            .step_done(&flow_id, "s1", json!({"x": 1}))
            .unwrap();
        let StepDoneOutcome::ExecuteStep(d2) = r2 else {
            panic!("expected dispatch for s2")
        };
        assert_eq!(d2.step_id, "s2");
        assert_eq!(d2.inputs.get("x").unwrap(), &json!(1));

        let r3 = registry
            .step_done(&flow_id, "s2", json!({"x": 2}))
            .unwrap();
        let StepDoneOutcome::ExecuteStep(d3) = r3 else {
            panic!("expected dispatch for s3")
        };
        assert_eq!(d3.step_id, "s3");

        let r4 = registry
            .step_done(&flow_id, "s3", json!({"x": 3}))
            .unwrap();
        let StepDoneOutcome::Complete { .. } = r4 else {
            panic!("expected complete")
        };

        let trace = registry.audit(&flow_id).unwrap();
        assert_eq!(trace.len(), 3);
        assert!(trace.iter().all(|r| r.attempts == 1));
    }

    fn spec_with_retry(retries: u32) -> Arc<Spec> {
        let mut contracts = HashMap::new();
        contracts.insert(
            "Out".to_string(),
            Contract {
                name: "Out".to_string(),
                fields: HashMap::new(),
            },
        );
        let mut functions = HashMap::new();
        functions.insert(
            "f".to_string(),
            FunctionDef {
                name: "f".to_string(),
                mode: FunctionMode::Infer,
                intent: "score something".to_string(),
                input: HashMap::new(),
                output: "Out".to_string(),
                ensure: vec!["result.score >= 0.7".to_string()],
                retries,
                model: None,
            },
        );
        let mut flows = HashMap::new();
        flows.insert(
            "main".to_string(),
            FlowDef {
                name: "main".to_string(),
                input: HashMap::new(),
                output: "Out".to_string(),
                steps: vec![StepDef {
                    id: "s1".to_string(),
                    function: "f".to_string(),
                    inputs: HashMap::new(),
                    depends_on: vec![],
                }],
            },
        );
        Arc::new(Spec {
            version: "0.1".to_string(),
            contracts,
            functions,
            flows,
        })
    }

    #[test]
    fn postcondition_retry_then_pass() {
        let spec = spec_with_retry(2);
        let mut registry = FlowRegistry::new();
        let outcome = registry.plan(spec, "main", HashMap::new()).unwrap();
        let DispatchOutcome::ExecuteStep(d) = outcome else {
            panic!()
        };
        let flow_id = d.flow_id;

        let r1 = registry
            .step_done(&flow_id, "s1", json!({"score": 0.4}))
            .unwrap();
        match r1 {
            StepDoneOutcome::EnsureFailed {
                violations,
                retries_remaining,
                ..
            } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].expression, "result.score >= 0.7");
                assert_eq!(retries_remaining, 2);
            }
            _ => panic!("expected ensure_failed"),
        }

        let r2 = registry
            .step_done(&flow_id, "s1", json!({"score": 0.9}))
            .unwrap();
        assert!(matches!(r2, StepDoneOutcome::Complete { .. }));

        let trace = registry.audit(&flow_id).unwrap();
        assert_eq!(trace[0].attempts, 2);
        assert_eq!(trace[0].outcome, StepOutcome::Completed);
    }

    #[test]
    fn retry_exhaustion() {
        let spec = spec_with_retry(2);
        let mut registry = FlowRegistry::new();
        let outcome = registry.plan(spec, "main", HashMap::new()).unwrap();
        let DispatchOutcome::ExecuteStep(d) = outcome else {
            panic!()
        };
        let flow_id = d.flow_id;

        let r1 = registry
            .step_done(&flow_id, "s1", json!({"score": 0.1}))
            .unwrap();
        assert!(matches!(
            r1,
            StepDoneOutcome::EnsureFailed {
                retries_remaining: 2,
                ..
            }
        ));

        let r2 = registry
            .step_done(&flow_id, "s1", json!({"score": 0.1}))
            .unwrap();
        assert!(matches!(
            r2,
            StepDoneOutcome::EnsureFailed {
                retries_remaining: 1,
                ..
            }
        ));

        let r3 = registry
            .step_done(&flow_id, "s1", json!({"score": 0.1}))
            .unwrap();
        match r3 {
            StepDoneOutcome::Failed { final_flag, .. } => assert!(final_flag),
            _ => panic!("expected failed"),
        }

        let trace = registry.audit(&flow_id).unwrap();
        assert_eq!(trace[0].attempts, 3);
        assert_eq!(trace[0].outcome, StepOutcome::RetryExhausted);
    }

    #[test]
    fn step_mismatch_is_protocol_error() {
        let spec = spec_linear();
        let mut registry = FlowRegistry::new();
        let outcome = registry.plan(spec, "main", HashMap::new()).unwrap();
        let DispatchOutcome::ExecuteStep(d) = outcome else {
            panic!()
        };
        let err = registry
            .step_done(&d.flow_id, "not-the-current-step", json!({}))
            .unwrap_err();
        assert!(matches!(
            err,
            StratumError::Execution(ExecutionError::StepMismatch { .. })
        ));
    }

    #[test]
    fn unknown_flow_id_is_execution_error() {
        let mut registry = FlowRegistry::new();
        let err = registry.audit("nonexistent").unwrap_err();
        assert!(matches!(
            err,
            StratumError::Execution(ExecutionError::UnknownFlow { .. })
        ));
    }

    #[test]
    fn contract_shape_violation_counts_as_ensure_failed() {
        let spec = spec_linear();
        let mut registry = FlowRegistry::new();
        let outcome = registry.plan(spec, "main", HashMap::new()).unwrap();
        let DispatchOutcome::ExecuteStep(d) = outcome else {
            panic!()
        };
        let r = registry
            .step_done(&d.flow_id, "s1", json!({"x": "not-an-integer"}))
            .unwrap();
        match r {
            StepDoneOutcome::EnsureFailed { violations, .. } => {
                assert!(violations[0].expression.contains("contract: field 'x'"));
            }
            _ => panic!("expected ensure_failed from contract shape check"),
        }
    }

    /// s2 binds `$.steps.s1.output.missing` — a path semantic validation
    /// can't catch, since it only checks that `s1` exists, not its shape.
    fn spec_with_unresolvable_binding() -> Arc<Spec> {
        let mut contracts = HashMap::new();
        contracts.insert(
            "Out".to_string(),
            Contract {
                name: "Out".to_string(),
                fields: HashMap::new(),
            },
        );
        let mut functions = HashMap::new();
        functions.insert(
            "f".to_string(),
            FunctionDef {
                name: "f".to_string(),
                mode: FunctionMode::Compute,
                intent: "do work".to_string(),
                input: HashMap::new(),
                output: "Out".to_string(),
                ensure: vec![],
                retries: 3,
                model: None,
            },
        );
        let steps = vec![
            StepDef {
                id: "s1".to_string(),
                function: "f".to_string(),
                inputs: HashMap::new(),
                depends_on: vec![],
            },
            StepDef {
                id: "s2".to_string(),
                function: "f".to_string(),
                inputs: [(
                    "x".to_string(),
                    "$.steps.s1.output.missing".to_string(),
                )]
                .into_iter()
                .collect(),
                depends_on: vec!["s1".to_string()],
            },
        ];
        let mut flows = HashMap::new();
        flows.insert(
            "main".to_string(),
            FlowDef {
                name: "main".to_string(),
                input: HashMap::new(),
                output: "Out".to_string(),
                steps,
            },
        );
        Arc::new(Spec {
            version: "0.1".to_string(),
            contracts,
            functions,
            flows,
        })
    }

    #[test]
    fn dispatch_prep_failure_aborts_flow_with_audit_record() {
        let spec = spec_with_unresolvable_binding();
        let mut registry = FlowRegistry::new();
        let outcome = registry.plan(spec, "main", HashMap::new()).unwrap();
        let DispatchOutcome::ExecuteStep(d1) = outcome else {
            panic!("expected dispatch")
        };
        let flow_id = d1.flow_id.clone();

        let err = registry
            .step_done(&flow_id, "s1", json!({}))
            .unwrap_err();
        assert!(matches!(
            err,
            StratumError::Resolution(crate::error::ResolutionError::PathNotFound { .. })
        ));

        let trace = registry.audit(&flow_id).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].step_id, "s1");
        assert_eq!(trace[0].outcome, StepOutcome::Completed);
        assert_eq!(trace[1].step_id, "s2");
        assert_eq!(trace[1].outcome, StepOutcome::DispatchFailed);

        let err2 = registry
            .step_done(&flow_id, "s2", json!({}))
            .unwrap_err();
        assert!(matches!(
            err2,
            StratumError::Execution(ExecutionError::UnexpectedResult { .. })
        ));
    }
}
