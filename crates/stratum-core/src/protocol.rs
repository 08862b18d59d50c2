//! The protocol front-end: JSON-RPC envelope types, the four-tool MCP
//! surface, and the `Controller` that routes a decoded tool call to the
//! parser/scheduler/flow-state-machine underneath.
//!
//! This module performs no I/O. `stratum-cli` owns the stdio transport loop
//! (line-delimited JSON-RPC over stdin/stdout) and hands each decoded
//! `JsonRpcRequest` to `Controller::handle_request`; everything here is
//! synchronous and side-effect-free beyond mutating the in-memory
//! `FlowRegistry`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::StratumError;
use crate::flow::{DispatchOutcome, FlowRegistry, StepDispatch, StepDoneOutcome, StepRecord};
use crate::ir::PrimitiveType;
use crate::messages::{CallToolRequest, CallToolResponse, Tool, ToolResult};
use crate::parser;

/// JSON-RPC 2.0 request envelope, as sent by the executor over stdio.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Absent on notifications (e.g. `notifications/initialized`).
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object. `code` follows the JSON-RPC reserved ranges for
/// transport-level faults (parse/invalid-request/method-not-found); domain
/// errors (parse/validation/semantic/... from `StratumError`) are carried as
/// a *successful* JSON-RPC response whose `result` is the `{success: false,
/// error_type, ...}` envelope from §6 — only protocol-framing failures use
/// this JSON-RPC-level error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: Self::METHOD_NOT_FOUND,
            message: format!("unknown method '{method}'"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_PARAMS,
            message: message.into(),
        }
    }
}

/// The uniform error envelope from §6: `{success: false, error_type, path?,
/// message, suggestion?}`. Internal errors never carry `path`/`suggestion`
/// or the underlying cause — only the generic slug and message.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&StratumError> for ErrorEnvelope {
    fn from(err: &StratumError) -> Self {
        Self {
            success: false,
            error_type: err.error_type(),
            path: err.path(),
            message: err.message(),
            suggestion: err.suggestion(),
        }
    }
}

impl ErrorEnvelope {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("ErrorEnvelope always serializes")
    }
}

/// The four tools the executor discovers via `tools/list`.
pub fn tool_catalog() -> Vec<Tool> {
    vec![
        Tool::new(
            "validate",
            "Parse and fully validate a flow spec document without creating any flow state.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": { "spec_text": { "type": "string" } },
            "required": ["spec_text"]
        })),
        Tool::new(
            "plan",
            "Validate a flow spec, topologically order its steps, create a flow, \
             and return the first step to execute.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "spec_text": { "type": "string" },
                "flow_name": { "type": "string" },
                "inputs": { "type": "object" }
            },
            "required": ["spec_text", "flow_name", "inputs"]
        })),
        Tool::new(
            "step_done",
            "Report the result of a previously dispatched step; evaluates its \
             postconditions and advances, retries, or fails the flow.",
        )
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "flow_id": { "type": "string" },
                "step_id": { "type": "string" },
                "result": { "type": "object" }
            },
            "required": ["flow_id", "step_id", "result"]
        })),
        Tool::new("audit", "Return the ordered step audit trace for a flow id.").with_input_schema(
            json!({
                "type": "object",
                "properties": { "flow_id": { "type": "string" } },
                "required": ["flow_id"]
            }),
        ),
    ]
}

/// Owns the process-wide flow registry and routes tool calls into it. The
/// stdio transport loop in `stratum-cli` owns exactly one `Controller`
/// behind a single mutex — see §5: request handling is serialized, so every
/// method here assumes exclusive access and never reasons about concurrency
/// itself.
#[derive(Default)]
pub struct Controller {
    registry: FlowRegistry,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            registry: FlowRegistry::new(),
        }
    }

    /// Dispatch a single `tools/call` request by tool name, returning the
    /// `CallToolResponse` the protocol loop serializes onto the wire.
    pub fn call_tool(&mut self, request: &CallToolRequest) -> CallToolResponse {
        let args = request.arguments.clone().unwrap_or(Value::Null);
        let result = match request.name.as_str() {
            "validate" => self.handle_validate(&args),
            "plan" => self.handle_plan(&args),
            "step_done" => self.handle_step_done(&args),
            "audit" => self.handle_audit(&args),
            other => Ok(ErrorEnvelope {
                success: false,
                error_type: "execution_error",
                path: None,
                message: format!("unknown tool '{other}'"),
                suggestion: Some("use one of: validate, plan, step_done, audit".to_string()),
            }
            .to_value()),
        };

        match result {
            Ok(value) => text_response(value, false),
            Err(value) => text_response(value, true),
        }
    }

    fn handle_validate(&self, args: &Value) -> Result<Value, Value> {
        let spec_text = string_field(args, "spec_text").map_err(invalid_params)?;
        match parser::parse_and_validate(&spec_text) {
            Ok(_) => Ok(json!({ "status": "valid", "valid": true, "errors": [] })),
            Err(err) => Ok(json!({
                "status": "invalid",
                "valid": false,
                "errors": [ErrorEnvelope::from(&err).to_value()],
            })),
        }
    }

    fn handle_plan(&mut self, args: &Value) -> Result<Value, Value> {
        let spec_text = string_field(args, "spec_text").map_err(invalid_params)?;
        let flow_name = string_field(args, "flow_name").map_err(invalid_params)?;
        let raw_inputs = args
            .get("inputs")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let inputs_map = raw_inputs
            .as_object()
            .cloned()
            .ok_or_else(|| invalid_params("'inputs' must be a JSON object"))?;

        let spec = parser::parse_and_validate(&spec_text).map_err(|e| ErrorEnvelope::from(&e).to_value())?;

        let flow_def = spec
            .flow(&flow_name)
            .ok_or_else(|| {
                ErrorEnvelope {
                    success: false,
                    error_type: "execution_error",
                    path: Some(format!("flows.{flow_name}")),
                    message: format!("spec has no flow named '{flow_name}'"),
                    suggestion: Some(format!(
                        "known flows: {}",
                        spec.flows.keys().cloned().collect::<Vec<_>>().join(", ")
                    )),
                }
                .to_value()
            })?;

        if let Some(violation) = check_flow_inputs(&flow_def.input, &inputs_map) {
            return Err(ErrorEnvelope {
                success: false,
                error_type: "validation_error",
                path: Some(format!("flows.{flow_name}.input.{}", violation.0)),
                message: violation.1,
                suggestion: None,
            }
            .to_value());
        }

        let inputs: HashMap<String, Value> = inputs_map.into_iter().collect();
        let spec = std::sync::Arc::new(spec);

        let outcome = self
            .registry
            .plan(spec, &flow_name, inputs)
            .map_err(|e| ErrorEnvelope::from(&e).to_value())?;

        Ok(dispatch_outcome_to_value(outcome))
    }

    fn handle_step_done(&mut self, args: &Value) -> Result<Value, Value> {
        let flow_id = string_field(args, "flow_id").map_err(invalid_params)?;
        let step_id = string_field(args, "step_id").map_err(invalid_params)?;
        let result = args.get("result").cloned().unwrap_or(Value::Null);

        let outcome = self
            .registry
            .step_done(&flow_id, &step_id, result)
            .map_err(|e| ErrorEnvelope::from(&e).to_value())?;

        Ok(step_done_outcome_to_value(outcome))
    }

    fn handle_audit(&self, args: &Value) -> Result<Value, Value> {
        let flow_id = string_field(args, "flow_id").map_err(invalid_params)?;
        let records = self
            .registry
            .audit(&flow_id)
            .map_err(|e| ErrorEnvelope::from(&e).to_value())?;
        Ok(json!({ "status": "ok", "flow_id": flow_id, "trace": records_to_value(records) }))
    }
}

fn invalid_params(message: impl Into<String>) -> Value {
    ErrorEnvelope {
        success: false,
        error_type: "validation_error",
        path: None,
        message: message.into(),
        suggestion: None,
    }
    .to_value()
}

fn string_field(args: &Value, field: &str) -> Result<String, String> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing required field '{field}'"))
}

/// Shape-check flow inputs against the flow's declared parameter types
/// before planning: the controller is a typed-contract enforcement plane
/// end to end, not only at step-output boundaries.
fn check_flow_inputs(
    declared: &HashMap<String, PrimitiveType>,
    provided: &serde_json::Map<String, Value>,
) -> Option<(String, String)> {
    for (field, ty) in declared {
        match provided.get(field) {
            None => {
                return Some((field.clone(), format!("missing required input field '{field}'")))
            }
            Some(value) if !ty.accepts(value) => {
                return Some((
                    field.clone(),
                    format!(
                        "input field '{field}' expected type '{}', found {value}",
                        ty.as_str()
                    ),
                ))
            }
            Some(_) => {}
        }
    }
    None
}

fn dispatch_to_value(d: &StepDispatch) -> Value {
    json!({
        "status": "execute_step",
        "flow_id": d.flow_id,
        "step_id": d.step_id,
        "function": d.function,
        "intent": d.intent,
        "inputs": d.inputs,
        "output_contract": d.output_contract,
        "output_fields": d.output_fields,
        "ensure": d.ensure,
        "retries_remaining": d.retries_remaining,
    })
}

fn dispatch_outcome_to_value(outcome: DispatchOutcome) -> Value {
    match outcome {
        DispatchOutcome::ExecuteStep(d) => dispatch_to_value(&d),
        DispatchOutcome::Complete { output } => json!({ "status": "complete", "output": output }),
    }
}

fn step_done_outcome_to_value(outcome: StepDoneOutcome) -> Value {
    match outcome {
        StepDoneOutcome::ExecuteStep(d) => dispatch_to_value(&d),
        StepDoneOutcome::Complete { output } => json!({ "status": "complete", "output": output }),
        StepDoneOutcome::EnsureFailed {
            step_id,
            violations,
            retries_remaining,
        } => json!({
            "status": "ensure_failed",
            "step_id": step_id,
            "violations": violations.iter().map(|v| v.display_text()).collect::<Vec<_>>(),
            "retries_remaining": retries_remaining,
        }),
        StepDoneOutcome::Failed {
            step_id,
            violations,
            final_flag,
        } => json!({
            "status": "failed",
            "step_id": step_id,
            "violations": violations.iter().map(|v| v.display_text()).collect::<Vec<_>>(),
            "final": final_flag,
        }),
    }
}

fn records_to_value(records: &[StepRecord]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|r| {
                json!({
                    "step_id": r.step_id,
                    "function": r.function_name,
                    "attempts": r.attempts,
                    "dispatched_at": r.dispatched_at.to_rfc3339(),
                    "completed_at": r.completed_at.to_rfc3339(),
                    "outcome": match r.outcome {
                        crate::flow::StepOutcome::Completed => "completed",
                        crate::flow::StepOutcome::RetryExhausted => "retry_exhausted",
                        crate::flow::StepOutcome::DispatchFailed => "dispatch_failed",
                    },
                })
            })
            .collect(),
    )
}

fn text_response(value: Value, is_error: bool) -> CallToolResponse {
    CallToolResponse {
        content: vec![ToolResult::Text {
            text: serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
        }],
        is_error: Some(is_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
version: "0.1"
contracts:
  Out:
    x: {type: integer}
functions:
  f:
    mode: compute
    intent: "do work"
    input: {}
    output: Out
flows:
  main:
    input:
      text: {type: string}
    output: Out
    steps:
      - id: s1
        function: f
        inputs: {}
"#;

    fn call(controller: &mut Controller, name: &str, args: Value) -> Value {
        let response = controller.call_tool(&CallToolRequest {
            name: name.to_string(),
            arguments: Some(args),
        });
        let ToolResult::Text { text } = &response.content[0] else {
            panic!("expected text result")
        };
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn validate_tool_reports_valid() {
        let mut controller = Controller::new();
        let v = call(&mut controller, "validate", json!({ "spec_text": SPEC }));
        assert_eq!(v["valid"], json!(true));
    }

    #[test]
    fn validate_tool_reports_invalid_with_error_envelope() {
        let mut controller = Controller::new();
        let v = call(
            &mut controller,
            "validate",
            json!({ "spec_text": "not: [valid" }),
        );
        assert_eq!(v["valid"], json!(false));
        assert_eq!(v["errors"][0]["error_type"], json!("parse_error"));
    }

    #[test]
    fn plan_tool_dispatches_first_step() {
        let mut controller = Controller::new();
        let v = call(
            &mut controller,
            "plan",
            json!({ "spec_text": SPEC, "flow_name": "main", "inputs": {"text": "hi"} }),
        );
        assert_eq!(v["status"], json!("execute_step"));
        assert_eq!(v["step_id"], json!("s1"));
    }

    #[test]
    fn plan_tool_rejects_bad_flow_inputs() {
        let mut controller = Controller::new();
        let v = call(
            &mut controller,
            "plan",
            json!({ "spec_text": SPEC, "flow_name": "main", "inputs": {} }),
        );
        assert_eq!(v["error_type"], json!("validation_error"));
    }

    #[test]
    fn full_turn_sequence_reaches_complete() {
        let mut controller = Controller::new();
        let v = call(
            &mut controller,
            "plan",
            json!({ "spec_text": SPEC, "flow_name": "main", "inputs": {"text": "hi"} }),
        );
        let flow_id = v["flow_id"].as_str().unwrap().to_string();

        let v2 = call(
            &mut controller,
            "step_done",
            json!({ "flow_id": flow_id, "step_id": "s1", "result": {"x": 1} }),
        );
        assert_eq!(v2["status"], json!("complete"));

        let audit = call(&mut controller, "audit", json!({ "flow_id": flow_id }));
        assert_eq!(audit["trace"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn unknown_tool_reports_execution_error() {
        let mut controller = Controller::new();
        let v = call(&mut controller, "bogus", json!({}));
        assert_eq!(v["error_type"], json!("execution_error"));
    }
}
