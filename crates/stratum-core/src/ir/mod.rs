//! Typed intermediate representation for Stratum flow specs.
//!
//! Every record here is immutable once built by the parser (`crate::parser`):
//! no type in this module exposes a public `&mut self` method. A `Spec` may
//! be shared (via `Arc`, owned by the caller) across several concurrently
//! active flows — see `crate::flow`.

use std::collections::HashMap;

/// A declared primitive field type, as spelled in the spec format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    String,
    Number,
    Integer,
    Boolean,
}

impl PrimitiveType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Boolean => "boolean",
        }
    }

    /// Whether `value` conforms to this declared type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (PrimitiveType::String, Value::String(_)) => true,
            (PrimitiveType::Boolean, Value::Bool(_)) => true,
            (PrimitiveType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (PrimitiveType::Number, Value::Number(_)) => true,
            _ => false,
        }
    }
}

/// A named structured type: a field map from name to declared primitive type.
#[derive(Debug, Clone)]
pub struct Contract {
    pub name: String,
    pub fields: HashMap<String, PrimitiveType>,
}

/// Execution mode of a function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionMode {
    Infer,
    Compute,
}

/// A named, reusable capability specification.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub mode: FunctionMode,
    pub intent: String,
    pub input: HashMap<String, PrimitiveType>,
    pub output: String,
    /// Postcondition expression texts, in declared order.
    pub ensure: Vec<String>,
    pub retries: u32,
    pub model: Option<String>,
}

impl FunctionDef {
    /// Total attempts permitted: `retries + 1`.
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// One dispatchable unit within a flow.
#[derive(Debug, Clone)]
pub struct StepDef {
    pub id: String,
    pub function: String,
    /// Parameter name -> reference string or literal.
    pub inputs: HashMap<String, String>,
    pub depends_on: Vec<String>,
}

/// A named, ordered sequence of steps with a declared input/output contract.
#[derive(Debug, Clone)]
pub struct FlowDef {
    pub name: String,
    pub input: HashMap<String, PrimitiveType>,
    pub output: String,
    pub steps: Vec<StepDef>,
}

impl FlowDef {
    pub fn step(&self, id: &str) -> Option<&StepDef> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}

/// A fully parsed and validated spec document.
#[derive(Debug, Clone)]
pub struct Spec {
    pub version: String,
    pub contracts: HashMap<String, Contract>,
    pub functions: HashMap<String, FunctionDef>,
    pub flows: HashMap<String, FlowDef>,
}

impl Spec {
    pub fn contract(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn flow(&self, name: &str) -> Option<&FlowDef> {
        self.flows.get(name)
    }
}
