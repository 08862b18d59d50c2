//! Error taxonomy for the Stratum controller core.
//!
//! Every fallible operation in this crate returns one of the typed errors
//! below, never a bare `String` or `anyhow::Error` — callers (the protocol
//! front-end in `stratum-cli`) need to switch on error *kind* to build the
//! wire-level error envelope described in the protocol spec.

use thiserror::Error;

/// Crate-wide result alias.
pub type StratumResult<T> = Result<T, StratumError>;

/// Top-level error taxonomy. Each variant corresponds to one of the error
/// classes the protocol front-end must translate into a `{success: false,
/// error_type, ...}` response.
#[derive(Debug, Error)]
pub enum StratumError {
    /// Malformed source text (stage 1 of the parser).
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Structural schema violation (stage 2-3 of the parser).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Reference integrity violation (stage 5 of the parser).
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    /// A `$`-reference could not be resolved at dispatch time.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A postcondition expression failed to compile under the sandbox rules.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Scheduler or flow-state execution error (cycle, wrong state, unknown flow).
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Anything unexpected. Never shown to the executor beyond a generic
    /// slug + message — see `error_type()`/`message()` below.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StratumError {
    /// The wire-level `error_type` slug for this error.
    pub fn error_type(&self) -> &'static str {
        match self {
            StratumError::Parse(_) => "parse_error",
            StratumError::Validation(_) => "validation_error",
            StratumError::Semantic(_) => "semantic_error",
            StratumError::Resolution(_) => "execution_error",
            StratumError::Sandbox(_) => "validation_error",
            StratumError::Execution(_) => "execution_error",
            StratumError::Internal(_) => "internal_error",
        }
    }

    /// Dotted path to the offending node, if the error carries one.
    pub fn path(&self) -> Option<String> {
        match self {
            StratumError::Validation(e) => Some(e.path.clone()),
            StratumError::Semantic(e) => Some(e.path.clone()),
            _ => None,
        }
    }

    /// Actionable fix hint, if the error carries one.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            StratumError::Validation(e) => e.suggestion.clone(),
            StratumError::Execution(ExecutionError::UnknownVersion { known, .. }) => {
                Some(format!("known versions: {}", known.join(", ")))
            }
            _ => None,
        }
    }

    /// The human-readable message to put on the wire. Internal errors are
    /// deliberately generic here; the detailed cause stays in `tracing` logs.
    pub fn message(&self) -> String {
        match self {
            StratumError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Build an internal error from any lower-level failure without leaking
    /// its `Display` representation onto the wire.
    pub fn internal(context: impl std::fmt::Display) -> Self {
        tracing::error!(%context, "internal error");
        StratumError::Internal(context.to_string())
    }
}

/// Stage-1 parser failure: the source text is not valid YAML.
#[derive(Debug, Error)]
#[error("parse error: {message}")]
pub struct ParseError {
    /// The raw message surfaced by the YAML decoder.
    pub message: String,
}

/// Stage 2/3 parser failure: the document does not conform to the schema
/// for its declared (or default) version.
#[derive(Debug, Error)]
#[error("validation error at {path}: {message}")]
pub struct ValidationError {
    /// Dotted path to the failing node, e.g. `functions.summarize.output`.
    pub path: String,
    /// Human-readable description of the violation.
    pub message: String,
    /// Actionable fix hint, derived from the kind of constraint violated.
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Stage-5 parser failure: reference integrity violated between IR records.
#[derive(Debug, Error)]
#[error("semantic error at {path}: {message}")]
pub struct SemanticError {
    pub path: String,
    pub message: String,
}

impl SemanticError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A `$`-reference could not be resolved against the current flow state.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("malformed reference: {reference}")]
    Malformed { reference: String },

    #[error("flow input '{field}' is not defined (reference: {reference})")]
    UnknownInput { field: String, reference: String },

    #[error(
        "step '{step_id}' is not a completed step yet (reference: {reference}); \
         check depends_on or step ordering"
    )]
    StepNotReady { step_id: String, reference: String },

    #[error("path '{path}' does not exist on the output of step '{step_id}' (reference: {reference})")]
    PathNotFound {
        step_id: String,
        path: String,
        reference: String,
    },
}

/// A postcondition expression could not be compiled under the sandbox rules.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to compile expression `{expr}`: {reason}")]
    CompileError { expr: String, reason: String },

    #[error("expression `{expr}` failed to evaluate: {cause}")]
    EvaluationError { expr: String, cause: String },
}

/// Scheduler / flow execution failures.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("dependency cycle detected among steps: {steps:?}")]
    Cycle { steps: Vec<String> },

    #[error("unknown spec version '{version}'")]
    UnknownVersion { version: String, known: Vec<String> },

    #[error("unknown flow id '{flow_id}'")]
    UnknownFlow { flow_id: String },

    #[error(
        "step '{expected}' is the currently dispatched step, but step_done reported '{reported}'"
    )]
    StepMismatch { expected: String, reported: String },

    #[error("flow '{flow_id}' is not awaiting a result (state: {state})")]
    UnexpectedResult { flow_id: String, state: String },

    #[error("spec has no flow named '{flow_name}'")]
    UnknownFlowName { flow_name: String },

    #[error("unknown function '{function}' referenced by step '{step}'")]
    UnknownFunction { step: String, function: String },
}
