//! MCP tool-discovery and tool-call message shapes.
//!
//! Stratum exposes its four operations (`validate`, `plan`, `step_done`,
//! `audit`) as MCP tools: the executor discovers them via `tools/list` and
//! invokes them via `tools/call`, per §4.7/§6 of the controller spec. The
//! types here are the generic MCP tool envelope; `crate::protocol` builds
//! the tool list and routes `tools/call` to the domain-specific handlers in
//! `crate::flow`/`crate::parser`.

pub mod tools;

pub use tools::{CallToolRequest, CallToolResponse, Tool, ToolResult};
