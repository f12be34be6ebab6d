//! MCP tool parameter types.
//!
//! Defines the input schemas for MCP tools using `schemars` for automatic
//! JSON Schema generation required by the MCP protocol.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `research` MCP tool.
///
/// Runs a full session: plan → search → reflect → synthesize.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearchParams {
    /// The research question.
    pub query: String,

    /// Industry profile id (`deepResearch`, `finance`, `tech`, or a custom one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Search/reflect iterations, clamped to 1-5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}
