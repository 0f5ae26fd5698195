//! Type definitions for the Chrome debug MCP tools

use serde::Deserialize;
use schemars::JsonSchema;

// ============================================================================
// cdp_command
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CdpCommandArgs {
    /// CDP method to invoke (e.g., "Runtime.evaluate", "Page.captureScreenshot")
    pub method: String,
    /// Command parameters: a JSON object, or a JSON-encoded string (default: empty object)
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}
