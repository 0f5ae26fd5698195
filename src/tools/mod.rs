//! Chrome debug MCP tools module

pub mod cdp_tools;
pub mod types;

pub use cdp_tools::*;
pub use types::*;
