//! CLI layer for delve-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! running research, managing profiles, and serving the report API.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
#[cfg(feature = "mcp")]
pub use parser::McpCommands;
pub use parser::{Cli, Commands, ProfileCommands};
