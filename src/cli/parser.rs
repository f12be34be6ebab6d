//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::profile::DEFAULT_PROFILE_ID;

/// delve-rs: iterative deep research from the command line.
///
/// Decomposes a question into sub-queries, searches the web, reflects on
/// the evidence, and streams a cited report.
#[derive(Parser, Debug)]
#[command(name = "delve-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// Directory holding profile JSON overrides.
    #[arg(long, env = "DELVE_PROFILE_DIR", global = true)]
    pub profile_dir: Option<PathBuf>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a question and stream the report.
    ///
    /// The report is written to stdout as it is generated; progress and
    /// logs go to stderr.
    #[command(after_help = r#"Examples:
  delve-rs research "2025年全球半导体出口趋势"
  delve-rs research "A股新能源板块估值" --profile finance --max-iterations 2
  delve-rs research "RISC-V adoption" --profile tech --save
  delve-rs --format json research "solid-state batteries" | jq '.evidence[].url'
"#)]
    Research {
        /// The research question.
        query: String,

        /// Industry profile id.
        #[arg(short, long, default_value = DEFAULT_PROFILE_ID)]
        profile: String,

        /// Search/reflect iterations (clamped to 1-5).
        #[arg(short = 'n', long, env = "DELVE_MAX_ITERATIONS", default_value = "3")]
        max_iterations: u32,

        /// Save the finished report to the reports directory.
        #[arg(short, long)]
        save: bool,

        /// Directory for saved reports.
        #[arg(long, env = "DELVE_REPORTS_DIR")]
        reports_dir: Option<PathBuf>,
    },

    /// Industry profile operations (list, init).
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Serve the HTTP/SSE report API.
    #[cfg(feature = "server")]
    #[command(after_help = r#"Examples:
  delve-rs serve                           # Listen on 127.0.0.1:5000
  delve-rs serve --host 0.0.0.0 --port 8080
"#)]
    Serve {
        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to.
        #[arg(long, default_value = "5000")]
        port: u16,
    },

    /// MCP server operations (stdio, sse).
    #[cfg(feature = "mcp")]
    #[command(subcommand)]
    Mcp(McpCommands),
}

/// Profile subcommands.
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List available profiles.
    List,

    /// Write the built-in profiles as JSON for customisation.
    ///
    /// Existing files are left untouched.
    #[command(after_help = r#"Examples:
  delve-rs profile init                    # Write to ~/.config/delve-rs/profiles
  delve-rs profile init --dir ./profiles
"#)]
    Init {
        /// Target directory.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// MCP server subcommands.
#[cfg(feature = "mcp")]
#[derive(Subcommand, Debug)]
pub enum McpCommands {
    /// Start MCP server with stdio transport.
    ///
    /// Reads JSON-RPC messages from stdin, writes responses to stdout.
    #[command(after_help = r#"Examples:
  delve-rs mcp stdio
  DASHSCOPE_API_KEY=sk-... BOCHAAI_API_KEY=... delve-rs mcp stdio
"#)]
    Stdio,

    /// Start MCP server with streamable HTTP transport.
    #[command(after_help = r#"Examples:
  delve-rs mcp sse                            # Listen on 127.0.0.1:3000
  delve-rs mcp sse --host 0.0.0.0 --port 8080
"#)]
    Sse {
        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to.
        #[arg(long, default_value = "3000")]
        port: u16,
    },
}
