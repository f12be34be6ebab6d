//! MCP (Model Context Protocol) server for delve-rs.
//!
//! Exposes the research loop as an MCP tool and the industry profiles as
//! resources, so external agents can delegate deep research to delve-rs.
//!
//! # Feature Gate
//!
//! This module requires the `mcp` feature flag:
//! ```toml
//! [dependencies]
//! delve-rs = { version = "...", features = ["mcp"] }
//! ```
//!
//! # Architecture
//!
//! ```text
//! MCP Client
//!   ↓ research(query, profile, max_iterations)
//! DelveMcpServer
//!   ↓
//! Orchestrator::research()
//!   ├── QueryPlanner (plan)
//!   ├── SearchAggregator (concurrent web search)
//!   ├── ReflectionController (continue / sufficient)
//!   └── SynthesisStreamer → report
//!   ↓
//! RunOutcome JSON → MCP Client
//! ```

pub mod params;
pub mod server;
pub mod transport;

pub use params::ResearchParams;
pub use server::DelveMcpServer;
pub use transport::{serve_sse, serve_stdio};
