//! CLI command implementations.
//!
//! Each command returns the text to print on stdout. `research` is the
//! exception: it streams report chunks to stdout as they arrive.

use std::fmt::Write as FmtWrite;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::cli::output::{OutputFormat, format_footer, format_outcome_json, format_profiles};
#[cfg(feature = "mcp")]
use crate::cli::parser::McpCommands;
use crate::cli::parser::{Cli, Commands, ProfileCommands};
use crate::config::ResearchConfig;
use crate::error::{CommandError, Error, Result};
use crate::profile::ProfileRegistry;
use crate::report::{FileReportStore, ReportSink};
use crate::research::{Orchestrator, ResearchRun, RunOutcome};

/// Parameters for the `research` command.
struct ResearchParams<'a> {
    query: &'a str,
    profile: &'a str,
    max_iterations: u32,
    save: bool,
    reports_dir: Option<&'a Path>,
}

/// Executes the parsed command.
///
/// # Errors
///
/// Returns an error if the command fails to execute, including a research
/// run that ends without a complete report.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let profile_dir = cli.profile_dir.as_deref();

    match &cli.command {
        Commands::Research {
            query,
            profile,
            max_iterations,
            save,
            reports_dir,
        } => {
            let params = ResearchParams {
                query,
                profile,
                max_iterations: *max_iterations,
                save: *save,
                reports_dir: reports_dir.as_deref(),
            };
            cmd_research(&params, profile_dir, format)
        }
        Commands::Profile(ProfileCommands::List) => cmd_profile_list(profile_dir, format),
        Commands::Profile(ProfileCommands::Init { dir }) => {
            cmd_profile_init(dir.as_deref().or(profile_dir), format)
        }
        #[cfg(feature = "server")]
        Commands::Serve { host, port } => cmd_serve(profile_dir, host, *port),
        #[cfg(feature = "mcp")]
        Commands::Mcp(sub) => cmd_mcp(sub, profile_dir),
    }
}

/// Builds the engine and report store from the environment.
fn build_engine(
    profile_dir: Option<&Path>,
    reports_dir: Option<&Path>,
) -> Result<(Orchestrator, FileReportStore)> {
    let mut builder = ResearchConfig::builder().from_env();
    if let Some(dir) = profile_dir {
        builder = builder.profile_dir(dir);
    }
    if let Some(dir) = reports_dir {
        builder = builder.reports_dir(dir);
    }
    let config = builder.build()?;

    let profiles = ProfileRegistry::load(config.profile_dir.as_deref())?;
    let store = FileReportStore::new(config.reports_dir.clone(), Arc::new(profiles.clone()));
    let orchestrator = Orchestrator::from_config(config, profiles)?;
    Ok((orchestrator, store))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn cmd_research(
    params: &ResearchParams<'_>,
    profile_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    let (orchestrator, store) = build_engine(profile_dir, params.reports_dir)?;
    let rt = runtime()?;

    let outcome = rt.block_on(async {
        let run = orchestrator.run(params.query, params.profile, params.max_iterations);
        let token = run.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
        match format {
            OutputFormat::Text => stream_to_stdout(run).await,
            OutputFormat::Json => Ok(run.collect_report().await),
        }
    })?;

    let saved = if params.save {
        save_report(&store, params, &outcome)
    } else {
        None
    };

    let output = match format {
        OutputFormat::Text => format_footer(&outcome.snapshot, saved.as_deref()),
        OutputFormat::Json => format_outcome_json(&outcome, saved.as_deref()),
    };

    match outcome.error {
        None => Ok(output),
        Some(error) => {
            // The partial report and its footer still belong on stdout.
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(output.as_bytes());
            let _ = stdout.flush();
            Err(Error::Research(error))
        }
    }
}

/// Writes chunks to stdout as they arrive and returns the collected run.
async fn stream_to_stdout(mut run: ResearchRun) -> Result<RunOutcome> {
    let mut report = String::new();
    let mut chunks = Vec::new();
    let mut error = None;

    while let Some(event) = run.next().await {
        match event {
            Ok(chunk) => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(chunk.text.as_bytes())?;
                stdout.flush()?;
                report.push_str(&chunk.text);
                chunks.push(chunk);
            }
            Err(e) => error = Some(e),
        }
    }

    Ok(RunOutcome {
        report,
        chunks,
        error,
        snapshot: run.snapshot(),
    })
}

fn save_report(
    store: &FileReportStore,
    params: &ResearchParams<'_>,
    outcome: &RunOutcome,
) -> Option<PathBuf> {
    if outcome.report.trim().is_empty() {
        return None;
    }
    store
        .save(params.query, params.profile, &outcome.report)
        .map_err(|e| warn!(error = %e, "failed to save report"))
        .ok()
}

fn cmd_profile_list(profile_dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let registry = ProfileRegistry::load(profile_dir)?;
    Ok(format_profiles(&registry.summaries(), format))
}

fn cmd_profile_init(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let dir = dir
        .map(Path::to_path_buf)
        .or_else(ProfileRegistry::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed("no profile directory; pass --dir".to_string())
        })?;
    let written = ProfileRegistry::write_defaults(&dir)?;

    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Wrote {} profile file(s) to {}\n",
                written.len(),
                dir.display()
            );
            for path in &written {
                let _ = writeln!(out, "  {}", path.display());
            }
            Ok(out)
        }
        OutputFormat::Json => {
            let files: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
            serde_json::to_string_pretty(&serde_json::json!({
                "dir": dir.display().to_string(),
                "written": files,
            }))
            .map_err(|e| CommandError::Output(e.to_string()).into())
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(profile_dir: Option<&Path>, host: &str, port: u16) -> Result<String> {
    let (orchestrator, store) = build_engine(profile_dir, None)?;
    let rt = runtime()?;

    rt.block_on(crate::server::serve(orchestrator, store, host, port))
        .map_err(|e| CommandError::ExecutionFailed(format!("HTTP server error: {e}")))?;

    Ok(String::new())
}

#[cfg(feature = "mcp")]
fn cmd_mcp(cmd: &McpCommands, profile_dir: Option<&Path>) -> Result<String> {
    use crate::mcp::{DelveMcpServer, serve_sse, serve_stdio};

    let (orchestrator, _) = build_engine(profile_dir, None)?;
    let server = DelveMcpServer::new(orchestrator);
    let rt = runtime()?;

    rt.block_on(async {
        match cmd {
            McpCommands::Stdio => serve_stdio(server).await,
            McpCommands::Sse { host, port } => serve_sse(server, host, *port).await,
        }
    })
    .map_err(|e| CommandError::ExecutionFailed(format!("MCP server error: {e}")))?;

    Ok(String::new())
}
