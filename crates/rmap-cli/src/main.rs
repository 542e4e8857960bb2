//! rmap - resource map resolution CLI
//!
//! Resolves object PIDs against a DataONE node and prints the resource map
//! each one belongs to.
//!
//! ## Commands
//!
//! - `resolve`: Find the resource map for one or more PIDs (or series IDs)
//! - `cache`: Inspect or clear the local association store

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use rmap_core::{
    ConsoleLevel, ResolutionLog, ResolutionResult, ResolverConfig, ResourceMapResolver, METRICS,
};
use rmap_dataone::{DataOneClient, DataOneConfig, DEFAULT_BASE_URL};
use rmap_state::{database_name_for_node, SurrealKeyValueStore};
use serde::Serialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "rmap")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resource map resolution for DataONE-style repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository node the resolver serves
    #[arg(long, global = true, env = "RMAP_NODE_ID", default_value = "unknown")]
    node_id: String,

    /// DataONE REST API root
    #[arg(long, global = true, env = "DATAONE_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Bearer token for restricted objects
    #[arg(long, global = true, env = "DATAONE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Revisions to step back while walking system metadata
    #[arg(long, global = true, env = "RMAP_MAX_STEPS", default_value_t = rmap_core::DEFAULT_MAX_STEPS)]
    max_steps: usize,

    /// Bound on each individual fetch, in milliseconds
    #[arg(long, global = true, env = "RMAP_MAX_FETCH_MS", default_value_t = 45_000)]
    max_fetch_ms: u64,

    /// Minimum severity of status entries mirrored to the log
    #[arg(long, global = true, env = "RMAP_CONSOLE_LEVEL", default_value = "info")]
    console_level: ConsoleLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the resource map each PID belongs to
    Resolve {
        /// Object PIDs
        #[arg(required = true)]
        pids: Vec<String>,

        /// Treat the identifiers as series IDs
        #[arg(long)]
        series: bool,

        /// Print each PID's resolution log
        #[arg(long)]
        log: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Inspect or clear the local association store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the stored resource map for a PID
    Get {
        /// Object PID
        pid: String,
    },

    /// Remove every stored association
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct ResolveReport {
    #[serde(flatten)]
    result: ResolutionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<ResolutionLog>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    rmap_core::init_tracing(cli.json, level);

    let resolver = build_resolver(&cli).await?;

    let outcome = match cli.command {
        Commands::Resolve {
            pids,
            series,
            log,
            format,
        } => cmd_resolve(&resolver, &pids, series, log, format).await,
        Commands::Cache { action } => match action {
            CacheAction::Get { pid } => cmd_cache_get(&resolver, &pid).await,
            CacheAction::Clear => cmd_cache_clear(&resolver).await,
        },
    };

    METRICS.flush();
    outcome
}

fn resolver_config(cli: &Cli) -> Result<ResolverConfig> {
    let config = ResolverConfig::new(cli.node_id.as_str())
        .with_max_steps(cli.max_steps)
        .with_max_fetch_time(Duration::from_millis(cli.max_fetch_ms))
        .with_console_level(cli.console_level);
    config.validate().context("Invalid resolver configuration")?;
    Ok(config)
}

async fn build_resolver(cli: &Cli) -> Result<ResourceMapResolver> {
    let config = resolver_config(cli)?;

    let mut dataone = DataOneConfig::new(&cli.base_url);
    if let Some(token) = cli.token.as_deref().filter(|t| !t.is_empty()) {
        dataone = dataone.with_token(token);
    }
    let client = Arc::new(DataOneClient::new(dataone).context("Failed to create DataONE client")?);

    let store = SurrealKeyValueStore::from_env(&database_name_for_node(&config.node_id))
        .await
        .context("Failed to connect to association store")?;

    info!(node_id = %config.node_id, base_url = %cli.base_url, "Resolver ready");

    ResourceMapResolver::builder(config)
        .index(client.clone())
        .storage(Arc::new(store))
        .sysmeta(client.clone())
        .fetcher(client)
        .build()
        .context("Failed to build resolver")
}

/// Resolve every PID concurrently and print the results in input order
async fn cmd_resolve(
    resolver: &ResourceMapResolver,
    pids: &[String],
    series: bool,
    with_log: bool,
    format: OutputFormat,
) -> Result<()> {
    let results = join_all(pids.iter().map(|pid| async move {
        if series {
            resolver.resolve_from_series_id(pid).await
        } else {
            resolver.resolve(pid).await
        }
    }))
    .await;

    let reports: Vec<ResolveReport> = results
        .into_iter()
        .map(|result| {
            let log = if with_log {
                resolver.get_log(&result.pid)
            } else {
                None
            };
            ResolveReport { result, log }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        OutputFormat::Text => {
            for report in &reports {
                print_report(report);
            }
        }
    }

    let failed = reports.iter().filter(|r| !r.result.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} identifiers could not be resolved", failed, pids.len());
    }
    Ok(())
}

fn print_report(report: &ResolveReport) {
    let result = &report.result;
    match &result.rm {
        Some(rm) => println!("{} -> {}", result.pid, rm),
        None => {
            let mut flags = Vec::new();
            if result.unauthorized {
                flags.push("unauthorized");
            }
            if result.multiple_rms {
                flags.push("multiple resource maps");
            }
            if flags.is_empty() {
                println!("{} -> not found", result.pid);
            } else {
                println!("{} -> not found ({})", result.pid, flags.join(", "));
            }
        }
    }

    if let Some(log) = &report.log {
        for entry in &log.entries {
            let rm = entry.rm.as_deref().unwrap_or("-");
            println!(
                "    {} {:?} {} rm={}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.level,
                entry.label,
                rm
            );
            if !entry.meta.is_null() {
                println!("        {}", entry.meta);
            }
        }
    }
}

async fn cmd_cache_get(resolver: &ResourceMapResolver, pid: &str) -> Result<()> {
    match resolver.check_storage(pid).await.rm {
        Some(rm) => println!("{} -> {}", pid, rm),
        None => println!("No stored resource map for '{}'", pid),
    }
    Ok(())
}

async fn cmd_cache_clear(resolver: &ResourceMapResolver) -> Result<()> {
    resolver.clear_storage().await;
    println!("Cleared stored associations for node {}", resolver.config().node_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resolve_accepts_several_pids() {
        let cli = Cli::try_parse_from([
            "rmap",
            "--node-id",
            "urn:node:TEST",
            "resolve",
            "--log",
            "--format",
            "json",
            "obj.1",
            "obj.2",
        ])
        .unwrap();

        match cli.command {
            Commands::Resolve {
                pids, log, format, ..
            } => {
                assert_eq!(pids, vec!["obj.1", "obj.2"]);
                assert!(log);
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn resolve_requires_a_pid() {
        assert!(Cli::try_parse_from(["rmap", "resolve"]).is_err());
    }

    #[test]
    fn config_takes_cli_budgets() {
        let cli = Cli::try_parse_from([
            "rmap",
            "--node-id",
            "urn:node:TEST",
            "--max-steps",
            "10",
            "--max-fetch-ms",
            "500",
            "--console-level",
            "off",
            "cache",
            "clear",
        ])
        .unwrap();

        let config = resolver_config(&cli).unwrap();
        assert_eq!(config.node_id, "urn:node:TEST");
        assert_eq!(config.max_steps, 10);
        assert_eq!(config.max_fetch_time, Duration::from_millis(500));
        assert_eq!(config.console_level, ConsoleLevel::Off);
    }

    #[test]
    fn unknown_console_level_rejected() {
        let parsed = Cli::try_parse_from(["rmap", "--console-level", "loud", "cache", "clear"]);
        assert!(parsed.is_err());
    }
}
