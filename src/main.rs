//! agent-router command line entry point
//!
//! Loads a router configuration and exercises it: validate the config, route
//! ad-hoc or replayed requests, and print per-agent stats. All command output
//! is JSON on stdout; logs go to stderr.

use agent_router::agent::PricingTier;
use agent_router::config::RouterConfig;
use agent_router::observability::init_logging_with_verbosity;
use agent_router::routing::{Router, RoutingRequest};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, warn};

/// Capability-based request router for agent backends
#[derive(Parser)]
#[command(name = "agent-router")]
#[command(about = "Capability-based request router with rate budgets, health tracking and shadow testing")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "AGENT_ROUTER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
    /// Route one request (optionally repeated) and print the decisions
    Route {
        /// Capability the request needs
        #[arg(long)]
        capability: String,
        /// JSON request payload
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Restrict candidates to a pricing tier
        #[arg(long, value_name = "TIER")]
        pricing: Option<PricingTier>,
        /// Strategy name (balanced, cost, performance)
        #[arg(long)]
        strategy: Option<String>,
        /// Route the same request this many times
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Route newline-delimited JSON requests from a file, or stdin with "-"
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Print per-agent statistics
    Stats {
        /// Only this agent
        #[arg(long)]
        agent: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging_with_verbosity(cli.verbose);

    info!("Starting agent-router v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Route {
            capability,
            payload,
            pricing,
            strategy,
            count,
        } => {
            handle_route_command(&config, capability, &payload, pricing, strategy, count).await
        }
        Commands::Replay { input } => handle_replay_command(&config, &input).await,
        Commands::Stats { agent } => handle_stats_command(&config, agent.as_deref()),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<RouterConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(RouterConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = ["router.toml", "config/router.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(RouterConfig::load_from_file(&path)?);
                }
            }

            warn!("No configuration file found, starting with an empty router");
            Ok(RouterConfig::default())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_config_command(
    config: &RouterConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!(agents = config.agents.len(), "Configuration validation complete");
    Ok(())
}

async fn handle_route_command(
    config: &RouterConfig,
    capability: String,
    payload: &str,
    pricing: Option<PricingTier>,
    strategy: Option<String>,
    count: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::from_config(config)?;
    let payload: Value = serde_json::from_str(payload)?;

    let mut request = RoutingRequest::new(capability).with_payload(payload);
    request.pricing_preference = pricing;
    request.strategy = strategy;

    let mut outcomes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match router.route(&request) {
            Ok(decision) => outcomes.push(serde_json::to_value(decision)?),
            Err(e) => outcomes.push(json!({ "error": e.to_string() })),
        }
    }

    router.shutdown().await;
    print_json(&json!({
        "decisions": outcomes,
        "metrics": router.metrics(),
        "shadow": router.shadow_summary(),
    }))
}

async fn handle_replay_command(
    config: &RouterConfig,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::from_config(config)?;

    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(std::fs::File::open(input)?))
    };

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<RoutingRequest>(&line) {
            Ok(request) => match router.route(&request) {
                Ok(decision) => serde_json::to_value(decision)?,
                Err(e) => json!({ "line": line_number + 1, "error": e.to_string() }),
            },
            Err(e) => {
                warn!(line = line_number + 1, error = %e, "Skipping malformed request");
                json!({ "line": line_number + 1, "error": format!("Invalid request: {e}") })
            }
        };
        println!("{}", serde_json::to_string(&outcome)?);
    }

    router.shutdown().await;
    println!(
        "{}",
        serde_json::to_string(&json!({
            "metrics": router.metrics(),
            "shadow": router.shadow_summary(),
        }))?
    );
    Ok(())
}

fn handle_stats_command(
    config: &RouterConfig,
    agent: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let router = Router::from_config(config)?;

    match agent {
        Some(agent_id) => print_json(&router.get_agent_stats(agent_id)?),
        None => print_json(&router.all_agent_stats()),
    }
}
