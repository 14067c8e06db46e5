//! WolfBeacon - Leader Election for Polling Browsers
//!
//! Runs the coordination HTTP API and the background presence sweeper.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfbeacon::api::HttpServer;
use wolfbeacon::config::BeaconConfig;
use wolfbeacon::coordinator::Coordinator;
use wolfbeacon::error::Result;
use wolfbeacon::sweeper::Sweeper;

/// WolfBeacon - Leader Election for Polling Browsers
#[derive(Parser)]
#[command(name = "wolfbeacon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wolfbeacon.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordination server
    Start {
        /// Override the API bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wolfbeacon.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind } => {
            let mut config = load_config(&cli.config)?;
            if let Some(level) = cli.log_level {
                config.logging.level = level;
            }
            if let Some(bind) = bind {
                config.api.bind_address = bind;
            }
            init_logging(&config.logging.level, &config.logging.format);
            run_start(config).await
        }
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(&cli.config),
        Commands::Info => run_info(&cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load the config file, falling back to defaults when it does not exist
fn load_config(path: &Path) -> Result<BeaconConfig> {
    if path.exists() {
        BeaconConfig::from_file(path)
    } else {
        eprintln!("Config file {} not found, using defaults", path.display());
        Ok(BeaconConfig::default())
    }
}

/// Start the coordination server
async fn run_start(config: BeaconConfig) -> Result<()> {
    tracing::info!("Starting WolfBeacon...");
    tracing::info!(
        "Leader timeout {:?}, presence timeout {:?}, sweep every {:?}",
        config.leader_timeout(),
        config.presence_timeout(),
        config.sweep_interval()
    );

    let coordinator = Arc::new(Coordinator::new(&config));

    let sweeper = Sweeper::new(Arc::clone(&coordinator), config.sweep_interval()).spawn();

    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&coordinator));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
    };

    let result = http_server.start(shutdown).await;
    if let Err(e) = &result {
        tracing::error!("HTTP server error: {}", e);
    }

    // Cleanup
    sweeper.abort();
    tracing::info!("WolfBeacon shutdown complete");
    result
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# WolfBeacon Configuration
# Generated configuration file

[api]
bind_address = "0.0.0.0:3001"
cors_enabled = true
max_body_bytes = 10240

[election]
# A leader silent for longer than this can be displaced by another browser
leader_timeout_ms = 8000

[presence]
# Must be greater than election.leader_timeout_ms
timeout_ms = 30000
sweep_interval_ms = 10000
warning_after_ms = 10000
default_tag = "unknown"

[state.defaults]
symbol = "BTCUSDT"
interval = "1m"
filters = {}
intervalSettings = {}

[logging]
level = "info"
format = "pretty"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then start with: wolfbeacon --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: &Path) -> Result<()> {
    match BeaconConfig::from_file(config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address:     {}", config.api.bind_address);
            println!("  Leader Timeout:   {} ms", config.election.leader_timeout_ms);
            println!("  Presence Timeout: {} ms", config.presence.timeout_ms);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show effective configuration
fn run_info(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("WolfBeacon Configuration");
    println!("========================");
    println!();
    println!("API:");
    println!("  Bind Address:   {}", config.api.bind_address);
    println!("  CORS:           {}", config.api.cors_enabled);
    println!("  Max Body:       {} bytes", config.api.max_body_bytes);
    println!();
    println!("Election:");
    println!("  Leader Timeout: {} ms", config.election.leader_timeout_ms);
    println!();
    println!("Presence:");
    println!("  Timeout:        {} ms", config.presence.timeout_ms);
    println!("  Sweep Interval: {} ms", config.presence.sweep_interval_ms);
    println!("  Warning After:  {} ms", config.presence.warning_after_ms);
    println!("  Default Tag:    {}", config.presence.default_tag);
    println!();
    println!("Default State:");
    for (field, value) in &config.state.defaults {
        println!("  {:<16}{}", field, value);
    }

    Ok(())
}
