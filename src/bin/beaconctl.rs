//! BeaconCtl - Command line tool for inspecting and steering WolfBeacon
//!
//! Usage:
//!   beaconctl status             - Show health and current leader
//!   beaconctl browsers           - List connected browsers
//!   beaconctl state              - Dump the shared state
//!   beaconctl claim [--force]    - Claim leadership (operator failover)
//!   beaconctl reset [--force]    - Reset all coordination state

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

/// WolfBeacon Control Tool
#[derive(Parser)]
#[command(name = "beaconctl")]
#[command(about = "Inspect and control a WolfBeacon server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wolfbeacon.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health and current leader
    Status,
    /// List connected browsers
    Browsers,
    /// Dump the shared state as JSON
    State,
    /// Claim leadership
    Claim {
        /// Browser id to claim as (random if omitted)
        #[arg(long)]
        id: Option<String>,
        /// Take over even if the current leader is active
        #[arg(long)]
        force: bool,
    },
    /// Reset browsers, leadership and shared state
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    browser_count: usize,
    #[serde(default)]
    leader_id: Option<String>,
    #[serde(default)]
    uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowsersResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    online_count: usize,
    #[serde(default)]
    browsers: Vec<BrowserEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrowserEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    age_ms: u64,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimResponse {
    success: bool,
    #[serde(default)]
    leader_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

// ============ Config ============

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Debug, Deserialize)]
struct ApiConfig {
    #[serde(default = "default_api_bind")]
    bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0:3001".to_string()
}

/// Work out the API endpoint from the flag or the config file
fn resolve_endpoint(cli: &Cli) -> String {
    if let Some(endpoint) = &cli.endpoint {
        return endpoint.trim_end_matches('/').to_string();
    }

    let addr = std::fs::read_to_string(&cli.config)
        .ok()
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.api.bind_address)
        .unwrap_or_else(default_api_bind);

    // Convert bind address to localhost if it's 0.0.0.0
    match addr.strip_prefix("0.0.0.0") {
        Some(port) => format!("http://127.0.0.1{}", port),
        None => format!("http://{}", addr),
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = resolve_endpoint(&cli);

    let result = match &cli.command {
        Commands::Status => show_status(&endpoint).await,
        Commands::Browsers => list_browsers(&endpoint).await,
        Commands::State => show_state(&endpoint).await,
        Commands::Claim { id, force } => claim(&endpoint, id.clone(), *force).await,
        Commands::Reset { force } => reset(&endpoint, *force).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// ============ Commands ============

async fn get_json<T: serde::de::DeserializeOwned>(url: &str) -> anyhow::Result<T> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    if !response.status().is_success() {
        bail!("API error: {}", response.status());
    }

    Ok(response.json().await?)
}

async fn show_status(endpoint: &str) -> anyhow::Result<()> {
    let health: HealthResponse = get_json(&format!("{}/health", endpoint)).await?;

    println!();
    println!("WolfBeacon Status (beaconctl v{})", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    println!("Status:    {}", health.status);
    println!("Browsers:  {}", health.browser_count);
    println!("Leader:    {}", health.leader_id.as_deref().unwrap_or("NONE"));
    println!("Uptime:    {}s", health.uptime_secs);
    println!();

    Ok(())
}

async fn list_browsers(endpoint: &str) -> anyhow::Result<()> {
    let info: BrowsersResponse = get_json(&format!("{}/api/browsers", endpoint)).await?;

    println!();
    println!("Total: {} browsers  |  Online: {}", info.total_count, info.online_count);
    println!();
    println!("{:<40} {:<12} {:<10} {:<10}", "BROWSER ID", "TAG", "AGE", "STATUS");
    println!("{}", "-".repeat(75));

    for browser in &info.browsers {
        // Pad status to fixed width BEFORE adding color codes
        let status_padded = format!("{:<10}", browser.status);
        let status_colored = match browser.status.as_str() {
            "leader" => format!("\x1b[1;34m{}\x1b[0m", status_padded), // Bold Blue
            "online" => format!("\x1b[32m{}\x1b[0m", status_padded),   // Green
            "warning" => format!("\x1b[33m{}\x1b[0m", status_padded),  // Yellow
            _ => status_padded,
        };

        println!(
            "{:<40} {:<12} {:<10} {}",
            browser.id,
            browser.tag,
            format!("{:.1}s", browser.age_ms as f64 / 1000.0),
            status_colored
        );
    }
    println!();

    Ok(())
}

async fn show_state(endpoint: &str) -> anyhow::Result<()> {
    let state: serde_json::Value = get_json(&format!("{}/api/state", endpoint)).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn claim(endpoint: &str, id: Option<String>, force: bool) -> anyhow::Result<()> {
    let id = id.unwrap_or_else(|| format!("beaconctl-{}", uuid::Uuid::new_v4()));
    let url = format!("{}/api/claim-leader", endpoint);

    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({
            "browserId": id,
            "force": force,
            "tag": "beaconctl",
        }))
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    if !response.status().is_success() {
        bail!("API error: {}", response.status());
    }

    let result: ClaimResponse = response.json().await?;
    if result.success {
        println!("Leadership acquired as {}", id);
    } else {
        println!(
            "Claim rejected, leader is {}",
            result.leader_id.as_deref().unwrap_or("NONE")
        );
        if let Some(reason) = result.reason {
            println!("{}", reason);
        }
        if !force {
            println!("Use --force to take over anyway");
        }
    }

    Ok(())
}

async fn reset(endpoint: &str, force: bool) -> anyhow::Result<()> {
    if !force {
        println!("This will forget every browser, vacate leadership and restore default state.");
        print!("Continue? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(());
        }
    }

    let url = format!("{}/api/reset", endpoint);
    let response = reqwest::Client::new()
        .post(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach {}", url))?;

    if !response.status().is_success() {
        bail!("API error: {}", response.status());
    }

    let result: ResetResponse = response.json().await?;
    if result.success {
        println!("{}", result.message.unwrap_or_else(|| "Reset complete".to_string()));
    } else {
        bail!("Reset failed");
    }

    Ok(())
}
