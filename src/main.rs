use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use mcp_perplexity::config::Config;
use mcp_perplexity::mcp::server::McpServer;

#[derive(Debug, Parser)]
#[command(name = "mcp-perplexity", version, about)]
struct Cli {
    /// Optional configuration file (TOML, YAML or JSON)
    #[arg(env = "PERPLEXITY_MCP_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let mcp_server = McpServer::new(&config)?;

    info!("Perplexity MCP server running on stdio");

    // Set up graceful shutdown
    let shutdown_signal = tokio::signal::ctrl_c();

    tokio::select! {
        result = mcp_server.run() => result?,
        _ = shutdown_signal => {
            info!("Shutting down");
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    // Support both LOG_LEVEL and RUST_LOG environment variables
    let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
        tracing_subscriber::EnvFilter::try_new(rust_log)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    } else if let Ok(log_level) = std::env::var("LOG_LEVEL") {
        let level_str = match log_level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "warn",
        };
        tracing_subscriber::EnvFilter::new(level_str)
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    // stdout carries the protocol, so logs must go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
