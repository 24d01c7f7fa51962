//! sandbox-grader
//!
//! Serves the grading pipeline over HTTP (default) or MCP stdio.
//! Configuration comes from `--config` plus `GRADER_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sandbox_grader::catalog::FlatFileCatalog;
use sandbox_grader::config::Config;
use sandbox_grader::grading::GradingService;
use sandbox_grader::sandbox::DockerRunner;
use sandbox_grader::{http, mcp};

#[derive(Parser, Debug)]
#[command(name = "sandbox-grader")]
#[command(about = "Grade submissions against hidden tests in an isolated sandbox")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run in stdio mode (for MCP clients) instead of serving HTTP
    #[arg(long)]
    stdio: bool,

    /// HTTP listen address
    #[arg(long, env = "GRADER_LISTEN")]
    listen: Option<SocketAddr>,

    /// HTTP port when --listen is not given
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays free for MCP
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    info!(
        runtime = %config.sandbox.runtime,
        image = %config.sandbox.image,
        cases_dir = %config.catalog.cases_dir.display(),
        timeout = ?config.sandbox.timeout(),
        "Loaded configuration"
    );

    let catalog = Arc::new(FlatFileCatalog::new(
        config.catalog.cases_dir.clone(),
        config.catalog.questions_dir.clone(),
    ));
    let runner = DockerRunner::from_settings(&config.sandbox);
    let service = Arc::new(GradingService::from_config(&config, catalog, runner));

    if args.stdio {
        mcp::serve_stdio(service).await?;
    } else {
        let addr = args
            .listen
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], args.port)));
        http::serve(service, addr).await?;
    }

    Ok(())
}
