use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod cli;

use llmgate_core::{Gateway, WreqUpstreamClient};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("llmgate failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Cli::parse().into_config()?;
    info!(
        host = %config.host,
        port = config.port,
        azure = config.azure_mode(),
        base_url = %config.base_url.as_deref().unwrap_or(""),
        access_codes = config.access_codes.len(),
        disable_gpt4 = config.disable_gpt4,
        "config loaded"
    );

    let client = Arc::new(WreqUpstreamClient::new(config.proxy.as_deref())?);
    let bind = format!("{}:{}", config.host, config.port);
    let gateway = Gateway::new(config, client);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, gateway.router()).await?;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("llmgate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
