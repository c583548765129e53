//! Serve command: runs the HTTP API.

use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::cli::common::{StoreArgs, EXIT_SUCCESS};
use crate::web;

/// Start the HTTP API
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

impl ServeArgs {
    /// Execute the serve command
    pub fn execute(&self) -> Result<ExitCode> {
        let config = self.store.load_config()?;
        let inventory_path = self.store.inventory_path(&config)?;

        let host = self.host.as_deref().unwrap_or(&config.server.host);
        let port = self.port.unwrap_or(config.server.port);
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .context(format!("Invalid listen address: {host}:{port}"))?;

        info!("Inventory: {}", inventory_path.display());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        runtime.block_on(web::run_server(config, inventory_path, addr))?;

        Ok(ExitCode::from(EXIT_SUCCESS))
    }
}
