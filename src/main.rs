//! Shared Document Server - Entry Point
//!
//! Loads configuration, binds the listener and runs the accept loop.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use collab_hub::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=collab_hub=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("collab_hub=info")),
        )
        .init();

    let mut config = ServerConfig::from_env()?;

    // Bind address from command line overrides the environment
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    let server = Server::bind(config).await?;
    info!("Shared document server started");

    server.run().await?;
    Ok(())
}
