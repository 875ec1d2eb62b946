//! framecho - Bounded Worker-Pool TCP Server
//!
//! This is the main entry point for the framecho server.
//! It parses the command line, sets up logging, and runs the server until
//! Ctrl+C.

use clap::Parser;
use framecho::{Config, Server};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
  __                                _
 / _|_ __ __ _ _ __ ___   ___  ___| |__   ___
| |_| '__/ _` | '_ ` _ \ / _ \/ __| '_ \ / _ \
|  _| | | (_| | | | | | |  __/ (__| | | | (_) |
|_| |_|  \__,_|_| |_| |_|\___|\___|_| |_|\___/

framecho v{} - Bounded Worker-Pool TCP Server
──────────────────────────────────────────────────────────────
Binding {} with {} workers

Use Ctrl+C to shutdown gracefully.
"#,
        framecho::VERSION,
        config.bind_address(),
        config.pool_size
    );
}

/// Resolves on Ctrl+C. If the handler cannot be installed the server keeps
/// running until killed.
async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping server..."),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();

    // Set up logging; RUST_LOG wins over --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    let server = Server::bind(config).await?;
    server.run(shutdown_signal()).await?;

    Ok(())
}
