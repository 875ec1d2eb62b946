//! # framecho - A Bounded Worker-Pool TCP Server
//!
//! framecho accepts TCP connections, hands each one to a fixed-size pool of
//! workers, and speaks a tiny framing protocol on every connection: bytes
//! between `^` and `$` are echoed back incremented by one.
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most N connections are processed at once
//! - **Never-blocking accept**: excess connections wait in the pool queue
//! - **Streaming protocol**: message regions may span any read boundaries
//! - **Graceful shutdown**: Ctrl+C closes the listener and drains the pool
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              framecho                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Accept Loop │───>│ WorkerPool  │───>│ Connection  │                  │
//! │  │ (Listener)  │    │ (N workers) │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │                                        ┌─────────────┐                  │
//! │                                        │   Frame     │                  │
//! │                                        │  Processor  │                  │
//! │                                        └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use framecho::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config {
//!         port: 9090,
//!         pool_size: 64,
//!         ..Default::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Protocol
//!
//! ```text
//! server -> client   '*'                     once, when a worker picks the connection up
//! client -> server   noise ^ a b $ noise     bytes outside ^...$ are ignored
//! server -> client   b c                     each byte inside is sent back + 1 (mod 256)
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: The per-byte frame state machine
//! - [`connection`]: Per-connection I/O loop
//! - [`pool`]: Bounded worker pool with a FIFO queue
//! - [`server`]: Listener, accept loop and shutdown
//! - [`config`]: Command-line configuration

pub mod config;
pub mod connection;
pub mod pool;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError};
pub use connection::{handle_connection, ConnectionError, ConnectionHandler, ConnectionSummary};
pub use pool::{PoolError, PoolStats, WorkerPool};
pub use protocol::{FrameProcessor, ProcessingState};
pub use server::{Server, ServerError};

/// The default port framecho listens on
pub const DEFAULT_PORT: u16 = 9090;

/// The default host framecho binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default number of pool workers
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Version of framecho
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
