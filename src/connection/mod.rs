//! Connection Handler Module
//!
//! This module manages individual client connections to framecho.
//! Each connection is run by one pool worker from the ready signal to the
//! final shutdown, so a slow client only ever occupies its own worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Accept Loop                             │
//! │                    (server module)                          │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ submit()
//!                        ▼
//!           ┌────────────────────────┐
//!           │  WorkerPool (N slots)  │
//!           └────────────┬───────────┘
//!                        │
//!                        │ worker runs
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read chunk  │───>│ Frame proc. │───>│ Write bytes │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use framecho::connection::handle_connection;
//!
//! let (stream, addr) = listener.accept().await?;
//! pool.submit(handle_connection(stream, addr))?;
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, ConnectionError, ConnectionHandler, ConnectionSummary, READ_CHUNK_SIZE,
};
