//! Server Module
//!
//! Owns the listening socket and the worker pool, and wires one to the
//! other.
//!
//! ## Shutdown Sequence
//!
//! ```text
//! shutdown future resolves
//!        │
//!        ▼
//! stop accepting, close listener
//!        │
//!        ▼
//! pool.shutdown(): no new jobs, queued + in-flight jobs run to completion
//!        │
//!        ▼
//! Server::run returns
//! ```

pub mod listener;

pub use listener::{Server, ServerError, ACCEPT_BACKOFF, LISTEN_BACKLOG};
