//! Worker Pool Module
//!
//! Bounds how many connections are processed at once. The accept loop hands
//! every new connection to the pool and goes straight back to accepting;
//! the pool runs at most N of them and queues the rest.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                            │
//! │                                                             │
//! │   ┌──────────────────────────────┐                          │
//! │   │ FIFO job queue (unbounded)   │<── submit()              │
//! │   └──────────────┬───────────────┘                          │
//! │                  │                                          │
//! │     ┌────────────┼────────────┐                             │
//! │     ▼            ▼            ▼                             │
//! │ ┌────────┐  ┌────────┐   ┌────────┐                         │
//! │ │Worker 0│  │Worker 1│...│Worker N│                         │
//! │ └────────┘  └────────┘   └────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Bounded**: never more than N jobs running
//! - **Non-blocking submit**: the queue has no capacity limit
//! - **Graceful drain**: shutdown finishes queued jobs before returning

pub mod worker;

// Re-export commonly used types
pub use worker::{Job, PoolError, PoolStats, WorkerPool, DRAIN_REPORT_INTERVAL};
