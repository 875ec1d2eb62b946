//! Connection Handler Module
//!
//! This module drives a single client connection through the frame
//! processor. One handler owns one connection for its whole life; no other
//! task ever touches the stream or its processing state.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Worker picks the connection off the pool queue
//!        │
//!        ▼
//! 2. Send ready byte '*'
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read up to 1 KiB        │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Feed FrameProcessor     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Write produced bytes    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. EOF / read error / write error
//!        │
//!        ▼
//! 5. Shut the stream down, log, release the worker
//! ```
//!
//! ## Buffer Management
//!
//! Reads land in a fixed 1 KiB chunk. The bytes a chunk produces are
//! collected in a `BytesMut` and written in one go, so ordering within the
//! connection is exactly the arrival order.

use crate::protocol::{FrameProcessor, READY_SIGNAL};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Maximum number of bytes taken from the socket per read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// What a finished connection did, reported when it closes cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// The peer that was served
    pub peer: SocketAddr,
    /// Bytes received from the peer
    pub bytes_read: u64,
    /// Bytes sent to the peer, including the ready signal
    pub bytes_written: u64,
}

/// Handles a single client connection.
///
/// Generic over the stream so the same code serves `TcpStream`s in
/// production and in-memory pipes in tests.
pub struct ConnectionHandler<S> {
    /// The client stream; writes are buffered and flushed per chunk
    stream: BufWriter<S>,

    /// Client's address (for logging)
    peer: SocketAddr,

    /// Protocol state for this connection
    processor: FrameProcessor,

    /// Bytes produced by the current chunk
    output: BytesMut,

    bytes_read: u64,
    bytes_written: u64,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted client stream
    /// * `peer` - The client's socket address
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            stream: BufWriter::new(stream),
            peer,
            processor: FrameProcessor::new(),
            output: BytesMut::with_capacity(READ_CHUNK_SIZE),
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Runs the connection to completion.
    ///
    /// The stream is shut down exactly once before this returns, whatever
    /// ended the loop.
    pub async fn run(mut self) -> Result<ConnectionSummary, ConnectionError> {
        info!(peer = %self.peer, "Client connected");

        let result = self.serve().await;

        self.close().await;

        match &result {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => {
                debug!(peer = %self.peer, error = %e, "Connection dropped by peer")
            }
            Err(e) => warn!(peer = %self.peer, error = %e, "Connection error"),
        }

        info!(
            peer = %self.peer,
            bytes_read = self.bytes_read,
            bytes_written = self.bytes_written,
            "Client disconnected"
        );

        result.map(|()| self.summary())
    }

    fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            peer: self.peer,
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
        }
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        self.send_ready().await.map_err(ConnectionError::Handshake)?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = self.stream.get_mut().read(&mut chunk).await?;
            if n == 0 {
                trace!(peer = %self.peer, "End of stream");
                return Ok(());
            }
            self.bytes_read += n as u64;

            self.output.clear();
            let produced = self.processor.feed(&chunk[..n], &mut self.output);
            trace!(
                peer = %self.peer,
                read = n,
                produced = produced,
                state = ?self.processor.state(),
                "Processed chunk"
            );

            if produced > 0 {
                self.stream.write_all(&self.output).await?;
                self.stream.flush().await?;
                self.bytes_written += produced as u64;
            }
        }
    }

    async fn send_ready(&mut self) -> io::Result<()> {
        self.stream.write_all(&[READY_SIGNAL]).await?;
        self.stream.flush().await?;
        self.bytes_written += 1;
        Ok(())
    }

    /// Shuts down both directions. Goes straight to the inner stream: the
    /// write buffer is only non-empty after a failed write, and those bytes
    /// must not be retried. Errors here only mean the peer is already gone.
    async fn close(&mut self) {
        if let Err(e) = self.stream.get_mut().shutdown().await {
            trace!(peer = %self.peer, error = %e, "Shutdown after close");
        }
    }
}

/// Errors that can end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The ready signal could not be delivered
    #[error("failed to send ready signal: {0}")]
    Handshake(#[source] io::Error),

    /// Read or write failure on the stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// The underlying I/O error.
    pub fn io_error(&self) -> &io::Error {
        match self {
            ConnectionError::Handshake(e) | ConnectionError::Io(e) => e,
        }
    }

    /// True when the error just means the peer went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self.io_error().kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        )
    }
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. Errors stop
/// here: they are logged by the handler and never reach the caller.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, peer);
    if let Err(e) = handler.run().await {
        trace!(peer = %peer, error = %e, "Connection ended with error");
    }
}
