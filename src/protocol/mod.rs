//! framecho Protocol
//!
//! The wire protocol is deliberately tiny:
//!
//! - Server → client, once on connect: the ready byte `*` (0x2A).
//! - Client → server: an arbitrary byte stream. Bytes between `^` and `$`
//!   are echoed back incremented by one (mod 256). Everything else,
//!   including both delimiters, produces no output.
//!
//! There is no error signalling on the wire. A server-side failure shows up
//! to the client as the connection closing.
//!
//! ## Modules
//!
//! - `frame`: the transport-independent state machine
//!
//! ## Example
//!
//! ```
//! use bytes::BytesMut;
//! use framecho::protocol::FrameProcessor;
//!
//! let mut processor = FrameProcessor::new();
//! let mut out = BytesMut::new();
//! processor.feed(b"^ab$cd^e$", &mut out);
//! assert_eq!(&out[..], b"bcf");
//! ```

pub mod frame;

// Re-export commonly used types for convenience
pub use frame::{process, FrameProcessor, ProcessingState, MESSAGE_END, MESSAGE_START};

/// The byte sent to every client as soon as its connection is picked up.
pub const READY_SIGNAL: u8 = b'*';
