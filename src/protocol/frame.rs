//! Streaming Frame Processor
//!
//! This module implements the per-byte state machine behind the framecho
//! protocol. It has no knowledge of sockets: it consumes raw bytes and
//! produces transformed bytes, nothing more.
//!
//! ## Protocol
//!
//! ```text
//!                 '^'
//!   ┌─────────────────────────────┐
//!   │                             ▼
//! ┌─────────────────┐       ┌─────────────┐
//! │ WaitingForStart │       │  InMessage  │ ── other byte b ──> emit b + 1
//! │ (discard bytes) │       │             │
//! └─────────────────┘       └─────────────┘
//!   ▲                             │
//!   └─────────────────────────────┘
//!                 '$'
//! ```
//!
//! The delimiters are never emitted. A `^` seen while already inside a
//! message is plain data and comes back as `_`.
//!
//! ## Streaming
//!
//! The only memory is the current [`ProcessingState`], so a message region
//! may be split across any number of TCP reads.

use bytes::{BufMut, BytesMut};

/// Marks the start of a message region.
pub const MESSAGE_START: u8 = b'^';

/// Marks the end of a message region.
pub const MESSAGE_END: u8 = b'$';

/// Where the processor is relative to a message region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessingState {
    /// Outside a region; bytes are discarded until `^`.
    #[default]
    WaitingForStart,
    /// Inside a region; bytes are incremented and emitted until `$`.
    InMessage,
}

/// Runs one byte through the state machine.
///
/// Returns the next state and the byte to emit, if any. Total over every
/// byte value and both states.
#[inline]
pub fn process(state: ProcessingState, byte: u8) -> (ProcessingState, Option<u8>) {
    match state {
        ProcessingState::WaitingForStart => match byte {
            MESSAGE_START => (ProcessingState::InMessage, None),
            _ => (ProcessingState::WaitingForStart, None),
        },
        ProcessingState::InMessage => match byte {
            MESSAGE_END => (ProcessingState::WaitingForStart, None),
            _ => (ProcessingState::InMessage, Some(byte.wrapping_add(1))),
        },
    }
}

/// Per-connection wrapper around [`process`] that remembers the state
/// between chunks.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use framecho::protocol::{FrameProcessor, ProcessingState};
///
/// let mut processor = FrameProcessor::new();
/// let mut out = BytesMut::new();
///
/// processor.feed(b"xx^ab", &mut out);
/// assert_eq!(processor.state(), ProcessingState::InMessage);
///
/// processor.feed(b"c$yy", &mut out);
/// assert_eq!(&out[..], b"bcd");
/// ```
#[derive(Debug, Default)]
pub struct FrameProcessor {
    state: ProcessingState,
}

impl FrameProcessor {
    /// Creates a processor in [`ProcessingState::WaitingForStart`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    pub fn state(&self) -> ProcessingState {
        self.state
    }

    /// Processes `input` in order, appending every produced byte to `out`.
    ///
    /// Returns how many bytes were appended.
    pub fn feed(&mut self, input: &[u8], out: &mut BytesMut) -> usize {
        let before = out.len();
        out.reserve(input.len());

        for &byte in input {
            let (next, emitted) = process(self.state, byte);
            self.state = next;
            if let Some(b) = emitted {
                out.put_u8(b);
            }
        }

        out.len() - before
    }
}
