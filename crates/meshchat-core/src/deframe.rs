//! Stream de-framer: cuts a TCP byte stream back into whole frames.
//!
//! One de-framer per connection. Bytes are pushed as they arrive; complete
//! frames queue up in arrival order and any partial frame stays buffered
//! until the rest of it shows up. A header announcing a frame larger than
//! the configured limit poisons the stream instead of growing the buffer.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::wire::{peek_payload_size, WireError, HEADER_LEN};

/// Largest whole frame (header included) accepted unless configured.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct StreamDeframer {
    buffer: BytesMut,
    frames: VecDeque<Bytes>,
    max_frame: usize,
}

impl Default for StreamDeframer {
    fn default() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl StreamDeframer {
    pub fn new() -> Self {
        Self::default()
    }

    /// De-framer that rejects frames longer than `max_frame` bytes.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            frames: VecDeque::new(),
            max_frame: max_frame.max(HEADER_LEN),
        }
    }

    /// Append freshly read bytes and split off every frame now complete.
    ///
    /// Returns how many frames were completed by this push. An error means
    /// the header at the front of the buffer can never parse; the stream is
    /// unusable past that point.
    pub fn push(&mut self, bytes: &[u8]) -> Result<usize, WireError> {
        self.buffer.extend_from_slice(bytes);

        let mut completed = 0;
        // Each pass removes at least HEADER_LEN bytes or returns.
        loop {
            if self.buffer.len() < HEADER_LEN {
                return Ok(completed);
            }
            let size = peek_payload_size(&self.buffer)?;
            let frame_len = match HEADER_LEN.checked_add(size) {
                Some(n) => n,
                None => return Err(WireError::MalformedFrame),
            };
            if frame_len > self.max_frame {
                return Err(WireError::MalformedFrame);
            }
            if self.buffer.len() < frame_len {
                return Ok(completed);
            }
            let frame = self.buffer.split_to(frame_len).freeze();
            self.frames.push_back(frame);
            completed += 1;
        }
    }

    /// Oldest complete frame, if any.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Complete frames waiting to be taken.
    pub fn pending_frames(&self) -> usize {
        self.frames.len()
    }

    /// Bytes held that do not yet form a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
