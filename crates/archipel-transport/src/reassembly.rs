//! Per-connection frame reassembly over a byte stream.
//!
//! The wire is a concatenation of ARCHIPEL frames with no outer
//! delimiter: the dispatcher waits for the fixed 41-byte header, reads the
//! declared `payload_len`, then waits for `41 + payload_len + 32` bytes
//! total before extracting one frame. Anything left over after extraction
//! remains buffered for the next call.

use archipel_proto::frame::{HEADER_SIZE, MAC_SIZE};

/// Accumulates bytes read from a socket and yields complete frames as they
/// become available.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buf: Vec<u8>,
}

impl FrameReassembler {
    /// Create an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append freshly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop one complete frame's raw bytes out of the buffer, if enough data
    /// has accumulated. Returns `None` when only a partial frame is
    /// buffered so far; the partial bytes are left in place for the next
    /// `feed`.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < HEADER_SIZE {
            return None;
        }

        let len_offset = HEADER_SIZE - 4;
        let payload_len = u32::from_be_bytes([
            self.buf[len_offset],
            self.buf[len_offset + 1],
            self.buf[len_offset + 2],
            self.buf[len_offset + 3],
        ]) as usize;

        let total_len = HEADER_SIZE + payload_len + MAC_SIZE;
        if self.buf.len() < total_len {
            return None;
        }

        let frame = self.buf[..total_len].to_vec();
        self.buf.drain(..total_len);
        Some(frame)
    }

    /// Drain every complete frame currently buffered.
    pub fn drain_frames(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archipel_proto::frame;
    use archipel_proto::PacketType;

    #[test]
    fn single_frame_fed_whole_is_extracted_immediately() {
        let key = b"key";
        let built = frame::build(PacketType::Ack, &[7u8; 32], b"payload", key);
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(&built);
        let extracted = reassembler.next_frame().unwrap();
        assert_eq!(extracted, built);
        assert!(reassembler.next_frame().is_none());
    }

    #[test]
    fn frame_fed_one_byte_at_a_time_still_reassembles() {
        let key = b"key";
        let built = frame::build(PacketType::Msg, &[9u8; 32], b"chunked feed test", key);
        let mut reassembler = FrameReassembler::new();
        for byte in &built[..built.len() - 1] {
            reassembler.feed(&[*byte]);
            assert!(reassembler.next_frame().is_none());
        }
        reassembler.feed(&built[built.len() - 1..]);
        let extracted = reassembler.next_frame().unwrap();
        assert_eq!(extracted, built);
    }

    #[test]
    fn two_back_to_back_frames_both_drain() {
        let key = b"key";
        let first = frame::build(PacketType::Ack, &[1u8; 32], b"one", key);
        let second = frame::build(PacketType::Ack, &[2u8; 32], b"two", key);
        let mut reassembler = FrameReassembler::new();
        reassembler.feed(&first);
        reassembler.feed(&second);
        let frames = reassembler.drain_frames();
        assert_eq!(frames, vec![first, second]);
    }
}
