//! # Network Module
//!
//! Framing for the robot's line based control stream.
//!
//! Each frame on the control stream is ASCII text terminated by a carriage
//! return (byte 13) which is followed by exactly one extra byte (normally a
//! line feed). The extra byte carries no information and is discarded. Frames
//! may be split across any number of reads, so the reader accumulates bytes
//! until a terminator is seen.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Byte marking the end of a frame.
pub const FRAME_TERMINATOR: u8 = 13;

/// Maximum length of a partial frame. If the accumulated bytes grow beyond this without a
/// terminator they are dropped.
pub const MAX_PARTIAL_FRAME_LEN: usize = 5000;

/// Default port of the robot's control stream.
pub const DEFAULT_CONTROL_PORT: u16 = 7777;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Reassembles frames from the raw bytes read off the control stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,

    /// True if the next byte follows a terminator and must be dropped.
    skip_next: bool,

    num_overflows: u64,
    num_invalid: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push newly read bytes into the reader, returning every frame they complete in the order
    /// they were received.
    ///
    /// Frames which are not valid UTF-8, and empty frames, are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();

        for &b in bytes {
            if self.skip_next {
                self.skip_next = false;
                continue;
            }

            if b == FRAME_TERMINATOR {
                self.skip_next = true;

                let raw = std::mem::take(&mut self.buf);
                if raw.is_empty() {
                    continue;
                }

                match String::from_utf8(raw) {
                    Ok(s) => frames.push(s),
                    Err(_) => {
                        self.num_invalid += 1;
                        trace!("Dropping frame which is not valid UTF-8");
                    }
                }
            } else {
                self.buf.push(b);

                if self.buf.len() > MAX_PARTIAL_FRAME_LEN {
                    self.buf.clear();
                    self.num_overflows += 1;
                    trace!(
                        "Partial frame exceeded {} bytes and was dropped",
                        MAX_PARTIAL_FRAME_LEN
                    );
                }
            }
        }

        frames
    }

    /// Discard any partially received frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.skip_next = false;
    }

    /// Number of bytes currently held in the partial frame.
    pub fn partial_len(&self) -> usize {
        self.buf.len()
    }

    /// Number of partial frames dropped for exceeding the maximum length.
    pub fn num_overflows(&self) -> u64 {
        self.num_overflows
    }

    /// Number of frames dropped for not being valid UTF-8.
    pub fn num_invalid(&self) -> u64 {
        self.num_invalid
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_read() {
        let mut reader = FrameReader::new();
        let frames = reader.push(b".wheels#1;2;3;4\r\n.odom#0.1\r\n");
        assert_eq!(frames, vec![".wheels#1;2;3;4", ".odom#0.1"]);
        assert_eq!(reader.partial_len(), 0);
    }

    #[test]
    fn test_split_reads() {
        let mut reader = FrameReader::new();

        assert!(reader.push(b".whe").is_empty());
        assert!(reader.push(b"els#1;2;3;4").is_empty());

        // Terminator at the end of one read, the discarded byte at the start of the next
        assert_eq!(reader.push(b"\r"), vec![".wheels#1;2;3;4"]);
        assert_eq!(reader.push(b"\n.odom#1\r\n"), vec![".odom#1"]);
    }

    #[test]
    fn test_byte_after_terminator_is_discarded() {
        let mut reader = FrameReader::new();

        // Whatever byte follows the terminator is dropped, not only line feeds
        let frames = reader.push(b"abc\rXdef\r\n");
        assert_eq!(frames, vec!["abc", "def"]);
    }

    #[test]
    fn test_overflow_drops_partial() {
        let mut reader = FrameReader::new();

        let junk = vec![b'x'; MAX_PARTIAL_FRAME_LEN + 10];
        assert!(reader.push(&junk).is_empty());
        assert_eq!(reader.num_overflows(), 1);
        assert_eq!(reader.partial_len(), 9);

        reader.reset();
        assert_eq!(reader.push(b".odom#1\r\n"), vec![".odom#1"]);
    }

    #[test]
    fn test_invalid_utf8_dropped() {
        let mut reader = FrameReader::new();

        let frames = reader.push(b"\xff\xfe\r\n.odom#2\r\n");
        assert_eq!(frames, vec![".odom#2"]);
        assert_eq!(reader.num_invalid(), 1);
    }
}
