//! Newline framing for the device byte stream.

use crate::frame::Frame;
use crate::ProtocolError;

/// Default cap on a single frame, newline excluded.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4096;

/// Accumulates raw bytes and yields one decode result per complete line.
///
/// Partial trailing data stays buffered until the next [`feed`](Self::feed).
/// A line longer than the cap is discarded up to its newline and reported
/// once as [`ProtocolError::Oversized`], however it was chunked.
#[derive(Debug)]
pub struct LineCodec {
    buf: Vec<u8>,
    max_frame_bytes: usize,
    /// Dropping the remainder of an oversized line.
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LineCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Append `bytes` and decode every complete line, in order.
    ///
    /// Blank lines are skipped silently.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Frame, ProtocolError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            let newline = self.buf.iter().position(|b| *b == b'\n');

            if self.discarding {
                match newline {
                    Some(pos) => {
                        self.buf.drain(..=pos);
                        self.discarding = false;
                        continue;
                    }
                    None => {
                        self.buf.clear();
                        break;
                    }
                }
            }

            let Some(pos) = newline else {
                if self.buf.len() > self.max_frame_bytes {
                    self.buf.clear();
                    self.discarding = true;
                    out.push(Err(ProtocolError::Oversized {
                        limit: self.max_frame_bytes,
                    }));
                }
                break;
            };

            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.len() > self.max_frame_bytes {
                out.push(Err(ProtocolError::Oversized {
                    limit: self.max_frame_bytes,
                }));
                continue;
            }
            if let Some(result) = decode_line(line) {
                out.push(result);
            }
        }

        out
    }

    /// Drop any buffered partial line (e.g. after the link was replaced).
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Bytes currently buffered without a terminating newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(line: &[u8]) -> Option<Result<Frame, ProtocolError>> {
    let text = match std::str::from_utf8(line) {
        Ok(t) => t.trim(),
        Err(e) => return Some(Err(e.into())),
    };
    if text.is_empty() {
        return None;
    }
    Some(Frame::decode(text))
}
