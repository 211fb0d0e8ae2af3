//! # Line Framer
//!
//! Reassembles delimiter-terminated frames from arbitrary byte chunks as they
//! arrive from the serial link.

use bytes::{Buf, BytesMut};
use tracing::warn;

use super::MAX_LINE_LEN;

/// One framed line, or an over-long line that was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramedLine {
    Line(String),
    Overflow(usize),
}

/// Splits a byte stream on a single delimiter byte
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    delimiter: u8,
    discarding: bool,
}

impl LineFramer {
    pub fn new(delimiter: u8) -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_LINE_LEN),
            delimiter,
            discarding: false,
        }
    }

    /// Append raw bytes from the link
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete line, if any
    ///
    /// A trailing `\r` is stripped and empty lines are skipped. Bytes that are
    /// not valid UTF-8 are replaced, which later fails frame validation.
    pub fn next_line(&mut self) -> Option<FramedLine> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == self.delimiter) else {
                if self.buffer.len() > MAX_LINE_LEN {
                    let dropped = self.buffer.len();
                    self.buffer.clear();
                    self.discarding = true;
                    warn!("Dropping {} bytes of unterminated sensor data", dropped);
                    return Some(FramedLine::Overflow(dropped));
                }
                return None;
            };

            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);

            // Tail of a line that already overflowed
            if self.discarding {
                self.discarding = false;
                continue;
            }

            if line.len() > MAX_LINE_LEN {
                return Some(FramedLine::Overflow(line.len()));
            }

            let mut text = String::from_utf8_lossy(&line).into_owned();
            if text.ends_with('\r') {
                text.pop();
            }
            if text.trim().is_empty() {
                continue;
            }
            return Some(FramedLine::Line(text));
        }
    }

    /// Bytes held waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
