//! Byte-buffered line reader shared by every text-format parser.
//!
//! Reads variable-length lines from a byte source into a reusable buffer
//! that grows by doubling. The terminator is not stored.

use std::borrow::Cow;
use std::io::{ErrorKind, Read};

use crate::error::StreamError;

/// Initial line buffer capacity in bytes.
const INITIAL_CAPACITY: usize = 1024;

/// Outcome of a single line read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineStatus {
    /// A complete line terminated by `\n` was read.
    Line,
    /// End of input was reached with a partial line flushed into the buffer.
    Partial,
    /// End of input was reached with no bytes available.
    Eof,
}

/// Reusable growable line buffer.
///
/// The buffer contents are valid until the next `read_line` call; its
/// backing storage may move when the buffer grows.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Read bytes up to and including the next `\n`, storing the line
    /// without the terminator.
    pub(crate) fn read_line<R: Read>(&mut self, source: &mut R) -> Result<LineStatus, StreamError> {
        self.buf.clear();

        let mut byte = [0u8; 1];
        loop {
            match source.read(&mut byte) {
                Ok(0) => {
                    return if self.buf.is_empty() {
                        Ok(LineStatus::Eof)
                    } else {
                        Ok(LineStatus::Partial)
                    };
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        return Ok(LineStatus::Line);
                    }
                    if self.buf.len() == self.buf.capacity() {
                        // Double the buffer rather than growing byte by byte.
                        self.buf.reserve(self.buf.capacity().max(INITIAL_CAPACITY));
                    }
                    self.buf.push(byte[0]);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Raw bytes of the current line.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Current line as text. These formats are ASCII; anything else is
    /// replaced rather than rejected here (the format guards do that).
    pub(crate) fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    /// Remove trailing whitespace from the current line.
    pub(crate) fn trim_end_in_place(&mut self) {
        while self
            .buf
            .last()
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.buf.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reads_lines_without_terminator() {
        let mut source = Cursor::new(b"one\ntwo\n".to_vec());
        let mut line = LineBuffer::new();

        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Line);
        assert_eq!(line.bytes(), b"one");
        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Line);
        assert_eq!(line.bytes(), b"two");
        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Eof);
    }

    #[test]
    fn test_partial_final_line() {
        let mut source = Cursor::new(b"alpha\nbeta".to_vec());
        let mut line = LineBuffer::new();

        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Line);
        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Partial);
        assert_eq!(line.bytes(), b"beta");
        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Eof);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let long = vec![b'x'; 5000];
        let mut data = long.clone();
        data.push(b'\n');
        let mut source = Cursor::new(data);
        let mut line = LineBuffer::new();

        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Line);
        assert_eq!(line.bytes(), long.as_slice());
    }

    #[test]
    fn test_empty_line() {
        let mut source = Cursor::new(b"\nafter\n".to_vec());
        let mut line = LineBuffer::new();

        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Line);
        assert_eq!(line.len(), 0);
        assert_eq!(line.read_line(&mut source).unwrap(), LineStatus::Line);
        assert_eq!(line.text(), "after");
    }

    #[test]
    fn test_trim_end_in_place() {
        let mut source = Cursor::new(b"value   \t\n".to_vec());
        let mut line = LineBuffer::new();

        line.read_line(&mut source).unwrap();
        line.trim_end_in_place();
        assert_eq!(line.bytes(), b"value");
    }
}
