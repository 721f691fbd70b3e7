//! Record framing for HSPICE binary files.
//!
//! HSPICE wraps both its header text and its sample data in length-framed
//! records: a 16-byte header `{h1, h2, h3, nbytes}` of 32-bit words with
//! `h1 = h3 = 4`, the payload, then a 32-bit trailer repeating `nbytes`.
//! Files written on an opposite-endian machine show the sentinel words as
//! `0x04000000`; when that is detected every 32-bit word in the record
//! (including float payload words and the trailer) is byte-swapped on read.
//! The swap state is re-detected at every record boundary.

use byteorder::{NativeEndian, ReadBytesExt};
use log::{debug, error};
use std::io::{ErrorKind, Read};

use crate::error::StreamError;

/// Record sentinel as written by a same-endian producer.
const SENTINEL: u32 = 0x0000_0004;
/// Record sentinel as seen when the producer had the opposite endianness.
const SENTINEL_SWAPPED: u32 = 0x0400_0000;

/// Parsed record header: payload length plus the detected swap state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockHeader {
    pub nbytes: usize,
    pub swapped: bool,
}

fn read_word<R: Read>(source: &mut R, swapped: bool) -> std::io::Result<u32> {
    let word = source.read_u32::<NativeEndian>()?;
    Ok(if swapped { word.swap_bytes() } else { word })
}

/// Read and validate a 16-byte record header.
///
/// Returns `Ok(None)` at end of input (including a truncated header, which
/// the writers produce when killed mid-run). A sentinel mismatch is a
/// framing corruption error.
pub(crate) fn read_block_header<R: Read>(
    source: &mut R,
) -> Result<Option<BlockHeader>, StreamError> {
    let mut words = [0u32; 4];
    for (i, word) in words.iter_mut().enumerate() {
        match source.read_u32::<NativeEndian>() {
            Ok(w) => *word = w,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                if i > 0 {
                    debug!("EOF inside record header");
                } else {
                    debug!("EOF reading record header");
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let swapped = words[0] == SENTINEL_SWAPPED && words[2] == SENTINEL_SWAPPED;
    if swapped {
        for word in &mut words {
            *word = word.swap_bytes();
        }
    }
    if words[0] != SENTINEL || words[2] != SENTINEL {
        error!(
            "unexpected values in record header: {:#010x} {:#010x}",
            words[0], words[2]
        );
        return Err(StreamError::Corrupt {
            message: "bad sentinel in record header".to_string(),
        });
    }

    Ok(Some(BlockHeader {
        nbytes: words[3] as usize,
        swapped,
    }))
}

/// Read one whole record into `buf` at `offset`, growing the buffer as
/// needed, and verify the trailer.
///
/// Growth doubles the buffer or makes room for two records of this size,
/// whichever is larger. Returns the payload length, or `Ok(None)` at end of
/// input.
pub(crate) fn read_block_into<R: Read>(
    source: &mut R,
    buf: &mut Vec<u8>,
    offset: usize,
) -> Result<Option<usize>, StreamError> {
    let header = match read_block_header(source)? {
        Some(h) => h,
        None => return Ok(None),
    };

    if buf.len() < offset + header.nbytes {
        let doubled = buf.len() * 2;
        let two_blocks = buf.len() + 2 * header.nbytes;
        buf.resize(doubled.max(two_blocks), 0);
    }

    if let Err(e) = source.read_exact(&mut buf[offset..offset + header.nbytes]) {
        if e.kind() == ErrorKind::UnexpectedEof {
            debug!("EOF reading record body");
            return Ok(None);
        }
        return Err(e.into());
    }

    match read_word(source, header.swapped) {
        Ok(trailer) if trailer as usize == header.nbytes => Ok(Some(header.nbytes)),
        Ok(trailer) => {
            error!(
                "record trailer mismatch: header says {} bytes, trailer says {}",
                header.nbytes, trailer
            );
            Err(StreamError::Corrupt {
                message: "record trailer mismatch".to_string(),
            })
        }
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            debug!("EOF reading record trailer");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Value-by-value reader over the record stream.
///
/// HSPICE sometimes writes very large records, so sample extraction never
/// buffers a whole payload; record boundaries are crossed by consuming the
/// trailer and the next header in place. The swap flag is re-evaluated at
/// each boundary.
#[derive(Debug)]
pub(crate) struct BlockStream {
    expected_vals: usize,
    read_vals: usize,
    swapped: bool,
}

impl BlockStream {
    /// Consume the first record header and position the stream at its
    /// payload. Returns `Ok(None)` at end of input.
    pub(crate) fn open<R: Read>(source: &mut R) -> Result<Option<Self>, StreamError> {
        let header = match read_block_header(source)? {
            Some(h) => h,
            None => return Ok(None),
        };
        Ok(Some(Self {
            expected_vals: header.nbytes / 4,
            read_vals: 0,
            swapped: header.swapped,
        }))
    }

    /// Pull the next 32-bit float from the payload, crossing record
    /// boundaries as needed.
    ///
    /// Returns `Ok(None)` at end of input. Framing inconsistencies are
    /// corruption errors.
    pub(crate) fn next_value<R: Read>(
        &mut self,
        source: &mut R,
    ) -> Result<Option<f64>, StreamError> {
        if self.read_vals >= self.expected_vals {
            match read_word(source, self.swapped) {
                Ok(trailer) => {
                    if trailer as usize != self.expected_vals * 4 {
                        error!("record trailer mismatch in sample data");
                        return Err(StreamError::Corrupt {
                            message: "record trailer mismatch in sample data".to_string(),
                        });
                    }
                }
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("EOF reading record trailer");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }

            match read_block_header(source)? {
                Some(header) => {
                    self.expected_vals = header.nbytes / 4;
                    self.read_vals = 0;
                    self.swapped = header.swapped;
                }
                None => return Ok(None),
            }
        }

        let raw = match source.read_u32::<NativeEndian>() {
            Ok(w) => w,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                error!("unexpected EOF in sample data");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        self.read_vals += 1;

        let bits = if self.swapped { raw.swap_bytes() } else { raw };
        Ok(Some(f32::from_bits(bits) as f64))
    }
}
