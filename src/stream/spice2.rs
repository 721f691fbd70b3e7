//! Berkeley Spice2G6 rawfiles.
//!
//! A fixed binary layout: the 8-byte `rawfile1` magic, a header with
//! title, date, time, mode and variable count, 8-byte variable-name
//! records, type and location words, and a plot title. Rows follow as one
//! 8-byte value per variable; a value whose bytes repeat the magic marks
//! the start of another analysis and ends the current stream.

use byteorder::{NativeEndian, ReadBytesExt};
use log::{debug, error};
use std::io::{ErrorKind, Read, Seek};

use crate::error::StreamError;
use crate::stream::{Decoder, Format, HeaderInfo, ReadStatus, RowContext, VarKind, Variable};

const MAGIC: &[u8; 8] = b"rawfile1";
const TITLE_LEN: usize = 80;
const DATE_LEN: usize = 8;
const TIME_LEN: usize = 8;
const PLOT_TITLE_LEN: usize = 24;

#[derive(Debug)]
pub(crate) struct Spice2State;

/// Read a fixed-size record, distinguishing a clean end of input from an
/// I/O failure.
fn read_record<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<bool, StreamError> {
    match source.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn read_i16_or_eof<R: Read>(source: &mut R) -> Result<Option<i16>, StreamError> {
    match source.read_i16::<NativeEndian>() {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decode an 8-byte variable-name record: at most seven characters,
/// trimmed at the first space.
fn var_name(record: &[u8; 8]) -> String {
    let body = &record[..7];
    let end = body
        .iter()
        .position(|&b| b == b' ' || b == 0)
        .unwrap_or(body.len());
    String::from_utf8_lossy(&body[..end]).into_owned()
}

/// Read a Spice2G6 rawfile header.
pub(crate) fn read_header<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut magic = [0u8; 8];
    if !read_record(source, &mut magic)? {
        return Ok(None);
    }
    if &magic != MAGIC {
        debug!("{}: not a spice2 rawfile (bad magic number)", name);
        return Ok(None);
    }

    let mut title = [0u8; TITLE_LEN];
    let mut date = [0u8; DATE_LEN];
    let mut time = [0u8; TIME_LEN];
    if !read_record(source, &mut title)?
        || !read_record(source, &mut date)?
        || !read_record(source, &mut time)?
    {
        return Ok(None);
    }
    let Some(mode) = read_i16_or_eof(source)? else {
        return Ok(None);
    };
    let Some(nvars) = read_i16_or_eof(source)? else {
        return Ok(None);
    };
    let Some(const4) = read_i16_or_eof(source)? else {
        return Ok(None);
    };
    debug!(
        "{}: nvars={} const={} analysis mode {}",
        name, nvars, const4, mode
    );
    if nvars < 1 {
        return Ok(None);
    }
    let nvars = nvars as usize;
    let ndv = nvars - 1;

    let mut record = [0u8; 8];
    if !read_record(source, &mut record)? {
        return Ok(None);
    }
    let ivar = Variable::new(var_name(&record), VarKind::Time, 0, 1);

    let mut dvars = Vec::with_capacity(ndv);
    for i in 0..ndv {
        if !read_record(source, &mut record)? {
            return Ok(None);
        }
        // The rawfile carries a type word per variable, but it doesn't
        // distinguish voltages from currents usefully.
        dvars.push(Variable::new(var_name(&record), VarKind::Voltage, i + 1, 1));
    }

    // Type words, then location words: one leading word plus one per
    // dependent variable in each group.
    for _ in 0..nvars {
        if read_i16_or_eof(source)?.is_none() {
            return Ok(None);
        }
    }
    for _ in 0..nvars {
        if read_i16_or_eof(source)?.is_none() {
            return Ok(None);
        }
    }

    let mut plot_title = [0u8; PLOT_TITLE_LEN];
    if !read_record(source, &mut plot_title)? {
        return Ok(None);
    }
    debug!(
        "{}: title=\"{}\"",
        name,
        String::from_utf8_lossy(&plot_title)
            .trim_end_matches(['\0', ' '])
    );

    Ok(Some(HeaderInfo {
        format: Format::Spice2Raw,
        ivar,
        dvars,
        sweep_vars: Vec::new(),
        ncols: nvars,
        ntables: 1,
        decoder: Decoder::Spice2(Spice2State),
    }))
}

/// Read one row of 8-byte values.
pub(crate) fn read_row<R: Read>(
    _state: &mut Spice2State,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    let mut value = [0u8; 8];
    if !read_record(source, &mut value)? {
        return Ok(ReadStatus::EndOfData);
    }
    if &value == MAGIC {
        // Another analysis follows; this stream ends here.
        return Ok(ReadStatus::EndOfData);
    }
    *ival = f64::from_ne_bytes(value);

    for i in 0..ctx.dvars.len() {
        if !read_record(source, &mut value)? {
            error!("{}: unexpected EOF at dvar {}", ctx.name, i);
            return Err(StreamError::Corrupt {
                message: format!("{}: unexpected EOF at dvar {}", ctx.name, i),
            });
        }
        dvals[i] = f64::from_ne_bytes(value);
    }
    Ok(ReadStatus::Row)
}
