//! CAzM and plain-ascii table formats.
//!
//! CAzM files (MCNC's CAzM simulator and its TSPICE descendant) carry a
//! multi-line header whose analysis keyword names the independent
//! variable's kind; the following line lists the column names. Plain ascii
//! files have only the column-name line. Both share one row reader over
//! whitespace-separated values.

use log::error;
use std::io::{Read, Seek};

use crate::error::StreamError;
use crate::stream::line_reader::{LineBuffer, LineStatus};
use crate::stream::{Decoder, Format, HeaderInfo, ReadStatus, RowContext, VarKind, Variable};

/// Maximum header lines scanned for a CAzM analysis keyword.
const CAZM_MAX_HEADER_LINES: usize = 30;

/// Characters permitted in the leading token of a data row. Anything else
/// means this probably is not an ascii data file at all.
const NUMERIC_CHARS: &[u8] = b"0123456789eE+-.";

#[derive(Debug)]
pub(crate) struct AsciiState {
    line: LineBuffer,
    lineno: usize,
}

/// Read a CAzM header: skip lines until the analysis keyword, then take
/// the next line as the column list.
pub(crate) fn read_header_cazm<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut line = LineBuffer::new();
    let mut lineno = 0;

    let iv_kind = loop {
        if lineno > CAZM_MAX_HEADER_LINES {
            return Ok(None);
        }
        if line.read_line(source)? == LineStatus::Eof {
            return Ok(None);
        }
        lineno += 1;

        let text = line.text();
        if text.starts_with("TRANSIENT") {
            break VarKind::Time;
        } else if text.starts_with("AC ANALYSIS") {
            break VarKind::Frequency;
        } else if text.starts_with("TRANSFER") {
            // DC transfer function; the sweep variable might also be a
            // current, but the file doesn't say.
            break VarKind::Voltage;
        }
    };

    // The line after the section header holds the signal names; the first
    // is the independent variable.
    if line.read_line(source)? == LineStatus::Eof {
        return Ok(None);
    }
    lineno += 1;

    Ok(process_column_header(
        &line.text(),
        iv_kind,
        Format::Cazm,
        name,
        lineno,
    ))
}

/// Read a plain-ascii header: the first line is the column list, and must
/// consist of printable characters only so binary files are not
/// misidentified.
pub(crate) fn read_header_ascii<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut line = LineBuffer::new();
    if line.read_line(source)? == LineStatus::Eof {
        return Ok(None);
    }

    if !line
        .bytes()
        .iter()
        .all(|&b| b.is_ascii_graphic() || b == b' ' || b == b'\t')
    {
        return Ok(None);
    }

    Ok(process_column_header(
        &line.text(),
        VarKind::Unknown,
        Format::Ascii,
        name,
        1,
    ))
}

/// Turn a whitespace-separated column-name line into stream metadata.
fn process_column_header(
    text: &str,
    iv_kind: VarKind,
    format: Format,
    name: &str,
    lineno: usize,
) -> Option<HeaderInfo> {
    let mut tokens = text.split_ascii_whitespace();
    let iv_name = match tokens.next() {
        Some(t) => t,
        None => {
            error!("{}:{}: syntax error in header", name, lineno);
            return None;
        }
    };

    let kind = if iv_kind == VarKind::Unknown && iv_name.eq_ignore_ascii_case("time") {
        VarKind::Time
    } else {
        iv_kind
    };
    let ivar = Variable::new(iv_name, kind, 0, 1);

    let mut dvars = Vec::new();
    let mut ncols = 1;
    for token in tokens {
        dvars.push(Variable::new(token, VarKind::Unknown, ncols, 1));
        ncols += 1;
    }

    Some(HeaderInfo {
        format,
        ivar,
        dvars,
        sweep_vars: Vec::new(),
        ncols,
        ntables: 1,
        decoder: Decoder::Ascii(AsciiState {
            line: LineBuffer::new(),
            lineno,
        }),
    })
}

/// Read one row of whitespace-separated values.
pub(crate) fn read_row<R: Read>(
    state: &mut AsciiState,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    if state.line.read_line(source)? == LineStatus::Eof {
        return Ok(ReadStatus::EndOfData);
    }
    state.lineno += 1;

    let text = state.line.text();
    let mut tokens = text.split_ascii_whitespace();
    let first = match tokens.next() {
        Some(t) => t,
        // A blank line can indicate end of data.
        None => return Ok(ReadStatus::EndOfData),
    };

    if !first.bytes().all(|b| NUMERIC_CHARS.contains(&b)) {
        error!(
            "{}:{}: expected number; maybe this isn't an ascii data file at all?",
            ctx.name, state.lineno
        );
        return Err(StreamError::Parse {
            message: format!("{}:{}: non-numeric data row", ctx.name, state.lineno),
        });
    }

    *ival = first.parse::<f64>().map_err(|_| StreamError::Parse {
        message: format!("{}:{}: malformed number '{}'", ctx.name, state.lineno, first),
    })?;

    for i in 0..ctx.ncols - 1 {
        let token = tokens.next().ok_or_else(|| {
            error!("{}:{}: data field {} missing", ctx.name, state.lineno, i);
            StreamError::Parse {
                message: format!("{}:{}: data field {} missing", ctx.name, state.lineno, i),
            }
        })?;
        dvals[i] = token.parse::<f64>().map_err(|_| StreamError::Parse {
            message: format!("{}:{}: malformed number '{}'", ctx.name, state.lineno, token),
        })?;
    }

    Ok(ReadStatus::Row)
}
