//! Berkeley Spice3 rawfiles, as also written by ngspice and friends.
//!
//! The header is a list of `Keyword: value` lines; a `Variables:` block
//! lists `index name kind` triples, and either `Values:` (text body) or
//! `Binary:` (native-endian f64 body) starts the data. Complex data
//! doubles every column and pads the independent variable with a second,
//! discarded value.
//!
//! Multi-sweep files carry no table count; a new sweep announces itself by
//! the independent variable decreasing. The offending value is held back
//! and becomes the first independent value of the next table.

use byteorder::{NativeEndian, ReadBytesExt};
use log::{debug, error, warn};
use std::io::{ErrorKind, Read, Seek};

use crate::error::StreamError;
use crate::stream::line_reader::{LineBuffer, LineStatus};
use crate::stream::{
    parse_leading_f64, Decoder, Format, HeaderInfo, ReadStatus, RowContext, VarKind, Variable,
};

#[derive(Debug)]
pub(crate) struct TextState {
    line: LineBuffer,
    /// Token cursor into the current line; `None` when a fresh line is
    /// needed.
    pos: Option<usize>,
    lineno: usize,
    last_ival: f64,
    /// Independent value held back after a sweep boundary.
    pushback: Option<f64>,
    read_rows: usize,
}

#[derive(Debug)]
pub(crate) struct BinaryState {
    expected_vals: usize,
    read_vals: usize,
    last_ival: f64,
    pushback: Option<f64>,
    read_rows: usize,
}

fn kind_from_str(s: &str) -> VarKind {
    if s.eq_ignore_ascii_case("voltage") {
        VarKind::Voltage
    } else if s.eq_ignore_ascii_case("current") {
        VarKind::Current
    } else if s.eq_ignore_ascii_case("frequency") {
        VarKind::Frequency
    } else if s.eq_ignore_ascii_case("time") {
        VarKind::Time
    } else {
        VarKind::Unknown
    }
}

/// Read a Spice3 rawfile header, through the `Values:` or `Binary:` line.
pub(crate) fn read_header<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut line = LineBuffer::new();
    let mut lineno = 0;

    let mut nvars = 0usize;
    let mut got_nvars = false;
    let mut npoints = 0usize;
    let mut complex = false;
    let mut binary = false;
    let mut got_values = false;

    let mut ivar: Option<Variable> = None;
    let mut dvars: Vec<Variable> = Vec::new();
    let mut ncols = 1usize;

    loop {
        if line.read_line(source)? == LineStatus::Eof {
            break;
        }
        lineno += 1;
        let text = line.text().into_owned();

        if lineno == 1 && !text.starts_with("Title: ") {
            debug!(
                "{}:{}: doesn't look like a spice3 rawfile; \"Title:\" expected",
                name, lineno
            );
            return Ok(None);
        }

        let Some(colon) = text.find(':') else {
            error!("{}:{}: syntax error, expected \"keyword:\"", name, lineno);
            return Ok(None);
        };
        let key = &text[..colon];
        let rest = &text[colon + 1..];

        match key {
            "Flags" => {
                for flag in rest.split([' ', ',', '\t']) {
                    if flag == "real" {
                        complex = false;
                    }
                    if flag == "complex" {
                        complex = true;
                    }
                }
            }
            "No. Variables" => {
                let Some(val) = rest.split_ascii_whitespace().next() else {
                    error!("{}:{}: syntax error, expected integer", name, lineno);
                    return Ok(None);
                };
                nvars = crate::stream::parse_leading_int(val).max(0) as usize;
                got_nvars = true;
            }
            "No. Points" => {
                let Some(val) = rest.split_ascii_whitespace().next() else {
                    error!("{}:{}: syntax error, expected integer", name, lineno);
                    return Ok(None);
                };
                npoints = crate::stream::parse_leading_int(val).max(0) as usize;
            }
            "Variables" => {
                if !got_nvars {
                    error!(
                        "{}:{}: \"Variables:\" before \"No. Variables:\"",
                        name, lineno
                    );
                    return Ok(None);
                }
                // The first triple may share the "Variables:" line.
                let mut pending: Vec<String> =
                    rest.split_ascii_whitespace().map(str::to_string).collect();
                for i in 0..nvars {
                    if pending.is_empty() {
                        if line.read_line(source)? == LineStatus::Eof {
                            error!(
                                "{}:{}: unexpected EOF in \"Variables:\" at var {}",
                                name, lineno, i
                            );
                            return Ok(None);
                        }
                        lineno += 1;
                        pending = line
                            .text()
                            .split_ascii_whitespace()
                            .map(str::to_string)
                            .collect();
                    }
                    if pending.len() < 3 {
                        error!("{}:{}: expected number name type", name, lineno);
                        return Ok(None);
                    }
                    let vname = pending[1].clone();
                    let kind = kind_from_str(&pending[2]);
                    pending.clear();

                    let width = if complex { 2 } else { 1 };
                    if i == 0 {
                        // The independent variable can't really be
                        // two-column; ncols == 2 flags that a padding value
                        // must be discarded from each row.
                        ivar = Some(Variable::new(vname, kind, 0, width));
                    } else {
                        dvars.push(Variable::new(vname, kind, ncols, width));
                        ncols += width;
                    }
                }
            }
            "Values" => {
                got_values = true;
                break;
            }
            "Binary" => {
                binary = true;
                got_values = true;
                break;
            }
            // Title, Date, Plotname and any unknown keys carry no
            // structure we need.
            _ => {}
        }
    }

    let Some(ivar) = ivar else {
        error!("{}:{}: no \"Variables:\" section in header", name, lineno);
        return Ok(None);
    };
    if !got_values {
        error!("{}:{}: EOF without \"Values:\" in header", name, lineno);
        return Ok(None);
    }

    // The pad column for a complex independent variable is counted here
    // but never lands in a row.
    let expected_vals = npoints * (ncols + usize::from(complex));
    debug!("{}: expecting {} values", name, expected_vals);

    let decoder = if binary {
        Decoder::Spice3Binary(BinaryState {
            expected_vals,
            read_vals: 0,
            last_ival: f64::NEG_INFINITY,
            pushback: None,
            read_rows: 0,
        })
    } else {
        Decoder::Spice3Text(TextState {
            line: LineBuffer::new(),
            pos: None,
            lineno,
            last_ival: f64::NEG_INFINITY,
            pushback: None,
            read_rows: 0,
        })
    };

    Ok(Some(HeaderInfo {
        format: Format::Spice3Raw,
        ivar,
        dvars,
        sweep_vars: Vec::new(),
        ncols,
        ntables: 1,
        decoder,
    }))
}

/// Next whitespace-separated token, advancing across lines as needed and
/// skipping blank lines. `None` is normal end of input.
fn next_token<R: Read>(
    state: &mut TextState,
    source: &mut R,
) -> Result<Option<String>, StreamError> {
    let mut pos = match state.pos {
        Some(p) => p,
        None => {
            if state.line.read_line(source)? == LineStatus::Eof {
                return Ok(None);
            }
            state.lineno += 1;
            0
        }
    };

    loop {
        if pos >= state.line.len() {
            loop {
                if state.line.read_line(source)? == LineStatus::Eof {
                    state.pos = None;
                    return Ok(None);
                }
                state.lineno += 1;
                if state.line.len() > 0 {
                    break;
                }
            }
            pos = 0;
        }
        let bytes = state.line.bytes();
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        while pos < state.line.len() && !state.line.bytes()[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let token = String::from_utf8_lossy(&state.line.bytes()[start..pos]).into_owned();
        state.pos = Some(pos);
        return Ok(Some(token));
    }
}

/// Read one row from a text body: a row number, the independent value,
/// then one token per dependent variable (`re,im` for complex columns).
pub(crate) fn read_row_text<R: Read>(
    state: &mut TextState,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    match state.pushback.take() {
        None => {
            let Some(tok) = next_token(state, source)? else {
                return Ok(ReadStatus::EndOfData);
            };
            if !tok.starts_with(|c: char| c.is_ascii_digit()) {
                warn!(
                    "{}:{}: expected row number, got \"{}\". Note: only one dataset per file is supported, extra garbage ignored",
                    ctx.name, state.lineno, tok
                );
                return Ok(ReadStatus::EndOfData);
            }

            let Some(tok) = next_token(state, source)? else {
                warn!("{}:{}: expected ivar value", ctx.name, state.lineno);
                return Err(StreamError::Parse {
                    message: format!("{}:{}: expected ivar value", ctx.name, state.lineno),
                });
            };
            let v = parse_leading_f64(&tok);
            if v < state.last_ival {
                // Start of another sweep; hold the value for the next call.
                state.last_ival = v;
                state.pushback = Some(v);
                return Ok(ReadStatus::EndOfTable);
            }
            state.last_ival = v;
            *ival = v;
        }
        Some(v) => {
            // The first independent value of this sweep was read when the
            // boundary was detected.
            *ival = v;
        }
    }

    for dv in ctx.dvars {
        let Some(tok) = next_token(state, source)? else {
            error!("{}:{}: expected value", ctx.name, state.lineno);
            return Err(StreamError::Parse {
                message: format!("{}:{}: expected value", ctx.name, state.lineno),
            });
        };
        dvals[dv.col - 1] = parse_leading_f64(&tok);
        if dv.ncols > 1 {
            let im = tok.find(',').map(|i| &tok[i + 1..]);
            let Some(im) = im.filter(|s| !s.is_empty()) else {
                error!("{}:{}: expected second value", ctx.name, state.lineno);
                return Err(StreamError::Parse {
                    message: format!("{}:{}: expected second value", ctx.name, state.lineno),
                });
            };
            dvals[dv.col] = parse_leading_f64(im);
        }
    }
    state.read_rows += 1;
    Ok(ReadStatus::Row)
}

/// Read one value from a binary body, enforcing the declared point count.
fn getval_binary<R: Read>(
    state: &mut BinaryState,
    source: &mut R,
    name: &str,
) -> Result<Option<f64>, StreamError> {
    if state.read_vals >= state.expected_vals {
        debug!("{}: past last expected value", name);
        return Ok(None);
    }
    match source.read_f64::<NativeEndian>() {
        Ok(v) => {
            state.read_vals += 1;
            Ok(Some(v))
        }
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            error!("{}: unexpected EOF in data", name);
            Err(StreamError::Corrupt {
                message: format!("{}: unexpected EOF in binary data", name),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Read one row from a binary body.
pub(crate) fn read_row_binary<R: Read>(
    state: &mut BinaryState,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    match state.pushback.take() {
        None => {
            let Some(v) = getval_binary(state, source, ctx.name)? else {
                return Ok(ReadStatus::EndOfData);
            };
            // Complex rows pad the independent variable with a second,
            // discarded value.
            if ctx.ivar.ncols == 2 && getval_binary(state, source, ctx.name)?.is_none() {
                return Ok(ReadStatus::EndOfData);
            }
            if v < state.last_ival {
                state.last_ival = v;
                state.pushback = Some(v);
                return Ok(ReadStatus::EndOfTable);
            }
            state.last_ival = v;
            *ival = v;
        }
        Some(v) => {
            *ival = v;
        }
    }

    for i in 0..ctx.ncols - 1 {
        match getval_binary(state, source, ctx.name) {
            Ok(Some(v)) => dvals[i] = v,
            _ => {
                warn!(
                    "{}: EOF or error reading data field {} in row {}; file is incomplete.",
                    ctx.name, i, state.read_rows
                );
                return Ok(ReadStatus::EndOfData);
            }
        }
    }
    state.read_rows += 1;
    Ok(ReadStatus::Row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{open_from, SpiceStream};
    use std::io::Cursor;

    fn text_file(flags: &str, body: &str) -> Vec<u8> {
        let mut data = String::new();
        data.push_str("Title: test circuit\n");
        data.push_str("Date: today\n");
        data.push_str("Plotname: Transient Analysis\n");
        data.push_str(&format!("Flags: {}\n", flags));
        data.push_str("No. Variables: 2\n");
        data.push_str("No. Points: 2\n");
        data.push_str("Variables:\n");
        data.push_str("\t0\ttime\ttime\n");
        data.push_str("\t1\tv1\tvoltage\n");
        data.push_str("Values:\n");
        data.push_str(body);
        data.into_bytes()
    }

    fn stream_of(data: Vec<u8>) -> SpiceStream<Cursor<Vec<u8>>> {
        open_from(Cursor::new(data), "test.raw", Format::Spice3Raw).unwrap()
    }

    #[test]
    fn test_text_real_rows() {
        let mut stream = stream_of(text_file("real", "0 0 1.5\n1 1e-9 2.5\n"));
        assert_eq!(stream.ncols(), 2);
        assert_eq!(stream.ivar().kind, VarKind::Time);
        assert_eq!(stream.dvars()[0].kind, VarKind::Voltage);

        let mut ival = 0.0;
        let mut dvals = [0.0];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 1.5));
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (1e-9, 2.5));
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_text_complex_rows() {
        let mut stream = stream_of(text_file(
            "complex",
            "0 0,0 0.1,0.2\n1 1e-9,0 0.3,0.4\n",
        ));
        assert_eq!(stream.ivar().ncols, 2);
        assert_eq!(stream.dvars()[0].ncols, 2);
        assert_eq!(stream.ncols(), 3);

        let mut ival = 0.0;
        let mut dvals = [0.0; 2];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(ival, 0.0);
        assert_eq!(dvals, [0.1, 0.2]);
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(ival, 1e-9);
        assert_eq!(dvals, [0.3, 0.4]);
    }

    #[test]
    fn test_text_multi_sweep_pushback() {
        // Two sweeps of one variable over ivar 0..1: the decreasing
        // independent value splits the tables and is replayed as the first
        // row of the second one.
        let mut stream = stream_of(text_file("real", "0 0 1\n1 1 2\n0 0 3\n1 1 4\n"));
        let mut ival = 0.0;
        let mut dvals = [0.0];

        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 1.0));
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (1.0, 2.0));
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfTable
        );
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 3.0));
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (1.0, 4.0));
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_text_garbage_after_data_ignored() {
        let mut stream = stream_of(text_file("real", "0 0 1\nsome trailing garbage\n"));
        let mut ival = 0.0;
        let mut dvals = [0.0];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_rejects_without_title() {
        let mut source = Cursor::new(b"Nonsense: file\n".to_vec());
        assert!(read_header("x.raw", &mut source).unwrap().is_none());
    }

    #[test]
    fn test_variables_before_count_rejected() {
        let data = b"Title: t\nVariables:\n\t0\ttime\ttime\n".to_vec();
        let mut source = Cursor::new(data);
        assert!(read_header("x.raw", &mut source).unwrap().is_none());
    }

    #[test]
    fn test_binary_rows() {
        let mut data = String::new();
        data.push_str("Title: bin\n");
        data.push_str("Flags: real\n");
        data.push_str("No. Variables: 3\n");
        data.push_str("No. Points: 2\n");
        data.push_str("Variables:\n");
        data.push_str("\t0\ttime\ttime\n");
        data.push_str("\t1\tv1\tvoltage\n");
        data.push_str("\t2\ti1\tcurrent\n");
        data.push_str("Binary:\n");
        let mut bytes = data.into_bytes();
        for v in [0.0f64, 1.0, 2.0, 1e-9, 3.0, 4.0] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }

        let mut stream = stream_of(bytes);
        assert_eq!(stream.ncols(), 3);
        assert_eq!(stream.dvars()[1].kind, VarKind::Current);

        let mut ival = 0.0;
        let mut dvals = [0.0; 2];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(ival, 0.0);
        assert_eq!(dvals, [1.0, 2.0]);
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(ival, 1e-9);
        assert_eq!(dvals, [3.0, 4.0]);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_binary_stops_at_declared_points() {
        let mut data = String::new();
        data.push_str("Title: bin\n");
        data.push_str("No. Variables: 2\n");
        data.push_str("No. Points: 1\n");
        data.push_str("Variables:\n");
        data.push_str("\t0\ttime\ttime\n");
        data.push_str("\t1\tv1\tvoltage\n");
        data.push_str("Binary:\n");
        let mut bytes = data.into_bytes();
        // One declared point plus trailing bytes that must not be read.
        for v in [0.0f64, 1.0, 9.0, 9.0] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }

        let mut stream = stream_of(bytes);
        let mut ival = 0.0;
        let mut dvals = [0.0];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_column_tiling_invariant_complex() {
        let stream = stream_of(text_file("complex", ""));
        assert_eq!(stream.ivar().col, 0);
        let mut next = 1;
        for dv in stream.dvars() {
            assert_eq!(dv.col, next);
            next += dv.ncols;
        }
        assert_eq!(next, stream.ncols());
    }
}
