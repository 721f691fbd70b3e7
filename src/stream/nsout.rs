//! Nanosim `.out` files.
//!
//! A text format with semicolon comments and dot-keyword header lines.
//! `.index name idx kind` lines assign each variable a numeric index tag;
//! the body is sparse: a bare integer line opens a sample (the independent
//! value, in units of `time_resolution` nanoseconds), followed by
//! `index value` update lines. Variables not updated in a sample retain
//! their previous value, and every value is scaled by its kind's
//! resolution on output.

use log::{debug, error};
use std::io::{Read, Seek};

use crate::error::StreamError;
use crate::stream::line_reader::{LineBuffer, LineStatus};
use crate::stream::{
    parse_leading_f64, parse_leading_int, Decoder, Format, HeaderInfo, ReadStatus, RowContext,
    VarKind, Variable,
};

#[derive(Debug)]
pub(crate) struct NsoutState {
    line: LineBuffer,
    lineno: usize,
    at_eof: bool,
    time_resolution: f64,
    voltage_resolution: f64,
    current_resolution: f64,
    maxindex: usize,
    /// Dense last-value row indexed by nanosim index tags.
    datrow: Vec<f64>,
    /// Index tag assigned to each dependent variable.
    nsindexes: Vec<usize>,
}

fn kind_from_str(s: &str) -> VarKind {
    if s.eq_ignore_ascii_case("v") {
        VarKind::Voltage
    } else if s.eq_ignore_ascii_case("i") {
        VarKind::Current
    } else {
        VarKind::Unknown
    }
}

/// Read a nanosim `.out` header, leaving the first sample's
/// independent-value line in the state's line buffer.
pub(crate) fn read_header<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut line = LineBuffer::new();
    let mut lineno = 0;

    let mut time_resolution = 1.0;
    let mut voltage_resolution = 1.0;
    let mut current_resolution = 1.0;
    let mut vars: Vec<(String, usize, VarKind)> = Vec::new();
    let mut maxindex = 0usize;
    let mut got_ivline = false;

    loop {
        if line.read_line(source)? == LineStatus::Eof {
            break;
        }
        lineno += 1;
        let text = line.text().into_owned();

        if lineno == 1 && !text.starts_with(";! output_format") {
            debug!(
                "{}:{}: doesn't look like an ns-out file; \"output_format\" expected",
                name, lineno
            );
            return Ok(None);
        }
        if text.starts_with(';') {
            continue;
        }

        if let Some(rest) = text.strip_prefix('.') {
            let mut tokens = rest.split_ascii_whitespace();
            let Some(key) = tokens.next() else {
                error!("{}:{}: syntax error, expected keyword", name, lineno);
                return Ok(None);
            };
            match key {
                "time_resolution" | "voltage_resolution" | "current_resolution" => {
                    let Some(val) = tokens.next() else {
                        error!("{}:{}: syntax error, expected number", name, lineno);
                        return Ok(None);
                    };
                    let val = parse_leading_f64(val);
                    match key {
                        "time_resolution" => time_resolution = val,
                        "voltage_resolution" => voltage_resolution = val,
                        _ => current_resolution = val,
                    }
                }
                "index" => {
                    let Some(varname) = tokens.next() else {
                        error!("{}:{}: syntax error, expected varname", name, lineno);
                        return Ok(None);
                    };
                    let Some(idx) = tokens.next() else {
                        error!("{}:{}: syntax error, expected var-index", name, lineno);
                        return Ok(None);
                    };
                    let idx = parse_leading_int(idx).max(0) as usize;
                    let Some(kind) = tokens.next() else {
                        error!("{}:{}: syntax error, expected variable type", name, lineno);
                        return Ok(None);
                    };
                    maxindex = maxindex.max(idx);
                    vars.push((varname.to_string(), idx, kind_from_str(kind)));
                }
                _ => {}
            }
        }

        if text.starts_with(|c: char| c.is_ascii_digit()) {
            got_ivline = true;
            break;
        }
    }

    if vars.is_empty() {
        error!("{}:{}: no variable indices found in header", name, lineno);
    }
    if !got_ivline {
        error!("{}:{}: EOF without data-line in header", name, lineno);
        return Ok(None);
    }

    let ivar = Variable::new("TIME", VarKind::Time, 0, 1);
    let mut dvars = Vec::with_capacity(vars.len());
    let mut nsindexes = Vec::with_capacity(vars.len());
    let mut ncols = 1;
    for (varname, idx, kind) in vars {
        debug!("{}: dv[{}] \"{}\" nsindex={}", name, dvars.len(), varname, idx);
        dvars.push(Variable::new(varname, kind, ncols, 1));
        nsindexes.push(idx);
        ncols += 1;
    }

    Ok(Some(HeaderInfo {
        format: Format::Nsout,
        ivar,
        dvars,
        sweep_vars: Vec::new(),
        ncols,
        ntables: 1,
        decoder: Decoder::Nsout(NsoutState {
            line,
            lineno,
            at_eof: false,
            time_resolution,
            voltage_resolution,
            current_resolution,
            maxindex,
            datrow: vec![0.0; maxindex + 1],
            nsindexes,
        }),
    }))
}

/// Read one sample. On entry the line buffer holds the sample's
/// independent-value line; update lines are folded into the dense row
/// until the next sample's value line (or end of input) is seen.
pub(crate) fn read_row<R: Read>(
    state: &mut NsoutState,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    if state.at_eof {
        return Ok(ReadStatus::EndOfData);
    }

    // The time_resolution is in nanoseconds.
    *ival = parse_leading_f64(&state.line.text()) * state.time_resolution * 1e-9;

    loop {
        if state.line.read_line(source)? == LineStatus::Eof {
            state.at_eof = true;
            break;
        }
        state.lineno += 1;
        let text = state.line.text();
        if text.starts_with(';') {
            continue;
        }

        let mut tokens = text.split_ascii_whitespace();
        let Some(sidx) = tokens.next() else {
            error!("{}:{}: expected value", ctx.name, state.lineno);
            return Err(StreamError::Parse {
                message: format!("{}:{}: expected value", ctx.name, state.lineno),
            });
        };
        let Some(sval) = tokens.next() else {
            // No value token: this is the independent-value line of the
            // next sample.
            break;
        };

        let idx = parse_leading_int(sidx).max(0) as usize;
        let val = parse_leading_f64(sval);
        if idx <= state.maxindex {
            state.datrow[idx] = val;
        } else {
            debug!(
                "{}:{}: index {} exceeds declared maximum {}, ignored",
                ctx.name, state.lineno, idx, state.maxindex
            );
        }
    }

    for (i, dv) in ctx.dvars.iter().enumerate() {
        let scale = match dv.kind {
            VarKind::Voltage => state.voltage_resolution,
            VarKind::Current => state.current_resolution,
            _ => 1.0,
        };
        dvals[i] = state.datrow[state.nsindexes[i]] * scale;
    }

    Ok(ReadStatus::Row)
}
