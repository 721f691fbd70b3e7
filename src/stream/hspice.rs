//! HSPICE output files, ascii and binary.
//!
//! Both dialects share one logical ascii header: three fixed-field count
//! columns, a format version, a table count, then whitespace-delimited
//! variable-kind integers and names terminated by the `$&%#` sentinel. The
//! ascii dialect stores values as 11-character fixed-width fields laid out
//! continuously across padded lines; the binary dialect stores IEEE 754
//! 32-bit floats inside the record framing handled by [`super::block`].
//!
//! An independent value of 1e29 or more marks the end of a data table;
//! each table after the first is preceded by its sweep-parameter values.

use log::{debug, error, warn};
use std::io::{Read, Seek, SeekFrom};

use crate::error::StreamError;
use crate::stream::block::{self, BlockStream};
use crate::stream::line_reader::{LineBuffer, LineStatus};
use crate::stream::{
    parse_leading_int, Decoder, Format, HeaderInfo, ReadStatus, RowContext, VarKind, Variable,
};

/// Independent values at or above this mark the end of a data table.
const END_OF_TABLE: f64 = 1.0e29;

/// Token terminating the variable-name list of the header.
const HEADER_END: &[u8] = b"$&%#";

/// Accepted values of the 4-character format version field.
const VERSIONS: [&[u8; 4]; 2] = [b"9007", b"9601"];

/// Width of one ascii value field.
const FIELD_WIDTH: usize = 11;

#[derive(Debug)]
pub(crate) struct HspiceAsciiState {
    line: LineBuffer,
    /// Parse cursor into the current line; `None` before the first value.
    cursor: Option<usize>,
    read_tables: usize,
    read_rows: usize,
    sweep_consumed: bool,
}

#[derive(Debug)]
pub(crate) struct HspiceBinaryState {
    blocks: BlockStream,
    read_tables: usize,
    read_rows: usize,
    sweep_consumed: bool,
}

/// Dispatch to the ascii or binary header parser based on the first byte:
/// real HSPICE ascii output never starts with a control character.
pub(crate) fn read_header_auto<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut first = [0u8; 1];
    if source.read(&mut first)? == 0 {
        return Ok(None);
    }
    source.seek(SeekFrom::Start(0))?;

    if first[0] < b' ' {
        read_header_binary(name, source)
    } else {
        read_header_ascii(name, source)
    }
}

/// Read an HSPICE ascii header.
pub(crate) fn read_header_ascii<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut line = LineBuffer::new();
    let mut lineno = 0;

    if line.read_line(source)? == LineStatus::Eof {
        return Ok(None);
    }
    lineno += 1;

    let first = line.bytes();
    if first.len() < 20 || !VERSIONS.iter().any(|v| &first[16..20] == *v) {
        return Ok(None);
    }
    let nauto = fixed_count(first, 0);
    let nprobe = fixed_count(first, 4);
    let nsweepparam = fixed_count(first, 8);
    if nauto < 1 {
        return Ok(None);
    }

    // Date and time line; contents unused.
    if line.read_line(source)? == LineStatus::Eof {
        return Ok(None);
    }
    lineno += 1;

    // Table count, possibly with cruft at the start of the line.
    if line.read_line(source)? == LineStatus::Eof {
        return Ok(None);
    }
    lineno += 1;
    let text = line.text();
    let count_text = match text.find(' ') {
        Some(i) => &text[i..],
        None => text.as_ref(),
    };
    let mut ntables = parse_leading_int(count_text).max(0) as usize;
    if ntables == 0 {
        ntables = 1;
    }

    // The variable-kind and variable-name lines form one logical header;
    // names can get split across lines, so paste everything together and
    // tokenize the whole thing at once.
    let maxlines = nauto + nprobe + nsweepparam + 100;
    let mut header = String::new();
    while !header.contains("$&%#") {
        if lineno >= maxlines {
            debug!("{}:{}: end of hspice header not found", name, lineno);
            return Ok(None);
        }
        if line.read_line(source)? == LineStatus::Eof {
            return Ok(None);
        }
        lineno += 1;
        header.push_str(&line.text());
    }

    let Some((ivar, dvars, sweep_vars, ncols)) =
        process_header(nauto, nprobe, nsweepparam, &header, name)
    else {
        return Ok(None);
    };

    debug!("{}: ntables={}; expect {} columns", name, ntables, ncols);

    Ok(Some(HeaderInfo {
        format: Format::HspiceAscii,
        ivar,
        dvars,
        sweep_vars,
        ncols,
        ntables,
        decoder: Decoder::HspiceAscii(HspiceAsciiState {
            line: LineBuffer::new(),
            cursor: None,
            read_tables: 0,
            read_rows: 0,
            sweep_consumed: false,
        }),
    }))
}

/// Read an HSPICE binary header: the same ascii header content, wrapped in
/// framed records with fixed byte offsets.
pub(crate) fn read_header_binary<R: Read + Seek>(
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    let mut ahdr: Vec<u8> = Vec::new();
    let mut ahdrend = 0;
    while !contains_header_end(&ahdr[..ahdrend]) {
        let n = match block::read_block_into(source, &mut ahdr, ahdrend) {
            Ok(Some(n)) => n,
            Ok(None) => return Ok(None),
            Err(StreamError::Io { message }) => return Err(StreamError::Io { message }),
            Err(e) => {
                debug!("{}: rejecting hspice binary header: {}", name, e);
                return Ok(None);
            }
        };
        if n == 0 {
            return Ok(None);
        }
        ahdrend += n;
    }

    let ahdr = &ahdr[..ahdrend];
    if ahdr.len() < 256 || !VERSIONS.iter().any(|v| &ahdr[16..20] == *v) {
        return Ok(None);
    }
    let nauto = fixed_count(ahdr, 0);
    let nprobe = fixed_count(ahdr, 4);
    let nsweepparam = fixed_count(ahdr, 8);
    if nauto < 1 {
        return Ok(None);
    }
    let mut ntables = fixed_count(ahdr, 176);
    if ntables == 0 {
        ntables = 1;
    }

    let tokens = String::from_utf8_lossy(&ahdr[256..]);
    let Some((ivar, dvars, sweep_vars, ncols)) =
        process_header(nauto, nprobe, nsweepparam, &tokens, name)
    else {
        return Ok(None);
    };

    // The first data record header establishes the value count and the
    // swap state for sample extraction.
    let blocks = match BlockStream::open(source) {
        Ok(Some(b)) => b,
        Ok(None) => {
            debug!("{}: EOF reading first data record header", name);
            return Ok(None);
        }
        Err(StreamError::Io { message }) => return Err(StreamError::Io { message }),
        Err(e) => {
            debug!("{}: rejecting hspice binary data section: {}", name, e);
            return Ok(None);
        }
    };

    debug!("{}: ntables={}; expect {} columns", name, ntables, ncols);

    Ok(Some(HeaderInfo {
        format: Format::HspiceBinary,
        ivar,
        dvars,
        sweep_vars,
        ncols,
        ntables,
        decoder: Decoder::HspiceBinary(HspiceBinaryState {
            blocks,
            read_tables: 0,
            read_rows: 0,
            sweep_consumed: false,
        }),
    }))
}

fn contains_header_end(buf: &[u8]) -> bool {
    buf.windows(HEADER_END.len()).any(|w| w == HEADER_END)
}

/// Decode a 4-character integer count field at `offset`.
fn fixed_count(buf: &[u8], offset: usize) -> usize {
    if buf.len() < offset + 4 {
        return 0;
    }
    let text = String::from_utf8_lossy(&buf[offset..offset + 4]);
    parse_leading_int(&text).max(0) as usize
}

/// Shared header interpretation for both dialects: variable-kind integers,
/// then the independent variable's name, dependent names, and sweep
/// parameter names.
fn process_header(
    nauto: usize,
    nprobe: usize,
    nsweepparam: usize,
    header: &str,
    name: &str,
) -> Option<(Variable, Vec<Variable>, Vec<Variable>, usize)> {
    let mut tokens = header.split_ascii_whitespace();

    let Some(first) = tokens.next() else {
        debug!("{}: initial vartype not found on header line", name);
        return None;
    };
    let iv_kind = match parse_leading_int(first) {
        1 => VarKind::Time,
        2 => VarKind::Frequency,
        3 => VarKind::Voltage,
        _ => VarKind::Unknown,
    };
    let mut ivar = Variable::new("", iv_kind, 0, 1);
    let mut ncols = 1;

    let ndv = nauto - 1 + nprobe;
    let mut dvars = Vec::with_capacity(ndv);
    for i in 0..ndv {
        let Some(token) = tokens.next() else {
            debug!("{}: not enough vartypes on header line", name);
            return None;
        };
        if !token.starts_with(|c: char| c.is_ascii_digit()) {
            debug!("{}: bad vartype {} [{}] on header line", name, i, token);
            return None;
        }
        let kind = match parse_leading_int(token) {
            1 | 2 | 3 => VarKind::Voltage,
            8 | 15 | 22 => VarKind::Current,
            _ => VarKind::Unknown,
        };
        // AC analyses store complex dependent values as adjacent
        // real/imaginary column pairs.
        let width = if iv_kind == VarKind::Frequency { 2 } else { 1 };
        dvars.push(Variable::new("", kind, ncols, width));
        ncols += width;
    }

    let Some(iv_name) = tokens.next() else {
        debug!("{}: no IV name found on header line", name);
        return None;
    };
    ivar.name = iv_name.to_string();

    for dv in dvars.iter_mut() {
        let Some(dv_name) = tokens.next() else {
            debug!("{}: not enough DV names found on header line", name);
            return None;
        };
        dv.name = dv_name.to_string();
    }

    let mut sweep_vars = Vec::with_capacity(nsweepparam);
    for _ in 0..nsweepparam {
        let Some(sp_name) = tokens.next() else {
            debug!(
                "{}: not enough sweep parameter names found on header line",
                name
            );
            return None;
        };
        sweep_vars.push(Variable::new(sp_name, VarKind::Unknown, 0, 0));
    }

    Some((ivar, dvars, sweep_vars, ncols))
}

/// Extract the next 11-character fixed-width value from the line-oriented
/// ascii data section. Lines are padded; trailing whitespace is stripped
/// before slicing fields.
fn getval_ascii<R: Read>(
    state: &mut HspiceAsciiState,
    source: &mut R,
    name: &str,
) -> Result<Option<f64>, StreamError> {
    let pos = match state.cursor {
        Some(pos) if pos < state.line.len() => pos,
        _ => {
            if state.line.read_line(source)? == LineStatus::Eof {
                return Ok(None);
            }
            state.line.trim_end_in_place();
            state.cursor = Some(0);
            0
        }
    };

    let bytes = state.line.bytes();
    if pos + FIELD_WIDTH > bytes.len() {
        // Incomplete value field: a truncated or partially-written file.
        return Ok(None);
    }
    let field = &bytes[pos..pos + FIELD_WIDTH];
    state.cursor = Some(pos + FIELD_WIDTH);

    let text = String::from_utf8_lossy(field);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(StreamError::Parse {
            message: format!("{}: malformed value field '{}'", name, trimmed),
        }),
    }
}

/// Read the sweep-parameter values that precede each table's rows,
/// discarding them when no output buffer is supplied.
pub(crate) fn read_sweep_ascii<R: Read>(
    state: &mut HspiceAsciiState,
    source: &mut R,
    ctx: &RowContext<'_>,
    mut out: Option<&mut [f64]>,
) -> Result<(), StreamError> {
    for i in 0..ctx.nsweep {
        match getval_ascii(state, source, ctx.name)? {
            Some(v) => {
                if let Some(buf) = out.as_deref_mut() {
                    buf[i] = v;
                }
            }
            None => {
                error!("{}: unexpected EOF reading sweep parameters", ctx.name);
                return Err(StreamError::Parse {
                    message: format!("{}: unexpected EOF reading sweep parameters", ctx.name),
                });
            }
        }
    }
    state.sweep_consumed = true;
    Ok(())
}

pub(crate) fn read_sweep_binary<R: Read>(
    state: &mut HspiceBinaryState,
    source: &mut R,
    ctx: &RowContext<'_>,
    mut out: Option<&mut [f64]>,
) -> Result<(), StreamError> {
    for i in 0..ctx.nsweep {
        match state.blocks.next_value(source)? {
            Some(v) => {
                if let Some(buf) = out.as_deref_mut() {
                    buf[i] = v;
                }
            }
            None => {
                error!("{}: EOF or error reading sweep parameter", ctx.name);
                return Err(StreamError::Parse {
                    message: format!("{}: EOF or error reading sweep parameter", ctx.name),
                });
            }
        }
    }
    state.sweep_consumed = true;
    Ok(())
}

pub(crate) fn read_row_ascii<R: Read>(
    state: &mut HspiceAsciiState,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    if !state.sweep_consumed {
        // First row of a table: discard sweep parameters, if any.
        read_sweep_ascii(state, source, ctx, None)?;
    }

    let v = match getval_ascii(state, source, ctx.name)? {
        Some(v) => v,
        None => return Ok(ReadStatus::EndOfData),
    };
    if v >= END_OF_TABLE {
        state.read_tables += 1;
        if state.read_tables >= ctx.ntables {
            return Ok(ReadStatus::EndOfData);
        }
        state.sweep_consumed = false;
        state.read_rows = 0;
        return Ok(ReadStatus::EndOfTable);
    }
    *ival = v;

    state.read_rows += 1;
    for i in 0..ctx.ncols - 1 {
        match getval_ascii(state, source, ctx.name)? {
            Some(v) => dvals[i] = v,
            None => {
                warn!(
                    "{}: EOF or error reading data field {} in row {} of table {}; file is incomplete.",
                    ctx.name, i, state.read_rows, state.read_tables
                );
                return Ok(ReadStatus::EndOfData);
            }
        }
    }
    Ok(ReadStatus::Row)
}

pub(crate) fn read_row_binary<R: Read>(
    state: &mut HspiceBinaryState,
    source: &mut R,
    ctx: &RowContext<'_>,
    ival: &mut f64,
    dvals: &mut [f64],
) -> Result<ReadStatus, StreamError> {
    if !state.sweep_consumed {
        read_sweep_binary(state, source, ctx, None)?;
    }

    let v = match state.blocks.next_value(source)? {
        Some(v) => v,
        None => return Ok(ReadStatus::EndOfData),
    };
    if v >= END_OF_TABLE {
        state.read_tables += 1;
        if state.read_tables >= ctx.ntables {
            return Ok(ReadStatus::EndOfData);
        }
        state.sweep_consumed = false;
        state.read_rows = 0;
        return Ok(ReadStatus::EndOfTable);
    }
    *ival = v;

    state.read_rows += 1;
    for i in 0..ctx.ncols - 1 {
        match state.blocks.next_value(source) {
            Ok(Some(v)) => dvals[i] = v,
            _ => {
                warn!(
                    "{}: EOF or error reading data field {} in row {} of table {}; file is incomplete.",
                    ctx.name, i, state.read_rows, state.read_tables
                );
                return Ok(ReadStatus::EndOfData);
            }
        }
    }
    Ok(ReadStatus::Row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::block::tests::{push_block, push_float_block};
    use crate::stream::{open_from, ReadStatus};
    use std::io::Cursor;

    /// Emit one 11-character ascii value field.
    fn field(v: f64) -> String {
        format!("{:>11}", format!("{:.4e}", v))
    }

    /// Lay values out as fixed-width fields, five per line.
    fn data_lines(values: &[f64]) -> String {
        let mut out = String::new();
        for chunk in values.chunks(5) {
            for v in chunk {
                out.push_str(&field(*v));
            }
            out.push('\n');
        }
        out
    }

    fn ascii_file(
        nauto: usize,
        nprobe: usize,
        nsweep: usize,
        ntables: usize,
        tokens: &str,
        values: &[f64],
    ) -> Vec<u8> {
        let mut text = format!("{:4}{:4}{:4}    9007\n", nauto, nprobe, nsweep);
        text.push_str("* date and time\n");
        text.push_str(&format!("{}\n", ntables));
        text.push_str(tokens);
        text.push_str(" $&%#\n");
        text.push_str(&data_lines(values));
        text.into_bytes()
    }

    fn binary_file(
        nauto: usize,
        nprobe: usize,
        nsweep: usize,
        ntables: usize,
        tokens: &str,
        values: &[f32],
        swapped: bool,
    ) -> Vec<u8> {
        let mut header = vec![b' '; 256];
        header[0..4].copy_from_slice(format!("{:4}", nauto).as_bytes());
        header[4..8].copy_from_slice(format!("{:4}", nprobe).as_bytes());
        header[8..12].copy_from_slice(format!("{:4}", nsweep).as_bytes());
        header[16..20].copy_from_slice(b"9007");
        header[176..180].copy_from_slice(format!("{:4}", ntables).as_bytes());
        header.extend_from_slice(tokens.as_bytes());
        header.extend_from_slice(b" $&%#");

        let mut data = Vec::new();
        push_block(&mut data, &header, swapped);
        push_float_block(&mut data, values, swapped);
        data
    }

    fn collect_rows<R: std::io::Read + std::io::Seek>(
        stream: &mut crate::stream::SpiceStream<R>,
    ) -> Vec<(f64, Vec<f64>)> {
        let mut rows = Vec::new();
        let mut ival = 0.0;
        let mut dvals = vec![0.0; stream.ncols() - 1];
        loop {
            match stream.read_row(&mut ival, &mut dvals).unwrap() {
                ReadStatus::Row => rows.push((ival, dvals.clone())),
                ReadStatus::EndOfTable => continue,
                ReadStatus::EndOfData => break,
            }
        }
        rows
    }

    #[test]
    fn test_ascii_single_table() {
        let data = ascii_file(
            2,
            0,
            0,
            1,
            "1 1 time v(out)",
            &[0.0, 1.0, 1e-9, 2.0, 1e30],
        );
        let mut stream = open_from(Cursor::new(data), "a.tr0", Format::HspiceAscii).unwrap();
        assert_eq!(stream.ivar().kind, VarKind::Time);
        assert_eq!(stream.dvars()[0].kind, VarKind::Voltage);
        assert_eq!(stream.ncols(), 2);

        let rows = collect_rows(&mut stream);
        assert_eq!(rows, vec![(0.0, vec![1.0]), (1e-9, vec![2.0])]);
    }

    #[test]
    fn test_ascii_sentinel_ends_stream() {
        // The final independent value field is the 1e30 end marker.
        let data = ascii_file(2, 0, 0, 1, "1 1 time v(out)", &[0.0, 5.0, 1e30]);
        let mut stream = open_from(Cursor::new(data), "a.tr0", Format::HspiceAscii).unwrap();

        let mut ival = 0.0;
        let mut dvals = [0.0];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_ascii_sweep_tables() {
        // Two tables over one sweep parameter; each table's first value is
        // the sweep value, then rows, then the end marker.
        let values = [
            27.0, 0.0, 1.0, 1e-9, 2.0, 1e30, // table 0, sweep=27
            85.0, 0.0, 3.0, 1e-9, 4.0, 1e30, // table 1, sweep=85
        ];
        let data = ascii_file(2, 0, 1, 2, "1 1 time v(out) temp", &values);
        let mut stream = open_from(Cursor::new(data), "a.sw0", Format::HspiceAscii).unwrap();
        assert_eq!(stream.sweep_vars().len(), 1);
        assert_eq!(stream.sweep_vars()[0].name, "temp");
        assert_eq!(stream.ntables(), 2);

        let mut sweep = [0.0];
        let mut ival = 0.0;
        let mut dvals = [0.0];

        stream.read_sweep(&mut sweep).unwrap();
        assert_eq!(sweep[0], 27.0);
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 1.0));
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfTable
        );

        stream.read_sweep(&mut sweep).unwrap();
        assert_eq!(sweep[0], 85.0);
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 3.0));
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_ascii_implicit_sweep_consumption() {
        // Without an explicit read_sweep, the sweep values are consumed
        // and discarded before each table's rows.
        let values = [27.0, 0.0, 1.0, 1e30];
        let data = ascii_file(2, 0, 1, 1, "1 1 time v(out) temp", &values);
        let mut stream = open_from(Cursor::new(data), "a.sw0", Format::HspiceAscii).unwrap();

        let mut ival = 0.0;
        let mut dvals = [0.0];
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 1.0));
    }

    #[test]
    fn test_ascii_frequency_complex_columns() {
        let data = ascii_file(
            2,
            0,
            0,
            1,
            "2 1 HERTZ v(out)",
            &[1.0, 0.5, -0.5, 1e30],
        );
        let mut stream = open_from(Cursor::new(data), "a.ac0", Format::HspiceAscii).unwrap();
        assert_eq!(stream.ivar().kind, VarKind::Frequency);
        assert_eq!(stream.dvars()[0].ncols, 2);
        assert_eq!(stream.ncols(), 3);
        assert_eq!(stream.dvars()[0].column_name(1), "v(out).1");

        let rows = collect_rows(&mut stream);
        assert_eq!(rows, vec![(1.0, vec![0.5, -0.5])]);
    }

    #[test]
    fn test_ascii_rejects_unknown_version() {
        let mut data = ascii_file(2, 0, 0, 1, "1 1 time v1", &[1e30]);
        data[16..20].copy_from_slice(b"1999");
        let mut source = Cursor::new(data);
        assert!(read_header_ascii("a.tr0", &mut source).unwrap().is_none());
    }

    #[test]
    fn test_ascii_truncated_row_warns_eof() {
        let mut data = ascii_file(3, 0, 0, 1, "1 1 1 time v1 v2", &[]);
        data.extend_from_slice(field(0.0).as_bytes());
        data.extend_from_slice(field(1.0).as_bytes());
        // v2 field missing entirely
        let mut stream = open_from(Cursor::new(data), "a.tr0", Format::HspiceAscii).unwrap();
        let mut ival = 0.0;
        let mut dvals = [0.0; 2];
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_binary_single_table() {
        let data = binary_file(
            2,
            0,
            0,
            1,
            "1 1 time v(out)",
            &[0.0, 1.0, 1e-3, 2.0, 1e30],
            false,
        );
        let mut stream = open_from(Cursor::new(data), "b.tr0", Format::HspiceBinary).unwrap();
        assert_eq!(stream.format(), Format::HspiceBinary);
        assert_eq!(stream.ncols(), 2);

        let rows = collect_rows(&mut stream);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (0.0, vec![1.0]));
        assert_eq!(rows[1].0, 1e-3f32 as f64);
        assert_eq!(rows[1].1, vec![2.0]);
    }

    #[test]
    fn test_binary_endian_robustness() {
        // A byte-swapped file must decode to exactly the same rows.
        let values = [0.0f32, 1.0, 2.5e-9, -2.0, 1e30];
        let native = binary_file(2, 0, 0, 1, "1 1 time v(out)", &values, false);
        let foreign = binary_file(2, 0, 0, 1, "1 1 time v(out)", &values, true);

        let mut native_stream =
            open_from(Cursor::new(native), "b.tr0", Format::HspiceBinary).unwrap();
        let mut foreign_stream =
            open_from(Cursor::new(foreign), "b.tr0", Format::HspiceBinary).unwrap();

        assert_eq!(
            collect_rows(&mut native_stream),
            collect_rows(&mut foreign_stream)
        );
    }

    #[test]
    fn test_binary_sweep_tables() {
        let values = [
            1.5f32, 0.0, 1.0, 1e30, // table 0, sweep=1.5
            2.5, 0.0, 2.0, 1e30, // table 1, sweep=2.5
        ];
        let data = binary_file(2, 0, 1, 2, "1 1 time v(out) vdd", &values, false);
        let mut stream = open_from(Cursor::new(data), "b.sw0", Format::HspiceBinary).unwrap();

        let mut sweep = [0.0];
        let mut ival = 0.0;
        let mut dvals = [0.0];

        stream.read_sweep(&mut sweep).unwrap();
        assert_eq!(sweep[0], 1.5);
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfTable
        );
        stream.read_sweep(&mut sweep).unwrap();
        assert_eq!(sweep[0], 2.5);
        assert_eq!(stream.read_row(&mut ival, &mut dvals).unwrap(), ReadStatus::Row);
        assert_eq!((ival, dvals[0]), (0.0, 2.0));
        assert_eq!(
            stream.read_row(&mut ival, &mut dvals).unwrap(),
            ReadStatus::EndOfData
        );
    }

    #[test]
    fn test_auto_dispatch_by_first_byte() {
        let ascii = ascii_file(2, 0, 0, 1, "1 1 time v1", &[0.0, 1.0, 1e30]);
        let binary = binary_file(2, 0, 0, 1, "1 1 time v1", &[0.0, 1.0, 1e30], false);

        let mut source = Cursor::new(ascii);
        let header = read_header_auto("x.tr0", &mut source).unwrap().unwrap();
        assert_eq!(header.format, Format::HspiceAscii);

        let mut source = Cursor::new(binary);
        let header = read_header_auto("x.tr0", &mut source).unwrap().unwrap();
        assert_eq!(header.format, Format::HspiceBinary);
    }

    #[test]
    fn test_estimated_rows_requires_file() {
        let data = binary_file(2, 0, 0, 1, "1 1 time v1", &[0.0, 1.0, 1e30], false);
        let stream = open_from(Cursor::new(data), "b.tr0", Format::HspiceBinary).unwrap();
        // In-memory sources have no file size to estimate from.
        assert_eq!(stream.estimated_rows(), None);
    }

    #[test]
    fn test_column_tiling_invariant_complex() {
        let data = ascii_file(
            3,
            1,
            0,
            1,
            "2 1 1 8 HERTZ a b i(c)",
            &[1e30],
        );
        let stream = open_from(Cursor::new(data), "a.ac0", Format::HspiceAscii).unwrap();
        assert_eq!(stream.ivar().col, 0);
        assert_eq!(stream.ivar().ncols, 1);
        let mut next = 1;
        for dv in stream.dvars() {
            assert_eq!(dv.col, next);
            assert_eq!(dv.ncols, 2);
            next += dv.ncols;
        }
        assert_eq!(next, stream.ncols());
        assert_eq!(stream.dvars()[2].kind, VarKind::Current);
    }
}
