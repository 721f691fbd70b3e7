//! Incremental readers for analog waveform files.
//!
//! This module implements a uniform pull-style reader over the output
//! formats of several SPICE-family simulators:
//! - HSPICE ascii and binary (`.tr0` / `.sw0` / `.ac0`)
//! - CAzM / TSPICE transient output
//! - Berkeley Spice3 rawfiles, text and binary bodies
//! - Berkeley Spice2G6 rawfiles
//! - Nanosim `.out` files
//! - plain whitespace-separated ascii tables
//!
//! A [`SpiceStream`] exposes the file's variables and produces rows one at
//! a time; multi-table files additionally yield per-table sweep-parameter
//! vectors.

pub(crate) mod ascii;
pub(crate) mod block;
pub(crate) mod hspice;
pub(crate) mod line_reader;
pub(crate) mod nsout;
pub(crate) mod spice2;
pub(crate) mod spice3;

use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::StreamError;

/// Physical kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VarKind {
    /// Kind could not be determined from the file
    #[default]
    Unknown,
    /// Simulation time in seconds
    Time,
    /// Node voltage
    Voltage,
    /// Branch current
    Current,
    /// Analysis frequency in hertz
    Frequency,
}

impl VarKind {
    /// Display name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Time => "Time",
            Self::Voltage => "Voltage",
            Self::Current => "Current",
            Self::Frequency => "Frequency",
        }
    }

    /// Parse a unit name as accepted on converter command lines
    /// (`volts`, `amps`, `hertz`, ...). Unrecognized names map to `Unknown`.
    pub fn from_unit_name(unit: &str) -> Self {
        let unit = unit.to_ascii_lowercase();
        match unit.as_str() {
            "time" => Self::Time,
            "volt" | "volts" | "voltage" => Self::Voltage,
            "current" | "amps" => Self::Current,
            "freq" | "frequency" | "hertz" => Self::Frequency,
            _ => Self::Unknown,
        }
    }
}

/// Descriptor for one logical variable in a stream.
///
/// `col` is the 0-based offset of the first row column holding this
/// variable; complex-valued variables occupy two adjacent columns. Sweep
/// parameters have `ncols == 0` since they do not occupy row columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub col: usize,
    pub ncols: usize,
}

impl Variable {
    pub(crate) fn new(name: impl Into<String>, kind: VarKind, col: usize, ncols: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            col,
            ncols,
        }
    }

    /// Printable name for one physical column of this variable: the bare
    /// name for single-column variables, `name.<digit>` otherwise.
    pub fn column_name(&self, col: usize) -> String {
        if self.ncols <= 1 {
            return self.name.clone();
        }
        let mut name = String::with_capacity(self.name.len() + 2);
        name.push_str(&self.name);
        name.push('.');
        name.push((b'0' + (col % 10) as u8) as char);
        name
    }
}

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    /// HSPICE output, ascii or binary resolved from the first byte
    Hspice,
    /// HSPICE ascii output
    HspiceAscii,
    /// HSPICE binary output
    HspiceBinary,
    /// CAzM / TSPICE text output
    Cazm,
    /// Berkeley Spice3 rawfile
    Spice3Raw,
    /// Berkeley Spice2G6 rawfile
    Spice2Raw,
    /// Plain whitespace-separated ascii table
    Ascii,
    /// Nanosim `.out` file
    Nsout,
}

impl Format {
    /// Registry name of the format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hspice => "hspice",
            Self::HspiceAscii => "hsascii",
            Self::HspiceBinary => "hsbinary",
            Self::Cazm => "cazm",
            Self::Spice3Raw => "spice3raw",
            Self::Spice2Raw => "spice2raw",
            Self::Ascii => "ascii",
            Self::Nsout => "nsout",
        }
    }

    /// Look up a format by registry name.
    pub fn from_name(name: &str) -> Option<Self> {
        FORMAT_REGISTRY
            .iter()
            .map(|entry| entry.format)
            .find(|f| f.name() == name)
    }

    /// All registry format names, in probe order.
    pub fn names() -> impl Iterator<Item = &'static str> {
        FORMAT_REGISTRY.iter().map(|entry| entry.format.name())
    }
}

struct FormatEntry {
    format: Format,
    /// Filename pattern used for autodetection, if any. Full regular
    /// expressions, not shell globs.
    filename_pattern: Option<&'static str>,
}

static FORMAT_REGISTRY: &[FormatEntry] = &[
    FormatEntry {
        format: Format::Hspice,
        filename_pattern: Some(r"\.(tr|sw|ac)[0-9]$"),
    },
    FormatEntry {
        format: Format::HspiceAscii,
        filename_pattern: None,
    },
    FormatEntry {
        format: Format::HspiceBinary,
        filename_pattern: None,
    },
    FormatEntry {
        format: Format::Cazm,
        filename_pattern: Some(r"\.[BNW]$"),
    },
    FormatEntry {
        format: Format::Spice3Raw,
        filename_pattern: Some(r"\.raw$"),
    },
    FormatEntry {
        format: Format::Spice2Raw,
        filename_pattern: Some(r"\.rawspice$"),
    },
    FormatEntry {
        format: Format::Ascii,
        filename_pattern: Some(r"\.(asc|acs|ascii)$"),
    },
    FormatEntry {
        format: Format::Nsout,
        filename_pattern: Some(r"\.out$"),
    },
];

/// Outcome of a [`SpiceStream::read_row`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A row was produced into the output arguments.
    Row,
    /// The current table ended and another table follows; call
    /// [`SpiceStream::read_sweep`] before the next row.
    EndOfTable,
    /// No more data.
    EndOfData,
}

/// Serializable snapshot of a stream's immutable metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub format: Format,
    pub ivar: Variable,
    pub dvars: Vec<Variable>,
    pub sweep_vars: Vec<Variable>,
    pub ncols: usize,
    pub ntables: usize,
}

/// Per-format mutable decoder state.
///
/// Each variant carries only the state its format actually needs; formats
/// without, say, a pushback slot simply have none.
#[derive(Debug)]
pub(crate) enum Decoder {
    Ascii(ascii::AsciiState),
    HspiceAscii(hspice::HspiceAsciiState),
    HspiceBinary(hspice::HspiceBinaryState),
    Spice3Text(spice3::TextState),
    Spice3Binary(spice3::BinaryState),
    Spice2(spice2::Spice2State),
    Nsout(nsout::NsoutState),
}

/// Everything a header parser hands back on success.
#[derive(Debug)]
pub(crate) struct HeaderInfo {
    pub format: Format,
    pub ivar: Variable,
    pub dvars: Vec<Variable>,
    pub sweep_vars: Vec<Variable>,
    pub ncols: usize,
    pub ntables: usize,
    pub decoder: Decoder,
}

/// Immutable facts the row readers need from the handle.
pub(crate) struct RowContext<'a> {
    pub name: &'a str,
    pub ncols: usize,
    pub ntables: usize,
    pub ivar: &'a Variable,
    pub dvars: &'a [Variable],
    pub nsweep: usize,
}

/// Open waveform reader over one byte source.
///
/// The descriptor arrays and column count are fixed once the header has
/// been parsed; all mutation happens inside `read_row` and `read_sweep`.
pub struct SpiceStream<R> {
    name: String,
    format: Format,
    file_size: Option<u64>,
    source: Option<R>,
    ivar: Variable,
    dvars: Vec<Variable>,
    sweep_vars: Vec<Variable>,
    ncols: usize,
    ntables: usize,
    decoder: Decoder,
}

impl<R: Read + Seek> SpiceStream<R> {
    fn from_parts(name: String, file_size: Option<u64>, source: R, header: HeaderInfo) -> Self {
        Self {
            name,
            format: header.format,
            file_size,
            source: Some(source),
            ivar: header.ivar,
            dvars: header.dvars,
            sweep_vars: header.sweep_vars,
            ncols: header.ncols,
            ntables: header.ntables,
            decoder: header.decoder,
        }
    }

    /// Display name of the underlying file or source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved format of the stream.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The independent variable (always column 0).
    pub fn ivar(&self) -> &Variable {
        &self.ivar
    }

    /// Dependent variables in column order.
    pub fn dvars(&self) -> &[Variable] {
        &self.dvars
    }

    /// Sweep parameters, one value per table; empty for most formats.
    pub fn sweep_vars(&self) -> &[Variable] {
        &self.sweep_vars
    }

    /// Number of row columns `read_row` fills in, counting the independent
    /// variable.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of tables declared by the header. Not reliable for formats
    /// that only discover table boundaries while reading.
    pub fn ntables(&self) -> usize {
        self.ntables
    }

    /// Snapshot of the immutable metadata.
    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            name: self.name.clone(),
            format: self.format,
            ivar: self.ivar.clone(),
            dvars: self.dvars.clone(),
            sweep_vars: self.sweep_vars.clone(),
            ncols: self.ncols,
            ntables: self.ntables,
        }
    }

    /// Estimate the number of rows from the file size, for consumers that
    /// want to plan allocations. `None` when no estimate is possible.
    pub fn estimated_rows(&self) -> Option<u64> {
        match self.format {
            Format::HspiceBinary => {
                let size = self.file_size?;
                Some(size / (4 * self.ncols as u64))
            }
            _ => None,
        }
    }

    /// Read the sweep-parameter vector that precedes the rows of each
    /// table. A no-op for streams without sweep parameters.
    ///
    /// `read_row` consumes and discards the vector itself if the caller
    /// has not asked for it by the time the first row of a table is read.
    pub fn read_sweep(&mut self, out: &mut [f64]) -> Result<(), StreamError> {
        if self.sweep_vars.is_empty() {
            return Ok(());
        }
        if out.len() < self.sweep_vars.len() {
            return Err(StreamError::Validation {
                message: format!(
                    "sweep buffer holds {} values but {} sweep parameters are present",
                    out.len(),
                    self.sweep_vars.len()
                ),
            });
        }
        let source = match self.source.as_mut() {
            Some(s) => s,
            None => {
                return Err(StreamError::Validation {
                    message: "stream is closed".to_string(),
                })
            }
        };
        let ctx = RowContext {
            name: &self.name,
            ncols: self.ncols,
            ntables: self.ntables,
            ivar: &self.ivar,
            dvars: &self.dvars,
            nsweep: self.sweep_vars.len(),
        };
        match &mut self.decoder {
            Decoder::HspiceAscii(state) => hspice::read_sweep_ascii(state, source, &ctx, Some(out)),
            Decoder::HspiceBinary(state) => {
                hspice::read_sweep_binary(state, source, &ctx, Some(out))
            }
            // No other format carries sweep parameters.
            _ => Ok(()),
        }
    }

    /// Produce one row: the independent value into `ival`, dependent
    /// values into `dvals` in column order (complex pairs adjacent, real
    /// part first).
    ///
    /// `dvals` must hold at least `ncols() - 1` values. After a `close`
    /// this returns `EndOfData`.
    pub fn read_row(&mut self, ival: &mut f64, dvals: &mut [f64]) -> Result<ReadStatus, StreamError> {
        if dvals.len() + 1 < self.ncols {
            return Err(StreamError::Validation {
                message: format!(
                    "row buffer holds {} values but the stream has {} dependent columns",
                    dvals.len(),
                    self.ncols - 1
                ),
            });
        }
        let source = match self.source.as_mut() {
            Some(s) => s,
            None => return Ok(ReadStatus::EndOfData),
        };
        let ctx = RowContext {
            name: &self.name,
            ncols: self.ncols,
            ntables: self.ntables,
            ivar: &self.ivar,
            dvars: &self.dvars,
            nsweep: self.sweep_vars.len(),
        };
        match &mut self.decoder {
            Decoder::Ascii(state) => ascii::read_row(state, source, &ctx, ival, dvals),
            Decoder::HspiceAscii(state) => hspice::read_row_ascii(state, source, &ctx, ival, dvals),
            Decoder::HspiceBinary(state) => {
                hspice::read_row_binary(state, source, &ctx, ival, dvals)
            }
            Decoder::Spice3Text(state) => spice3::read_row_text(state, source, &ctx, ival, dvals),
            Decoder::Spice3Binary(state) => {
                spice3::read_row_binary(state, source, &ctx, ival, dvals)
            }
            Decoder::Spice2(state) => spice2::read_row(state, source, &ctx, ival, dvals),
            Decoder::Nsout(state) => nsout::read_row(state, source, &ctx, ival, dvals),
        }
    }

    /// Release the byte source. Metadata stays readable; further
    /// `read_row` calls report `EndOfData`.
    pub fn close(&mut self) {
        self.source = None;
    }
}

/// Open a waveform file.
///
/// With an explicit format only that format's header parser runs. With
/// `None` the formats whose filename pattern matches are tried first, then
/// every remaining format in registry order; the source is rewound to the
/// start between attempts.
pub fn open<P: AsRef<Path>>(
    path: P,
    format: Option<Format>,
) -> Result<SpiceStream<BufReader<File>>, StreamError> {
    let path = path.as_ref();
    let name = path.display().to_string();
    let file = File::open(path).map_err(|e| StreamError::Io {
        message: format!("Failed to open file '{}': {}", name, e),
    })?;
    let file_size = file.metadata().ok().map(|m| m.len());
    let mut source = BufReader::new(file);
    let header = resolve_header(&name, &mut source, format)?;
    Ok(SpiceStream::from_parts(name, file_size, source, header))
}

/// Open a waveform stream over an arbitrary byte source with an explicit
/// format. `name` is only used for diagnostics.
pub fn open_from<R: Read + Seek>(
    mut source: R,
    name: &str,
    format: Format,
) -> Result<SpiceStream<R>, StreamError> {
    let header = resolve_header(name, &mut source, Some(format))?;
    Ok(SpiceStream::from_parts(
        name.to_string(),
        None,
        source,
        header,
    ))
}

/// Run one header parser against the source.
///
/// `Ok(None)` means "not this format"; the caller owns the rewind.
fn try_format<R: Read + Seek>(
    format: Format,
    name: &str,
    source: &mut R,
) -> Result<Option<HeaderInfo>, StreamError> {
    match format {
        Format::Hspice => hspice::read_header_auto(name, source),
        Format::HspiceAscii => hspice::read_header_ascii(name, source),
        Format::HspiceBinary => hspice::read_header_binary(name, source),
        Format::Cazm => ascii::read_header_cazm(name, source),
        Format::Spice3Raw => spice3::read_header(name, source),
        Format::Spice2Raw => spice2::read_header(name, source),
        Format::Ascii => ascii::read_header_ascii(name, source),
        Format::Nsout => nsout::read_header(name, source),
    }
}

/// Select and run a header parser, autodetecting when no format is given.
pub(crate) fn resolve_header<R: Read + Seek>(
    name: &str,
    source: &mut R,
    format: Option<Format>,
) -> Result<HeaderInfo, StreamError> {
    if let Some(format) = format {
        return match try_format(format, name, source)? {
            Some(header) => Ok(header),
            None => {
                debug!("failed to open {} using format {}", name, format.name());
                Err(StreamError::Format {
                    message: format!("{}: not a {} file", name, format.name()),
                })
            }
        };
    }

    let mut tried = [false; 8];

    // First pass: formats whose filename pattern matches.
    for (i, entry) in FORMAT_REGISTRY.iter().enumerate() {
        let Some(pattern) = entry.filename_pattern else {
            continue;
        };
        let re = Regex::new(pattern).expect("invalid filename pattern in format registry");
        if !re.is_match(name) {
            continue;
        }
        tried[i] = true;
        if let Some(header) = try_format(entry.format, name, source)? {
            info!("{}: read with format \"{}\"", name, entry.format.name());
            return Ok(header);
        }
        source.seek(SeekFrom::Start(0))?;
    }

    // Second pass: everything else, in registry order.
    for (i, entry) in FORMAT_REGISTRY.iter().enumerate() {
        if tried[i] {
            continue;
        }
        if let Some(header) = try_format(entry.format, name, source)? {
            info!("{}: read with format \"{}\"", name, entry.format.name());
            return Ok(header);
        }
        source.seek(SeekFrom::Start(0))?;
    }

    Err(StreamError::Format {
        message: format!("{}: no supported waveform format recognized", name),
    })
}

/// Parse the leading float of a token, `atof` style: leading whitespace is
/// skipped and parsing stops at the first character that cannot extend a
/// valid number. Returns 0.0 when no number is present.
pub(crate) fn parse_leading_f64(token: &str) -> f64 {
    let token = token.trim_start();
    let bytes = token.as_bytes();
    let mut end = 0;
    while end < bytes.len()
        && matches!(bytes[end], b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')
    {
        end += 1;
    }
    while end > 0 {
        if let Ok(v) = token[..end].parse::<f64>() {
            return v;
        }
        end -= 1;
    }
    0.0
}

/// Parse the leading integer of a token, `atoi` style.
pub(crate) fn parse_leading_int(token: &str) -> i64 {
    let token = token.trim_start();
    let bytes = token.as_bytes();
    let mut end = 0;
    if end < bytes.len() && matches!(bytes[end], b'+' | b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    token[..end].parse::<i64>().unwrap_or(0)
}
