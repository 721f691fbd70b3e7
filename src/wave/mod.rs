//! In-memory materialization of waveform streams.
//!
//! [`WaveFile`] drains a [`SpiceStream`] to exhaustion, storing each table
//! in blocked column storage with per-column min/max, and offers binary
//! search over the independent column plus linear interpolation of
//! dependent values.

pub mod dataset;

use log::{debug, error};
use std::io::{Read, Seek};
use std::path::Path;

use crate::error::StreamError;
use crate::stream::{Format, ReadStatus, SpiceStream, Variable};
pub use dataset::DataSet;

/// One contiguous block of rows sharing a single independent-variable
/// trajectory and one set of sweep-parameter values.
pub struct WaveTable {
    swindex: usize,
    name: String,
    swval: Option<f64>,
    iv: DataSet,
    columns: Vec<DataSet>,
}

impl WaveTable {
    fn new(swindex: usize, name: Option<String>, swval: Option<f64>, ncols: usize) -> Self {
        Self {
            swindex,
            name: name.unwrap_or_else(|| format!("tbl{}", swindex)),
            swval,
            iv: DataSet::new(),
            columns: (1..ncols).map(|_| DataSet::new()).collect(),
        }
    }

    fn push_row(&mut self, ival: f64, dvals: &[f64]) {
        self.iv.push(ival);
        for (column, &val) in self.columns.iter_mut().zip(dvals) {
            column.push(val);
        }
    }

    /// 0-based index of this sweep within the file.
    pub fn swindex(&self) -> usize {
        self.swindex
    }

    /// Name of the sweep: the sweep parameter's name, or `tbl<N>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the sweep parameter for this table, if any.
    pub fn sweep_value(&self) -> Option<f64> {
        self.swval
    }

    /// Number of rows in the table.
    pub fn rows(&self) -> usize {
        self.iv.len()
    }

    /// Column storage; column 0 is the independent variable.
    pub fn column(&self, col: usize) -> &DataSet {
        if col == 0 {
            &self.iv
        } else {
            &self.columns[col - 1]
        }
    }

    /// Value at `(column, row)`; column 0 is the independent variable.
    pub fn value(&self, col: usize, row: usize) -> f64 {
        self.column(col).get(row)
    }

    /// Smallest value in a column.
    pub fn min(&self, col: usize) -> f64 {
        self.column(col).min()
    }

    /// Largest value in a column.
    pub fn max(&self, col: usize) -> f64 {
        self.column(col).max()
    }

    /// Index of the last row whose independent value is not greater than
    /// `ival`, clamped to the final row when `ival` is at or beyond the
    /// maximum. With duplicate values the highest matching index wins.
    pub fn find_point(&self, ival: f64) -> usize {
        let n = self.iv.len();
        if n == 0 {
            return 0;
        }
        if ival >= self.iv.max() {
            return n - 1;
        }
        // Half-open search for the first row greater than ival.
        let mut lo = 0;
        let mut hi = n;
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.iv.get(mid) <= ival {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.saturating_sub(1)
    }

    /// Value of data column `col` at independent value `ival`, linearly
    /// interpolated between the surrounding samples. Values beyond the
    /// last sample clamp to it; there is no extrapolation.
    pub fn interp_value(&self, col: usize, ival: f64) -> f64 {
        let n = self.rows();
        let li = self.find_point(ival);
        let ri = li + 1;
        if ri >= n {
            return self.value(col, n - 1);
        }

        let lx = self.iv.get(li);
        let rx = self.iv.get(ri);
        let ly = self.value(col, li);
        let ry = self.value(col, ri);
        if ival > rx {
            return ry;
        }
        ly + (ry - ly) * ((ival - lx) / (rx - lx))
    }
}

enum ReadState {
    /// No rows pending.
    Fresh,
    /// A table finished and the stream says more follow.
    MoreTables,
    /// The first row of the next table was already fetched.
    HeldRow,
    /// The stream is exhausted.
    Done,
}

/// All data from one waveform file.
pub struct WaveFile {
    name: String,
    format: Format,
    ivar: Variable,
    dvars: Vec<Variable>,
    sweep_vars: Vec<Variable>,
    ncols: usize,
    tables: Vec<WaveTable>,
}

impl WaveFile {
    /// Open a waveform file and materialize all of its tables.
    pub fn read<P: AsRef<Path>>(path: P, format: Option<Format>) -> Result<Self, StreamError> {
        let stream = crate::stream::open(path, format)?;
        Self::from_stream(stream)
    }

    /// Drain an open stream into tables. The stream's byte source is
    /// released before returning.
    pub fn from_stream<R: Read + Seek>(mut stream: SpiceStream<R>) -> Result<Self, StreamError> {
        let ncols = stream.ncols();
        let nsweep = stream.sweep_vars().len();
        if nsweep > 1 {
            error!(
                "{}: nsweepparam={}; multidimensional sweeps not supported",
                stream.name(),
                nsweep
            );
            return Err(StreamError::Validation {
                message: format!(
                    "{}: multidimensional sweeps not supported",
                    stream.name()
                ),
            });
        }

        let mut tables = Vec::new();
        let mut ival = 0.0;
        let mut dvals = vec![0.0; ncols - 1];
        let mut state = ReadState::Fresh;

        loop {
            let mut sweep = None;
            if nsweep == 1 {
                let mut spar = [0.0];
                stream.read_sweep(&mut spar)?;
                sweep = Some((stream.sweep_vars()[0].name.clone(), spar[0]));
            }
            let (name, swval) = match sweep {
                Some((name, val)) => (Some(name), Some(val)),
                None => (None, None),
            };
            let mut table = WaveTable::new(tables.len(), name, swval, ncols);

            let mut last_ival = -1.0e29;
            if matches!(state, ReadState::HeldRow) {
                table.push_row(ival, &dvals);
                last_ival = ival;
            }
            state = ReadState::Done;

            loop {
                match stream.read_row(&mut ival, &mut dvals)? {
                    ReadStatus::Row => {
                        let row = table.rows();
                        if row > 0 && ival < last_ival {
                            if row == 1 {
                                error!(
                                    "{}: independent variable is not nondecreasing at row {}; ival={} last_ival={}",
                                    stream.name(),
                                    row,
                                    ival,
                                    last_ival
                                );
                                return Err(StreamError::NotMonotonic {
                                    message: format!(
                                        "{}: independent variable decreased at row {}",
                                        stream.name(),
                                        row
                                    ),
                                });
                            }
                            // Start of an unannounced next table; the
                            // fetched row belongs to it.
                            state = ReadState::HeldRow;
                            break;
                        }
                        last_ival = ival;
                        table.push_row(ival, &dvals);
                    }
                    ReadStatus::EndOfTable => {
                        state = ReadState::MoreTables;
                        break;
                    }
                    ReadStatus::EndOfData => {
                        state = ReadState::Done;
                        break;
                    }
                }
            }

            debug!(
                "{}: table {} with {} rows",
                stream.name(),
                table.swindex,
                table.rows()
            );
            tables.push(table);
            if matches!(state, ReadState::Done) {
                break;
            }
        }

        let info = stream.info();
        stream.close();

        Ok(Self {
            name: info.name,
            format: info.format,
            ivar: info.ivar,
            dvars: info.dvars,
            sweep_vars: info.sweep_vars,
            ncols: info.ncols,
            tables,
        })
    }

    /// Display name of the source file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format the file was read with.
    pub fn format(&self) -> Format {
        self.format
    }

    /// The independent variable descriptor.
    pub fn ivar(&self) -> &Variable {
        &self.ivar
    }

    /// Dependent variable descriptors, in column order.
    pub fn dvars(&self) -> &[Variable] {
        &self.dvars
    }

    /// Sweep parameter descriptors.
    pub fn sweep_vars(&self) -> &[Variable] {
        &self.sweep_vars
    }

    /// Number of data columns per row, counting the independent variable.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Materialized tables, in file order.
    pub fn tables(&self) -> &[WaveTable] {
        &self.tables
    }

    /// Look up a dependent variable by name, case-insensitively. Names are
    /// also matched against HSPICE's `v(`-wrapped spellings, so `out`
    /// finds `v(out)`.
    pub fn find_variable(&self, varname: &str) -> Option<&Variable> {
        if let Some(dv) = self
            .dvars
            .iter()
            .find(|dv| dv.name.eq_ignore_ascii_case(varname))
        {
            return Some(dv);
        }
        self.dvars.iter().find(|dv| {
            let name = dv.name.as_str();
            if !name.ends_with(')') {
                return false;
            }
            let Some(prefix) = name.get(..2) else {
                return false;
            };
            let Some(inner) = name.get(2..name.len() - 1) else {
                return false;
            };
            prefix.eq_ignore_ascii_case("v(") && inner.eq_ignore_ascii_case(varname)
        })
    }
}
