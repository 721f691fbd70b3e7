//! Incremental reader for analog waveform files written by SPICE-family
//! circuit simulators.
//!
//! The [`stream`] module hides seven on-disk encodings behind one
//! pull-style reader: open a file (with optional format autodetection from
//! the name and contents), inspect its variables, then read rows and
//! per-table sweep-parameter vectors one at a time. The [`wave`] module
//! materializes a whole stream into blocked column storage with binary
//! search and interpolation over the independent variable.
//!
//! ```no_run
//! use spicestream::{open, ReadStatus};
//!
//! # fn main() -> Result<(), spicestream::StreamError> {
//! let mut stream = open("sim.tr0", None)?;
//! let mut ival = 0.0;
//! let mut dvals = vec![0.0; stream.ncols() - 1];
//! while let ReadStatus::Row = stream.read_row(&mut ival, &mut dvals)? {
//!     println!("{} {:?}", ival, dvals);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Diagnostics are emitted through the `log` facade; install any logger to
//! capture them, or none to keep the library silent.

pub mod error;

/// Format parsers and the streaming reader abstraction.
pub mod stream;

/// In-memory materialization, point lookup, and interpolation.
pub mod wave;

pub use error::StreamError;
pub use stream::{
    open, open_from, Format, ReadStatus, SpiceStream, StreamInfo, VarKind, Variable,
};
pub use wave::{WaveFile, WaveTable};
