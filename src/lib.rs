//! Reader for ASCII PSF (Parameter Storage Format) simulator result files.
//!
//! ```no_run
//! # fn main() -> Result<(), psf_reader::Error> {
//! let dataset = psf_reader::load("ac.psf")?;
//! let out = dataset.get_signal("out")?;
//! println!("{} ({})", out.name, out.units);
//! # Ok(())
//! # }
//! ```
//!
//! The crate is a library only: command-line front-ends for listing and plotting
//! signals are external collaborators that consume this public surface, not part of
//! this repository.

mod cache;
mod fast_scan;
mod lexer;
mod parser;
mod reader;
mod units;

pub mod error;
pub mod types;

pub use error::{Error, LocatedMessage, Location};
pub use reader::{load, load_with_options, LoadOptions};
pub use types::{
    GroupDef, NamedValues, Ordinate, PropValue, PsfDataset, PsfType, Signal, SignalTable, StructType, Sweep, Trace,
    TraceShape,
};
pub use units::{units_to_latex, units_to_unicode};
