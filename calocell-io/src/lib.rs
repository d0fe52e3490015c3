//! calocell-io: file I/O for calocell.
//!
//! Loads JSON detector descriptions, streams JSON-lines hit events into
//! per-event stores and writes reconstructed cells as CSV or binary records.

mod detector;
mod error;
mod reader;
mod writer;

pub use detector::{load_detector, parse_detector, read_shaper_file};
pub use error::{Error, Result};
pub use reader::{BunchWindow, HitEventReader};
pub use writer::{write_histograms, CellFileWriter, OutputFormat, BINARY_RECORD_SIZE};
