//! Cell output writers.

use crate::Result;
use calocell_algorithms::MonitorSet;
use calocell_core::{CellRecord, EventStore, RecordKey};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Size of one binary cell record in bytes.
pub const BINARY_RECORD_SIZE: usize = 41;

const CSV_HEADER: &str =
    "event,key,hash,sampling,eta_bin,phi_bin,eta,phi,delta_eta,delta_phi,energy,time";

/// Output encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per cell with a header row.
    Csv,
    /// Little-endian fixed-size records.
    Binary,
}

impl OutputFormat {
    /// Picks the format from a file extension; anything but `.bin` is CSV.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bin") => Self::Binary,
            _ => Self::Csv,
        }
    }
}

/// Writer for reconstructed cells.
///
/// Binary format, per cell: u64 (event) + u8 (record key code) + u64 (cell
/// hash) + 6 x f32 (eta, phi, delta eta, delta phi, energy, time).
pub struct CellFileWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
    header_written: bool,
    records: usize,
}

impl CellFileWriter {
    /// Creates a new file writer, choosing the format from the extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let format = OutputFormat::from_path(&path);
        Self::create_with_format(path, format)
    }

    /// Creates a new file writer with an explicit format.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create_with_format<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self {
            writer,
            format,
            header_written: false,
            records: 0,
        })
    }

    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Number of cell records written so far.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Writes cells of one event.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_cells<'a, C, I>(&mut self, event: u64, key: RecordKey, cells: I) -> Result<()>
    where
        C: CellRecord + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        match self.format {
            OutputFormat::Csv => self.write_cells_csv(event, key, cells),
            OutputFormat::Binary => self.write_cells_binary(event, key, cells),
        }
    }

    /// Writes the merged, truth and (when present) cross-talk cells of an event.
    ///
    /// # Errors
    /// Returns an error if a record is missing or writing fails.
    pub fn write_event(&mut self, store: &EventStore) -> Result<()> {
        let event = store.info().event_number;
        self.write_cells(event, RecordKey::Cells, store.cells(RecordKey::Cells)?.iter())?;
        self.write_cells(
            event,
            RecordKey::TruthCells,
            store.truth_cells(RecordKey::TruthCells)?.iter(),
        )?;
        if store.contains(RecordKey::XTCells) {
            self.write_cells(event, RecordKey::XTCells, store.cells(RecordKey::XTCells)?.iter())?;
        }
        Ok(())
    }

    fn write_cells_csv<'a, C, I>(&mut self, event: u64, key: RecordKey, cells: I) -> Result<()>
    where
        C: CellRecord + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        if !self.header_written {
            writeln!(self.writer, "{CSV_HEADER}")?;
            self.header_written = true;
        }

        for c in cells {
            let id = c.id();
            let g = c.geometry();
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},{},{}",
                event,
                key,
                id.hash(),
                id.sampling,
                id.eta_bin,
                id.phi_bin,
                g.eta,
                g.phi,
                g.delta_eta,
                g.delta_phi,
                c.energy(),
                c.time()
            )?;
            self.records += 1;
        }
        Ok(())
    }

    fn write_cells_binary<'a, C, I>(&mut self, event: u64, key: RecordKey, cells: I) -> Result<()>
    where
        C: CellRecord + 'a,
        I: IntoIterator<Item = &'a C>,
    {
        for c in cells {
            let g = c.geometry();
            self.writer.write_all(&event.to_le_bytes())?;
            self.writer.write_all(&[key.code()])?;
            self.writer.write_all(&c.id().hash().to_le_bytes())?;
            for value in [g.eta, g.phi, g.delta_eta, g.delta_phi, c.energy(), c.time()] {
                self.writer.write_all(&value.to_le_bytes())?;
            }
            self.records += 1;
        }
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Dumps monitoring histograms as pretty-printed JSON.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_histograms<P: AsRef<Path>>(path: P, monitor: &MonitorSet) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, monitor)?;
    writer.flush()?;
    Ok(())
}
