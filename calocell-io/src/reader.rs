//! JSON-lines hit event reader.
//!
//! One event per line:
//!
//! ```json
//! {"event_number": 7, "run_number": 1, "avg_mu": 40.0,
//!  "hits": [{"x": 1600.0, "y": 0.0, "z": 12.0, "time": 5.5, "edep": 230.0, "bcid": 0}]}
//! ```
//!
//! `run_number`, `avg_mu` and a hit's `bcid` are optional. Hits without a
//! `bcid` are assigned the bunch crossing their global time falls into.

use crate::{Error, Result};
use calocell_core::{
    bunch_crossing_for_time, CaloHit, DetectorDescription, EventInfo, EventStore, Position,
    RecordKey,
};
use log::{debug, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonEvent {
    event_number: u64,
    #[serde(default)]
    run_number: u32,
    #[serde(default)]
    avg_mu: f32,
    #[serde(default)]
    hits: Vec<JsonHit>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonHit {
    x: f32,
    y: f32,
    z: f32,
    time: f32,
    edep: f32,
    #[serde(default)]
    bcid: Option<i32>,
}

/// Bunch-crossing window used to assign crossings from hit times.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BunchWindow {
    pub start: i32,
    pub end: i32,
    /// Time between two bunch crossings (ns).
    pub duration: f32,
}

impl Default for BunchWindow {
    fn default() -> Self {
        Self {
            start: -21,
            end: 4,
            duration: 25.0,
        }
    }
}

impl BunchWindow {
    /// Union of the pileup windows of all layers of a detector.
    ///
    /// The crossing duration is taken from the first layer. An empty
    /// detector yields the default window.
    #[must_use]
    pub fn for_detector(detector: &DetectorDescription) -> Self {
        let mut layers = detector.samplings.iter();
        let Some(first) = layers.next() else {
            return Self::default();
        };
        layers.fold(
            Self {
                start: first.bunch_id_start,
                end: first.bunch_id_end,
                duration: first.bunch_duration,
            },
            |window, layer| Self {
                start: window.start.min(layer.bunch_id_start),
                end: window.end.max(layer.bunch_id_end),
                duration: window.duration,
            },
        )
    }
}

/// Streaming reader of hit events.
pub struct HitEventReader<R> {
    reader: R,
    hits_key: RecordKey,
    window: BunchWindow,
    line: usize,
    hits_skipped: usize,
    buffer: String,
}

impl HitEventReader<BufReader<File>> {
    /// Opens a JSON-lines hit file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> HitEventReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hits_key: RecordKey::Hits,
            window: BunchWindow::default(),
            line: 0,
            hits_skipped: 0,
            buffer: String::new(),
        }
    }

    /// Sets the record the hits are stored under.
    #[must_use]
    pub fn with_hits_key(mut self, key: RecordKey) -> Self {
        self.hits_key = key;
        self
    }

    /// Sets the window used for hits without an explicit bunch crossing.
    #[must_use]
    pub fn with_bunch_window(mut self, window: BunchWindow) -> Self {
        self.window = window;
        self
    }

    /// Hits dropped so far because their time fell outside the window.
    #[must_use]
    pub fn hits_skipped(&self) -> usize {
        self.hits_skipped
    }

    /// Reads the next event.
    ///
    /// # Errors
    /// Returns an error for I/O failures or malformed lines.
    pub fn read_event(&mut self) -> Result<Option<EventStore>> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            if !self.buffer.trim().is_empty() {
                break;
            }
        }

        let event: JsonEvent = serde_json::from_str(&self.buffer)
            .map_err(|e| Error::InvalidFormat(format!("line {}: {e}", self.line)))?;
        Ok(Some(self.build_store(event)))
    }

    /// Reads up to `max` events.
    ///
    /// # Errors
    /// Returns the first read error.
    pub fn read_batch(&mut self, max: usize) -> Result<Vec<EventStore>> {
        let mut batch = Vec::with_capacity(max);
        while batch.len() < max {
            match self.read_event()? {
                Some(store) => batch.push(store),
                None => break,
            }
        }
        Ok(batch)
    }

    fn build_store(&mut self, event: JsonEvent) -> EventStore {
        let window = self.window;
        let total = event.hits.len();
        let hits: Vec<CaloHit> = event
            .hits
            .into_iter()
            .filter_map(|h| {
                let bcid = h.bcid.or_else(|| {
                    bunch_crossing_for_time(h.time, window.start, window.end, window.duration)
                })?;
                Some(CaloHit::new(Position::new(h.x, h.y, h.z), h.time, h.edep, bcid))
            })
            .collect();

        let skipped = total - hits.len();
        if skipped > 0 {
            warn!(
                "event {}: {skipped} hit(s) outside the bunch-crossing window skipped",
                event.event_number
            );
            self.hits_skipped += skipped;
        }
        debug!("event {}: read {} hit(s)", event.event_number, hits.len());

        let info = EventInfo {
            event_number: event.event_number,
            run_number: event.run_number,
            avg_mu: event.avg_mu,
        };
        EventStore::new(info, self.hits_key, hits)
    }
}

impl<R: BufRead> Iterator for HitEventReader<R> {
    type Item = Result<EventStore>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_event().transpose()
    }
}
