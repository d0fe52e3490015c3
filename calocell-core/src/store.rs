//! Per-event record store.
//!
//! Stages exchange data through an [`EventStore`] keyed by [`RecordKey`].
//! A record is written once per event; the store is discarded after the
//! event has been persisted.

use std::collections::HashMap;

use crate::collection::{CellCollection, CellContainer, TruthCellContainer};
use crate::error::{Error, Result};
use crate::hit::CaloHit;
use crate::key::RecordKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Event identification.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventInfo {
    pub event_number: u64,
    pub run_number: u32,
    /// Average number of pileup interactions.
    pub avg_mu: f32,
}

/// Processing state of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EventState {
    #[default]
    Idle,
    Accumulating,
    Filtered,
    Merged,
    CrossTalkApplied,
    Persisted,
}

impl EventState {
    /// Returns true if `next` may follow `self`.
    #[must_use]
    pub fn can_advance_to(self, next: EventState) -> bool {
        use EventState::{Accumulating, CrossTalkApplied, Filtered, Idle, Merged, Persisted};
        matches!(
            (self, next),
            (Idle, Accumulating)
                | (Accumulating, Filtered)
                | (Filtered, Merged)
                | (Merged, CrossTalkApplied | Persisted)
                | (CrossTalkApplied, Persisted)
        )
    }
}

/// A typed record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    EventInfo(EventInfo),
    Hits(Vec<CaloHit>),
    Collection(CellCollection),
    Cells(CellContainer),
    TruthCells(TruthCellContainer),
}

impl Record {
    fn kind(&self) -> &'static str {
        match self {
            Self::EventInfo(_) => "event info",
            Self::Hits(_) => "hit list",
            Self::Collection(_) => "cell collection",
            Self::Cells(_) => "cell container",
            Self::TruthCells(_) => "truth cell container",
        }
    }
}

/// Records of a single event.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    info: EventInfo,
    state: EventState,
    records: HashMap<RecordKey, Record>,
}

impl EventStore {
    /// Creates a store holding the event info and the truth hits.
    #[must_use]
    pub fn new(info: EventInfo, hits_key: RecordKey, hits: Vec<CaloHit>) -> Self {
        let mut records = HashMap::new();
        records.insert(RecordKey::EventInfo, Record::EventInfo(info));
        records.insert(hits_key, Record::Hits(hits));
        Self {
            info,
            state: EventState::Idle,
            records,
        }
    }

    /// Event identification.
    #[must_use]
    pub fn info(&self) -> EventInfo {
        self.info
    }

    /// Current processing state.
    #[must_use]
    pub fn state(&self) -> EventState {
        self.state
    }

    /// Moves the event to its next processing state.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransition`] if `next` cannot follow the current state.
    pub fn advance(&mut self, next: EventState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Returns true if a record exists under `key`.
    #[must_use]
    pub fn contains(&self, key: RecordKey) -> bool {
        self.records.contains_key(&key)
    }

    /// Stores a record.
    ///
    /// # Errors
    /// Returns [`Error::DuplicateRecord`] if the key is already taken.
    pub fn record(&mut self, key: RecordKey, record: Record) -> Result<()> {
        if self.records.contains_key(&key) {
            return Err(Error::DuplicateRecord(key));
        }
        self.records.insert(key, record);
        Ok(())
    }

    fn get(&self, key: RecordKey) -> Result<&Record> {
        self.records.get(&key).ok_or(Error::MissingRecord(key))
    }

    /// Truth hits stored under `key`.
    ///
    /// # Errors
    /// Fails if the record is missing or not a hit list.
    pub fn hits(&self, key: RecordKey) -> Result<&[CaloHit]> {
        match self.get(key)? {
            Record::Hits(hits) => Ok(hits),
            _ => Err(Error::RecordTypeMismatch {
                key,
                expected: "hit list",
            }),
        }
    }

    /// Layer collection stored under `key`.
    ///
    /// # Errors
    /// Fails if the record is missing or not a cell collection.
    pub fn collection(&self, key: RecordKey) -> Result<&CellCollection> {
        match self.get(key)? {
            Record::Collection(c) => Ok(c),
            _ => Err(Error::RecordTypeMismatch {
                key,
                expected: "cell collection",
            }),
        }
    }

    /// Cell container stored under `key`.
    ///
    /// # Errors
    /// Fails if the record is missing or not a cell container.
    pub fn cells(&self, key: RecordKey) -> Result<&CellContainer> {
        match self.get(key)? {
            Record::Cells(c) => Ok(c),
            _ => Err(Error::RecordTypeMismatch {
                key,
                expected: "cell container",
            }),
        }
    }

    /// Truth cell container stored under `key`.
    ///
    /// # Errors
    /// Fails if the record is missing or not a truth cell container.
    pub fn truth_cells(&self, key: RecordKey) -> Result<&TruthCellContainer> {
        match self.get(key)? {
            Record::TruthCells(c) => Ok(c),
            _ => Err(Error::RecordTypeMismatch {
                key,
                expected: "truth cell container",
            }),
        }
    }

    /// Iterates over stored keys with a description of their record type.
    pub fn keys(&self) -> impl Iterator<Item = (RecordKey, &'static str)> + '_ {
        self.records.iter().map(|(k, r)| (*k, r.kind()))
    }
}
