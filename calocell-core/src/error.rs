//! Error types for calocell-core.

use crate::cell::CellId;
use crate::key::RecordKey;
use crate::store::EventState;
use thiserror::Error;

/// Result type alias for calocell operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for calorimeter reconstruction.
///
/// Configuration variants are raised while the pipeline is assembled, before
/// any event is processed. The remaining variants signal violated per-event
/// invariants.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A sampling layer description is inconsistent.
    #[error("invalid sampling layer '{layer}': {reason}")]
    InvalidLayer { layer: String, reason: String },

    /// Two stages declare the same output collection.
    #[error("collection key {0} is declared more than once")]
    DuplicateCollectionKey(RecordKey),

    /// A record key outside the known set.
    #[error("unknown record key: {0}")]
    UnknownRecordKey(String),

    /// Filter weights and waveform disagree in length.
    #[error("weight vector has {weights} entries but the pulse has {samples} samples")]
    WeightMismatch { weights: usize, samples: usize },

    /// A waveform buffer does not have the configured number of samples.
    #[error("waveform has {found} samples, expected {expected}")]
    SampleCountMismatch { expected: usize, found: usize },

    /// A hit outside the configured bunch-crossing window.
    #[error("bunch crossing {bcid} outside window [{start}, {end}]")]
    OutOfWindowHit { bcid: i32, start: i32, end: i32 },

    /// Merge invoked before a layer produced its collection.
    #[error("missing output of layer collection {0}")]
    MissingLayerOutput(RecordKey),

    /// Record not present in the event store.
    #[error("record {0} not found in event store")]
    MissingRecord(RecordKey),

    /// Record already present in the event store.
    #[error("record {0} already present in event store")]
    DuplicateRecord(RecordKey),

    /// Record stored under a key holds a different type.
    #[error("record {key} is not a {expected}")]
    RecordTypeMismatch {
        key: RecordKey,
        expected: &'static str,
    },

    /// The same cell appears in more than one collection.
    #[error("cell {0} appears more than once")]
    DuplicateCell(CellId),

    /// No estimator configured for a sampling layer.
    #[error("no filter configured for sampling {0}")]
    MissingFilter(u16),

    /// Event processed out of order.
    #[error("invalid event state transition from {from:?} to {to:?}")]
    InvalidTransition { from: EventState, to: EventState },
}

impl Error {
    /// Returns true for errors that are raised while configuring the pipeline.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidLayer { .. }
                | Self::DuplicateCollectionKey(_)
                | Self::UnknownRecordKey(_)
                | Self::WeightMismatch { .. }
        )
    }
}
