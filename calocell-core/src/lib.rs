//! calocell-core: Core types for calorimeter cell reconstruction.
//!
//! This crate provides the data model shared by the reconstruction stages:
//! truth hits, cells through their accumulate/freeze/estimate lifecycle,
//! per-layer geometry and readout configuration, and the per-event record
//! store.
//!

pub mod cell;
pub mod collection;
pub mod error;
pub mod hit;
pub mod key;
pub mod sampling;
pub mod store;

pub use cell::{
    AccumulatingCell, CaloCell, CellGeometry, CellId, CellRecord, CellTruth, FrozenCell, TruthCell,
};
pub use collection::{CellCollection, CellContainer, MergedCellContainer, TruthCellContainer};
pub use error::{Error, Result};
pub use hit::{bunch_crossing_for_time, fix_phi, CaloHit, Hit, Position};
pub use key::RecordKey;
pub use sampling::{DetectorDescription, SamplingId, SamplingLayerConfig, ShaperTable};
pub use store::{EventInfo, EventState, EventStore, Record};
