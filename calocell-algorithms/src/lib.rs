//! calocell-algorithms: Reconstruction stages for calorimeter cells.
//!
//! This crate provides the stages of the cell reconstruction chain:
//! - **PulseGenerator** - shaper response sampling with bunch-crossing pileup
//! - **OptimalFilter** - linear energy/time estimation from sampled pulses
//! - **CaloCellMaker** - per-layer accumulation, calibration and estimation
//! - **CaloCellMerge** - union of the layer collections into reco/truth views
//! - **CrossTalk** - optional signal leakage between readout neighbors
//! - **CaloCellBuilder** - assembly of the ordered pipeline
//!

mod builder;
mod calibration;
mod crosstalk;
mod filter;
mod maker;
mod merge;
pub mod monitoring;
mod processing;
mod pulse;
mod shaper;

pub use builder::{CaloCellBuilder, CellBuilderConfig, OutputLevel};
pub use calibration::{Calibration, TimeOfFlightCalibration, SPEED_OF_LIGHT_MM_PER_NS};
pub use crosstalk::{
    CrossTalk, CrossTalkConfig, CrossTalkCoupling, NeighborKind, ReadoutMap, ReadoutNeighbors,
    WindowNeighbors,
};
pub use filter::{
    CellEstimator, ConstrainedOptimalFilter, Estimate, OptimalFilter, OptimalFilterConfig,
    TIME_ENERGY_EPSILON,
};
pub use maker::{CaloCellMaker, CellMakerState};
pub use merge::CaloCellMerge;
pub use monitoring::{Histogram1D, MonitorSet};
pub use processing::{derive_seed, EventReport, LayerReport, Pipeline};
pub use pulse::{PulseGenerator, PulseGeneratorConfig};
pub use shaper::{PulseShape, TabulatedShaper};
