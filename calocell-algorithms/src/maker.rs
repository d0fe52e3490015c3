//! Per-layer cell maker.
//!
//! For one event and one sampling layer: select the hits inside the layer
//! volume and bunch-crossing window, map them onto (eta, phi) cells,
//! superpose their pulses, then freeze, calibrate and estimate every
//! populated cell.

use std::collections::BTreeMap;

use crate::calibration::{Calibration, TimeOfFlightCalibration};
use crate::filter::{CellEstimator, OptimalFilter};
use crate::pulse::{PulseGenerator, PulseGeneratorConfig};
use crate::shaper::{PulseShape, TabulatedShaper};
use calocell_core::cell::{AccumulatingCell, CellId};
use calocell_core::collection::CellCollection;
use calocell_core::error::Result;
use calocell_core::hit::Hit;
use calocell_core::key::RecordKey;
use calocell_core::sampling::{SamplingId, SamplingLayerConfig};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Counters of one cell maker run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CellMakerState {
    /// Hits inspected.
    pub hits_processed: usize,
    /// Hits superposed into a cell.
    pub hits_accumulated: usize,
    /// Hits inside the layer dropped for being outside the bunch window.
    pub hits_out_of_window: usize,
    /// Hits inside the layer volume but outside the (eta, phi) grid.
    pub hits_outside_grid: usize,
    /// Cells emitted.
    pub cells_created: usize,
}

impl CellMakerState {
    /// Clears all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Adds the counters of another run.
    pub fn absorb(&mut self, other: &Self) {
        self.hits_processed += other.hits_processed;
        self.hits_accumulated += other.hits_accumulated;
        self.hits_out_of_window += other.hits_out_of_window;
        self.hits_outside_grid += other.hits_outside_grid;
        self.cells_created += other.cells_created;
    }
}

/// Builds the cell collection of one sampling layer.
pub struct CaloCellMaker {
    layer: SamplingLayerConfig,
    pulse: PulseGenerator,
    calibration: Box<dyn Calibration>,
    estimator: Box<dyn CellEstimator>,
}

impl std::fmt::Debug for CaloCellMaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaloCellMaker")
            .field("layer", &self.layer.name)
            .field("collection_key", &self.layer.collection_key)
            .field("calibration", &self.calibration.name())
            .field("estimator", &self.estimator.name())
            .finish_non_exhaustive()
    }
}

impl CaloCellMaker {
    /// Creates a maker with the tabulated shaper, time-of-flight calibration
    /// and optimal filter of the layer.
    ///
    /// # Errors
    /// Returns a configuration error if the layer description is inconsistent.
    pub fn new(layer: SamplingLayerConfig, pulse: &PulseGeneratorConfig) -> Result<Self> {
        layer.validate()?;
        let shape = TabulatedShaper::new(&layer.shaper)?;
        Self::with_shape(layer, pulse, Box::new(shape))
    }

    /// Creates a maker with a custom pulse shape.
    ///
    /// # Errors
    /// Returns a configuration error if the layer description is inconsistent.
    pub fn with_shape(
        layer: SamplingLayerConfig,
        pulse: &PulseGeneratorConfig,
        shape: Box<dyn PulseShape>,
    ) -> Result<Self> {
        layer.validate()?;
        let pulse = PulseGenerator::new(pulse.for_layer(&layer), shape)?;
        let estimator = OptimalFilter::from_layer(&layer)?;
        Ok(Self {
            layer,
            pulse,
            calibration: Box::new(TimeOfFlightCalibration),
            estimator: Box::new(estimator),
        })
    }

    /// Replaces the estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Box<dyn CellEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Replaces the calibration.
    #[must_use]
    pub fn with_calibration(mut self, calibration: Box<dyn Calibration>) -> Self {
        self.calibration = calibration;
        self
    }

    /// Stage name.
    #[must_use]
    pub fn name(&self) -> String {
        format!("CaloCellMaker_{}", self.layer.collection_key)
    }

    #[must_use]
    pub fn layer(&self) -> &SamplingLayerConfig {
        &self.layer
    }

    #[must_use]
    pub fn sampling(&self) -> SamplingId {
        self.layer.sampling
    }

    #[must_use]
    pub fn collection_key(&self) -> RecordKey {
        self.layer.collection_key
    }

    /// Builds the layer collection for one event.
    ///
    /// Hits outside the layer volume are ignored. Hits outside the bunch
    /// window or the (eta, phi) grid are dropped and counted in `state`.
    /// Cells are emitted in bin order. `seed` drives noise and deformation.
    ///
    /// # Errors
    /// Propagates estimator failures.
    pub fn process<H: Hit>(
        &self,
        hits: &[H],
        seed: u64,
        state: &mut CellMakerState,
    ) -> Result<CellCollection> {
        let layer = &self.layer;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cells: BTreeMap<CellId, AccumulatingCell> = BTreeMap::new();
        let dropped_before = state.hits_out_of_window;

        for hit in hits {
            state.hits_processed += 1;
            if !layer.contains(hit.radius(), hit.position().z) {
                continue;
            }
            if !layer.in_window(hit.bcid()) {
                state.hits_out_of_window += 1;
                continue;
            }
            let Some(id) = layer.cell_of(hit.eta(), hit.phi()) else {
                state.hits_outside_grid += 1;
                continue;
            };
            let cell = cells.entry(id).or_insert_with(|| {
                AccumulatingCell::new(
                    id,
                    layer.geometry(id),
                    layer.noise,
                    layer.samples,
                    layer.bunch_id_start,
                    layer.window_len(),
                )
            });
            self.pulse
                .accumulate(cell.waveform_mut(), hit.edep(), hit.bcid(), &mut rng)?;
            cell.deposit(hit.bcid(), hit.edep(), hit.time_ns());
            state.hits_accumulated += 1;
        }

        let dropped = state.hits_out_of_window - dropped_before;
        if dropped > 0 {
            warn!(
                "{}: dropped {dropped} hit(s) outside bunch window [{}, {}]",
                layer.name, layer.bunch_id_start, layer.bunch_id_end
            );
        }

        let mut collection = CellCollection::new(layer.collection_key, layer.sampling);
        collection.cells.reserve(cells.len());
        for cell in cells.into_values() {
            let mut frozen = cell.freeze();
            self.pulse.finalize(&mut frozen.pulse, &mut rng)?;
            self.calibration.calibrate(&mut frozen);
            let estimate = self.estimator.estimate(&frozen.pulse, frozen.noise)?;
            collection
                .cells
                .push(frozen.into_cell(estimate.energy, estimate.time));
        }
        state.cells_created += collection.len();

        debug!(
            "{}: {} cell(s) from {} hit(s) into {}",
            layer.name,
            collection.len(),
            state.hits_accumulated,
            layer.collection_key
        );
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ConstrainedOptimalFilter;
    use approx::assert_abs_diff_eq;
    use calocell_core::error::Error;
    use calocell_core::hit::{CaloHit, Position};
    use calocell_core::sampling::ShaperTable;
    use std::f32::consts::PI;

    fn layer() -> SamplingLayerConfig {
        SamplingLayerConfig {
            name: "EMB2".to_string(),
            sampling: SamplingId(2),
            collection_key: RecordKey::CollectionEm2,
            eta_bins: vec![-0.5, 0.0, 0.5],
            phi_bins: vec![-PI, 0.0, PI],
            z_min: -3000.0,
            z_max: 3000.0,
            r_min: 1500.0,
            r_max: 1800.0,
            samples: 5,
            start_sampling_bc: 2,
            shaper: ShaperTable::new(25.0, vec![0.0, 0.5, 1.0, 0.5, 0.0]),
            noise: 10.0,
            ofc_a: vec![0.0, 0.0, 1.0, 0.0, 0.0],
            ofc_b: vec![0.0; 5],
            bunch_id_start: -21,
            bunch_id_end: 4,
            bunch_duration: 25.0,
        }
    }

    fn hit(x: f32, y: f32, z: f32, edep: f32, bcid: i32) -> CaloHit {
        CaloHit::new(Position::new(x, y, z), 6.0, edep, bcid)
    }

    #[test]
    fn test_cells_in_bin_order() {
        let maker = CaloCellMaker::new(layer(), &PulseGeneratorConfig::default()).unwrap();
        let hits = vec![
            hit(1600.0, 10.0, 300.0, 50.0, 0),   // eta > 0, phi > 0
            hit(1600.0, -10.0, -300.0, 20.0, 0), // eta < 0, phi < 0
            hit(1600.0, 10.0, -300.0, 30.0, 0),  // eta < 0, phi > 0
        ];
        let mut state = CellMakerState::default();
        let collection = maker.process(&hits, 0, &mut state).unwrap();
        let bins: Vec<(u16, u16)> = collection
            .iter()
            .map(|c| (c.id.eta_bin, c.id.phi_bin))
            .collect();
        assert_eq!(bins, vec![(0, 0), (0, 1), (1, 1)]);
        assert_abs_diff_eq!(collection.cells[2].energy, 50.0, epsilon = 1e-4);
        assert_eq!(state.cells_created, 3);
        assert_eq!(state.hits_accumulated, 3);
    }

    #[test]
    fn test_hits_outside_layer_ignored() {
        let maker = CaloCellMaker::new(layer(), &PulseGeneratorConfig::default()).unwrap();
        let hits = vec![hit(1000.0, 0.0, 0.0, 50.0, 0), hit(1600.0, 0.0, 5000.0, 5.0, 0)];
        let mut state = CellMakerState::default();
        let collection = maker.process(&hits, 0, &mut state).unwrap();
        assert!(collection.is_empty());
        assert_eq!(state.hits_processed, 2);
        assert_eq!(state.hits_out_of_window, 0);
    }

    #[test]
    fn test_out_of_window_dropped_and_counted() {
        let maker = CaloCellMaker::new(layer(), &PulseGeneratorConfig::default()).unwrap();
        let hits = vec![hit(1600.0, 10.0, 0.0, 50.0, 10), hit(1600.0, 10.0, 0.0, 5.0, -22)];
        let mut state = CellMakerState::default();
        let collection = maker.process(&hits, 0, &mut state).unwrap();
        assert!(collection.is_empty());
        assert_eq!(state.hits_out_of_window, 2);
        assert_eq!(state.cells_created, 0);
    }

    #[test]
    fn test_pileup_truth_bookkeeping() {
        let maker = CaloCellMaker::new(layer(), &PulseGeneratorConfig::default()).unwrap();
        let hits = vec![hit(1600.0, 10.0, 300.0, 50.0, 0), hit(1600.0, 10.0, 300.0, 8.0, -1)];
        let mut state = CellMakerState::default();
        let collection = maker.process(&hits, 0, &mut state).unwrap();
        assert_eq!(collection.len(), 1);
        let cell = &collection.cells[0];
        assert_abs_diff_eq!(cell.truth.edep(), 50.0);
        assert_abs_diff_eq!(cell.truth.edep_at(-1), 8.0);
        // one sample after the peak of the earlier crossing
        assert_abs_diff_eq!(cell.pulse[2], 50.0 + 4.0, epsilon = 1e-4);
        assert!(cell.truth.tof() < 6.0);
    }

    #[test]
    fn test_custom_estimator() {
        let cof = ConstrainedOptimalFilter::new(vec![vec![0.0, 0.0, 2.0, 0.0, 0.0]], 0).unwrap();
        let maker = CaloCellMaker::new(layer(), &PulseGeneratorConfig::default())
            .unwrap()
            .with_estimator(Box::new(cof));
        let mut state = CellMakerState::default();
        let collection = maker
            .process(&[hit(1600.0, 10.0, 300.0, 50.0, 0)], 0, &mut state)
            .unwrap();
        assert_abs_diff_eq!(collection.cells[0].energy, 100.0, epsilon = 1e-4);
    }

    #[test]
    fn test_invalid_layer_rejected() {
        let mut bad = layer();
        bad.eta_bins = vec![0.5];
        let err = CaloCellMaker::new(bad, &PulseGeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidLayer { .. }));
    }

    #[test]
    fn test_state_reset_and_absorb() {
        let mut a = CellMakerState {
            hits_processed: 3,
            cells_created: 1,
            ..CellMakerState::default()
        };
        let b = a.clone();
        a.absorb(&b);
        assert_eq!(a.hits_processed, 6);
        a.reset();
        assert_eq!(a, CellMakerState::default());
    }
}
