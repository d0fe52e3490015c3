//! Electronic cross-talk between neighboring readout channels.
//!
//! A cell whose truth energy passes the noise-significance cut leaks part of
//! its waveform into each readout neighbor:
//!
//! - inductive: `L/100 * s[i]`
//! - capacitive: `C/100 * (s[i] - s[i-1])`, zero at the first sample
//! - resistive: `R/100 * (s[i-1] + s[i] + s[i+1]) / 3`, edge-clamped
//!
//! Diagonal neighbors only receive the inductive part. Leaked signal is
//! subtracted from the source. All leaks are computed from the merged cells
//! as they were before the pass, the perturbed cells are re-estimated and
//! written as a new container; the input container is never modified.
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use crate::filter::{CellEstimator, OptimalFilter};
use calocell_core::cell::{CaloCell, CellId};
use calocell_core::collection::CellContainer;
use calocell_core::error::{Error, Result};
use calocell_core::key::RecordKey;
use calocell_core::sampling::{DetectorDescription, SamplingId};
use calocell_core::store::{EventStore, Record};
use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coupling coefficients, in percent of the source amplitude.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrossTalkCoupling {
    pub capacitive: f32,
    pub inductive: f32,
    pub resistive: f32,
}

impl Default for CrossTalkCoupling {
    fn default() -> Self {
        Self {
            capacitive: 4.2,
            inductive: 2.3,
            resistive: 1.0,
        }
    }
}

/// Position of a neighbor relative to the source cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NeighborKind {
    /// Shares an eta or phi row with the source.
    Direct,
    /// Corner neighbor.
    Diagonal,
}

impl CrossTalkCoupling {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("capacitive", self.capacitive),
            ("inductive", self.inductive),
            ("resistive", self.resistive),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} cross-talk amplitude must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Inductive contribution.
    #[must_use]
    pub fn inductive_leak(&self, source: &[f32]) -> Vec<f32> {
        let k = self.inductive / 100.0;
        source.iter().map(|s| k * s).collect()
    }

    /// Capacitive contribution.
    #[must_use]
    pub fn capacitive_leak(&self, source: &[f32]) -> Vec<f32> {
        let k = self.capacitive / 100.0;
        (0..source.len())
            .map(|i| if i == 0 { 0.0 } else { k * (source[i] - source[i - 1]) })
            .collect()
    }

    /// Resistive contribution.
    #[must_use]
    pub fn resistive_leak(&self, source: &[f32]) -> Vec<f32> {
        let k = self.resistive / 100.0;
        let n = source.len();
        (0..n)
            .map(|i| {
                let lo = source[i.saturating_sub(1)];
                let hi = source[(i + 1).min(n - 1)];
                k * (lo + source[i] + hi) / 3.0
            })
            .collect()
    }

    /// Total signal leaked into a neighbor of the given kind.
    #[must_use]
    pub fn leak(&self, source: &[f32], kind: NeighborKind) -> Vec<f32> {
        let mut out = self.inductive_leak(source);
        if kind == NeighborKind::Direct {
            let cap = self.capacitive_leak(source);
            let res = self.resistive_leak(source);
            for ((o, c), r) in out.iter_mut().zip(cap).zip(res) {
                *o += c + r;
            }
        }
        out
    }
}

/// Readout adjacency lookup.
pub trait ReadoutNeighbors: Send + Sync {
    /// Neighbors of `id` with their coupling kind.
    fn neighbors(&self, id: CellId) -> Vec<(CellId, NeighborKind)>;
}

#[derive(Clone, Copy, Debug)]
struct GridShape {
    n_eta: u16,
    n_phi: u16,
    wraps: bool,
}

/// 3x3 window in (eta, phi) within the same sampling, wrapping in phi when
/// the layer covers the full circle.
#[derive(Clone, Debug, Default)]
pub struct WindowNeighbors {
    grids: HashMap<SamplingId, GridShape>,
}

impl WindowNeighbors {
    /// Builds the window lookup for every layer of the detector.
    #[must_use]
    pub fn new(detector: &DetectorDescription) -> Self {
        let grids = detector
            .samplings
            .iter()
            .map(|l| {
                (
                    l.sampling,
                    GridShape {
                        n_eta: u16::try_from(l.n_eta()).unwrap_or(u16::MAX),
                        n_phi: u16::try_from(l.n_phi()).unwrap_or(u16::MAX),
                        wraps: l.phi_wraps(),
                    },
                )
            })
            .collect();
        Self { grids }
    }
}

impl ReadoutNeighbors for WindowNeighbors {
    fn neighbors(&self, id: CellId) -> Vec<(CellId, NeighborKind)> {
        let Some(grid) = self.grids.get(&id.sampling) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(8);
        for de in -1_i32..=1 {
            let eta = i32::from(id.eta_bin) + de;
            if eta < 0 || eta >= i32::from(grid.n_eta) {
                continue;
            }
            for dp in -1_i32..=1 {
                if de == 0 && dp == 0 {
                    continue;
                }
                let mut phi = i32::from(id.phi_bin) + dp;
                let n_phi = i32::from(grid.n_phi);
                if grid.wraps {
                    phi = phi.rem_euclid(n_phi);
                } else if phi < 0 || phi >= n_phi {
                    continue;
                }
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let nid = CellId::new(id.sampling, eta as u16, phi as u16);
                if nid == id || out.iter().any(|(n, _)| *n == nid) {
                    continue;
                }
                // classify on the wrapped bin so a single-bin ring stays direct
                let kind = if de != 0 && phi != i32::from(id.phi_bin) {
                    NeighborKind::Diagonal
                } else {
                    NeighborKind::Direct
                };
                out.push((nid, kind));
            }
        }
        out
    }
}

/// Explicit readout adjacency.
#[derive(Clone, Debug, Default)]
pub struct ReadoutMap {
    map: HashMap<CellId, Vec<(CellId, NeighborKind)>>,
}

impl ReadoutMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `a` and `b` as coupled channels.
    pub fn connect(&mut self, a: CellId, b: CellId, kind: NeighborKind) {
        if a == b {
            return;
        }
        for (from, to) in [(a, b), (b, a)] {
            let list = self.map.entry(from).or_default();
            if !list.iter().any(|(n, _)| *n == to) {
                list.push((to, kind));
            }
        }
    }

    /// Number of channels with at least one neighbor.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl ReadoutNeighbors for ReadoutMap {
    fn neighbors(&self, id: CellId) -> Vec<(CellId, NeighborKind)> {
        self.map.get(&id).cloned().unwrap_or_default()
    }
}

/// Cross-talk configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrossTalkConfig {
    /// Sources need truth energy of at least this many noise sigmas.
    pub sigma_noise_cut: f32,
    pub coupling: CrossTalkCoupling,
    /// Samplings allowed to act as sources (all when `None`).
    pub samplings: Option<Vec<SamplingId>>,
    pub cells_key: RecordKey,
    pub xt_cells_key: RecordKey,
}

impl Default for CrossTalkConfig {
    fn default() -> Self {
        Self {
            sigma_noise_cut: 2.0,
            coupling: CrossTalkCoupling::default(),
            samplings: None,
            cells_key: RecordKey::Cells,
            xt_cells_key: RecordKey::XTCells,
        }
    }
}

impl CrossTalkConfig {
    #[must_use]
    pub fn with_sigma_noise_cut(mut self, cut: f32) -> Self {
        self.sigma_noise_cut = cut;
        self
    }

    #[must_use]
    pub fn with_coupling(mut self, coupling: CrossTalkCoupling) -> Self {
        self.coupling = coupling;
        self
    }

    #[must_use]
    pub fn with_samplings(mut self, samplings: Vec<SamplingId>) -> Self {
        self.samplings = Some(samplings);
        self
    }
}

/// Cross-talk stage.
pub struct CrossTalk {
    config: CrossTalkConfig,
    neighbors: Box<dyn ReadoutNeighbors>,
    estimators: HashMap<SamplingId, Box<dyn CellEstimator>>,
}

impl std::fmt::Debug for CrossTalk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossTalk")
            .field("config", &self.config)
            .field("estimators", &self.estimators.len())
            .finish_non_exhaustive()
    }
}

impl CrossTalk {
    /// Creates the stage.
    ///
    /// # Errors
    /// Returns a configuration error for invalid amplitudes, a negative cut
    /// or identical input and output keys.
    pub fn new(
        config: CrossTalkConfig,
        neighbors: Box<dyn ReadoutNeighbors>,
        estimators: HashMap<SamplingId, Box<dyn CellEstimator>>,
    ) -> Result<Self> {
        config.coupling.validate()?;
        if !(config.sigma_noise_cut >= 0.0) {
            return Err(Error::Config(format!(
                "sigma noise cut must be non-negative, got {}",
                config.sigma_noise_cut
            )));
        }
        if config.cells_key == config.xt_cells_key {
            return Err(Error::Config(
                "cross-talk output must not overwrite its input".into(),
            ));
        }
        Ok(Self {
            config,
            neighbors,
            estimators,
        })
    }

    /// Creates the stage with window adjacency and the optimal filter of each layer.
    ///
    /// # Errors
    /// See [`CrossTalk::new`].
    pub fn from_detector(config: CrossTalkConfig, detector: &DetectorDescription) -> Result<Self> {
        let mut estimators: HashMap<SamplingId, Box<dyn CellEstimator>> = HashMap::new();
        for layer in &detector.samplings {
            estimators.insert(layer.sampling, Box::new(OptimalFilter::from_layer(layer)?));
        }
        Self::new(config, Box::new(WindowNeighbors::new(detector)), estimators)
    }

    /// Stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        "CrossTalk"
    }

    #[must_use]
    pub fn config(&self) -> &CrossTalkConfig {
        &self.config
    }

    fn is_source(&self, cell: &CaloCell) -> bool {
        if cell.pulse.is_empty() {
            return false;
        }
        if let Some(allowed) = &self.config.samplings {
            if !allowed.contains(&cell.id.sampling) {
                return false;
            }
        }
        cell.truth.edep() >= self.config.sigma_noise_cut * cell.noise
    }

    /// Applies cross-talk to a copy of `cells`.
    ///
    /// Returns the perturbed container and the number of modified cells.
    ///
    /// # Errors
    /// Returns [`Error::MissingFilter`] if a modified cell has no estimator.
    pub fn apply(&self, cells: &CellContainer) -> Result<(CellContainer, usize)> {
        let index: HashMap<CellId, usize> = cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();
        let mut deltas: HashMap<usize, Vec<f32>> = HashMap::new();

        for (i, source) in cells.iter().enumerate() {
            if !self.is_source(source) {
                continue;
            }
            for (nid, kind) in self.neighbors.neighbors(source.id) {
                let Some(&j) = index.get(&nid) else {
                    continue;
                };
                let neighbor = &cells.cells[j];
                if j == i
                    || neighbor.id.sampling != source.id.sampling
                    || neighbor.pulse.len() != source.pulse.len()
                {
                    continue;
                }
                let leak = self.config.coupling.leak(&source.pulse, kind);
                let n = leak.len();
                for (d, l) in deltas.entry(j).or_insert_with(|| vec![0.0; n]).iter_mut().zip(&leak) {
                    *d += l;
                }
                for (d, l) in deltas.entry(i).or_insert_with(|| vec![0.0; n]).iter_mut().zip(&leak) {
                    *d -= l;
                }
            }
        }

        let mut out = cells.clone();
        for (&j, delta) in &deltas {
            let cell = &mut out.cells[j];
            for (s, d) in cell.pulse.iter_mut().zip(delta) {
                *s += d;
            }
            let estimator = self
                .estimators
                .get(&cell.id.sampling)
                .ok_or(Error::MissingFilter(cell.id.sampling.0))?;
            let estimate = estimator.estimate(&cell.pulse, cell.noise)?;
            cell.energy = estimate.energy;
            cell.time = estimate.time;
        }
        Ok((out, deltas.len()))
    }

    /// Reads the merged cells from `store` and records the perturbed copy.
    ///
    /// # Errors
    /// Fails if the input is missing, the output key is taken, or
    /// re-estimation fails.
    pub fn execute(&self, store: &mut EventStore) -> Result<usize> {
        let (xt, changed) = self.apply(store.cells(self.config.cells_key)?)?;
        debug!(
            "cross-talk modified {changed} of {} cell(s) into {}",
            xt.len(),
            self.config.xt_cells_key
        );
        store.record(self.config.xt_cells_key, Record::Cells(xt))?;
        Ok(changed)
    }
}
