//! Calorimeter cells through their per-event lifecycle.
//!
//! A cell starts as an [`AccumulatingCell`] that receives hit contributions,
//! is frozen into a [`FrozenCell`] once the last hit of the event has been
//! applied, and becomes a [`CaloCell`] after energy/time estimation. The
//! waveform can only be written while accumulating.

use std::fmt;

use crate::sampling::SamplingId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cell identifier: sampling layer plus eta/phi bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellId {
    pub sampling: SamplingId,
    pub eta_bin: u16,
    pub phi_bin: u16,
}

impl CellId {
    /// Creates a new cell id.
    #[inline]
    #[must_use]
    pub fn new(sampling: SamplingId, eta_bin: u16, phi_bin: u16) -> Self {
        Self {
            sampling,
            eta_bin,
            phi_bin,
        }
    }

    /// Packed unique hash of the cell.
    #[inline]
    #[must_use]
    pub fn hash(&self) -> u64 {
        (u64::from(self.sampling.0) << 32) | (u64::from(self.eta_bin) << 16) | u64::from(self.phi_bin)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(sampling {}, eta {}, phi {})",
            self.sampling, self.eta_bin, self.phi_bin
        )
    }
}

/// Position and size of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellGeometry {
    pub eta: f32,
    pub phi: f32,
    pub delta_eta: f32,
    pub delta_phi: f32,
    pub r_min: f32,
    pub r_max: f32,
}

/// Truth deposits of a cell for every bunch crossing of its window.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellTruth {
    /// First bunch crossing of the window.
    pub bcid_start: i32,
    /// Deposited energy per crossing (MeV).
    pub edep: Vec<f32>,
    /// Time of flight of the earliest deposit per crossing (ns), 0 if none.
    pub tof: Vec<f32>,
}

impl CellTruth {
    fn index(&self, bcid: i32) -> Option<usize> {
        usize::try_from(bcid - self.bcid_start)
            .ok()
            .filter(|&i| i < self.edep.len())
    }

    /// Deposited energy in a bunch crossing.
    #[must_use]
    pub fn edep_at(&self, bcid: i32) -> f32 {
        self.index(bcid).map_or(0.0, |i| self.edep[i])
    }

    /// Time of flight in a bunch crossing.
    #[must_use]
    pub fn tof_at(&self, bcid: i32) -> f32 {
        self.index(bcid).map_or(0.0, |i| self.tof[i])
    }

    /// Deposited energy in the triggered crossing.
    #[must_use]
    pub fn edep(&self) -> f32 {
        self.edep_at(0)
    }

    /// Time of flight in the triggered crossing.
    #[must_use]
    pub fn tof(&self) -> f32 {
        self.tof_at(0)
    }

    /// Total deposited energy over the window.
    #[must_use]
    pub fn total_edep(&self) -> f32 {
        self.edep.iter().sum()
    }
}

/// A cell receiving hit contributions for the current event.
#[derive(Debug, Clone)]
pub struct AccumulatingCell {
    id: CellId,
    geometry: CellGeometry,
    noise: f32,
    waveform: Vec<f32>,
    bcid_start: i32,
    edep: Vec<f32>,
    tof: Vec<Option<f32>>,
    hits: usize,
}

impl AccumulatingCell {
    /// Creates an empty cell with a zeroed waveform.
    #[must_use]
    pub fn new(
        id: CellId,
        geometry: CellGeometry,
        noise: f32,
        n_samples: usize,
        bcid_start: i32,
        window_len: usize,
    ) -> Self {
        Self {
            id,
            geometry,
            noise,
            waveform: vec![0.0; n_samples],
            bcid_start,
            edep: vec![0.0; window_len],
            tof: vec![None; window_len],
            hits: 0,
        }
    }

    /// Cell identifier.
    #[must_use]
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Current waveform.
    #[must_use]
    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    /// Mutable waveform buffer for superposing pulses.
    pub fn waveform_mut(&mut self) -> &mut [f32] {
        &mut self.waveform
    }

    /// Number of deposits recorded.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Records the truth part of a deposit.
    ///
    /// Deposits outside the window are ignored. The time of flight keeps the
    /// earliest deposit of each crossing.
    pub fn deposit(&mut self, bcid: i32, edep: f32, time_ns: f32) {
        let Some(i) = usize::try_from(bcid - self.bcid_start)
            .ok()
            .filter(|&i| i < self.edep.len())
        else {
            return;
        };
        self.edep[i] += edep;
        self.tof[i] = Some(self.tof[i].map_or(time_ns, |t| t.min(time_ns)));
        self.hits += 1;
    }

    /// Ends accumulation. No further contributions can be added.
    #[must_use]
    pub fn freeze(self) -> FrozenCell {
        FrozenCell {
            id: self.id,
            geometry: self.geometry,
            noise: self.noise,
            pulse: self.waveform,
            truth: CellTruth {
                bcid_start: self.bcid_start,
                edep: self.edep,
                tof: self.tof.into_iter().map(|t| t.unwrap_or(0.0)).collect(),
            },
        }
    }
}

/// A cell whose waveform is final, awaiting calibration and estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenCell {
    pub id: CellId,
    pub geometry: CellGeometry,
    pub noise: f32,
    pub pulse: Vec<f32>,
    pub truth: CellTruth,
}

impl FrozenCell {
    /// Attaches the energy/time estimate.
    #[must_use]
    pub fn into_cell(self, energy: f32, time: f32) -> CaloCell {
        CaloCell {
            id: self.id,
            geometry: self.geometry,
            noise: self.noise,
            pulse: self.pulse,
            truth: self.truth,
            energy,
            time,
        }
    }
}

/// Reconstructed cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaloCell {
    pub id: CellId,
    pub geometry: CellGeometry,
    /// Electronic noise of the cell (MeV).
    pub noise: f32,
    /// Sampled waveform.
    pub pulse: Vec<f32>,
    pub truth: CellTruth,
    /// Estimated energy (MeV).
    pub energy: f32,
    /// Estimated time (ns).
    pub time: f32,
}

impl CaloCell {
    /// Transverse energy.
    #[must_use]
    pub fn et(&self) -> f32 {
        self.energy / self.geometry.eta.cosh()
    }

    /// Noise-free view of this cell.
    #[must_use]
    pub fn truth_cell(&self) -> TruthCell {
        TruthCell {
            id: self.id,
            geometry: self.geometry,
            energy: self.truth.edep(),
            time: self.truth.tof(),
        }
    }
}

/// Noise-free cell built from the truth deposits of the triggered crossing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthCell {
    pub id: CellId,
    pub geometry: CellGeometry,
    pub energy: f32,
    pub time: f32,
}

/// Common read access for persisted cell records.
pub trait CellRecord {
    /// Cell identifier.
    fn id(&self) -> CellId;

    /// Cell geometry.
    fn geometry(&self) -> CellGeometry;

    /// Energy (MeV).
    fn energy(&self) -> f32;

    /// Time (ns).
    fn time(&self) -> f32;
}

impl CellRecord for CaloCell {
    #[inline]
    fn id(&self) -> CellId {
        self.id
    }

    #[inline]
    fn geometry(&self) -> CellGeometry {
        self.geometry
    }

    #[inline]
    fn energy(&self) -> f32 {
        self.energy
    }

    #[inline]
    fn time(&self) -> f32 {
        self.time
    }
}

impl CellRecord for TruthCell {
    #[inline]
    fn id(&self) -> CellId {
        self.id
    }

    #[inline]
    fn geometry(&self) -> CellGeometry {
        self.geometry
    }

    #[inline]
    fn energy(&self) -> f32 {
        self.energy
    }

    #[inline]
    fn time(&self) -> f32 {
        self.time
    }
}
