//! Sampling layer geometry and readout configuration.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::cell::{CellGeometry, CellId};
use crate::error::{Error, Result};
use crate::hit::fix_phi;
use crate::key::RecordKey;
use std::collections::HashSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a calorimeter sampling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplingId(pub u16);

impl fmt::Display for SamplingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tabulated shaper response with a uniform time step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaperTable {
    /// Spacing between consecutive entries (ns).
    pub step_ns: f32,
    /// Response amplitudes.
    pub values: Vec<f32>,
}

impl ShaperTable {
    /// Creates a new shaper table.
    #[must_use]
    pub fn new(step_ns: f32, values: Vec<f32>) -> Self {
        Self { step_ns, values }
    }
}

/// Static per-layer geometry and readout parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplingLayerConfig {
    /// Human readable layer name (used for monitoring paths).
    pub name: String,
    /// Sampling identifier.
    pub sampling: SamplingId,
    /// Output collection for this layer.
    pub collection_key: RecordKey,
    /// Pseudorapidity bin edges (ascending).
    pub eta_bins: Vec<f32>,
    /// Azimuth bin edges (ascending, within [-pi, pi]).
    pub phi_bins: Vec<f32>,
    /// Volume bounds along the beam axis (mm).
    pub z_min: f32,
    pub z_max: f32,
    /// Radial volume bounds (mm).
    pub r_min: f32,
    pub r_max: f32,
    /// Number of samples per readout.
    pub samples: usize,
    /// Sample index of the triggered bunch crossing.
    pub start_sampling_bc: i32,
    /// Shaper response.
    pub shaper: ShaperTable,
    /// Electronic noise (MeV, one standard deviation).
    pub noise: f32,
    /// Optimal filter energy weights.
    pub ofc_a: Vec<f32>,
    /// Optimal filter time weights.
    pub ofc_b: Vec<f32>,
    /// First bunch crossing in the pileup window.
    pub bunch_id_start: i32,
    /// Last bunch crossing in the pileup window.
    pub bunch_id_end: i32,
    /// Time between two bunch crossings (ns).
    pub bunch_duration: f32,
}

impl SamplingLayerConfig {
    /// Checks internal consistency of the layer description.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLayer`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(Error::InvalidLayer {
                layer: self.name.clone(),
                reason,
            })
        };

        if !self.collection_key.is_layer_collection() {
            return fail(format!(
                "{} is not a layer collection key",
                self.collection_key
            ));
        }
        if let Err(reason) = check_edges("eta", &self.eta_bins) {
            return fail(reason);
        }
        if let Err(reason) = check_edges("phi", &self.phi_bins) {
            return fail(reason);
        }
        if self.eta_bins.len() - 1 > usize::from(u16::MAX)
            || self.phi_bins.len() - 1 > usize::from(u16::MAX)
        {
            return fail("too many bins".to_string());
        }
        if !(self.z_min < self.z_max) {
            return fail(format!("z bounds [{}, {}]", self.z_min, self.z_max));
        }
        if !(self.r_min >= 0.0 && self.r_min < self.r_max) {
            return fail(format!("r bounds [{}, {}]", self.r_min, self.r_max));
        }
        if self.samples == 0 {
            return fail("no samples per readout".to_string());
        }
        if self.ofc_a.len() != self.samples {
            return fail(format!(
                "OFCa has {} weights for {} samples",
                self.ofc_a.len(),
                self.samples
            ));
        }
        if self.ofc_b.len() != self.samples {
            return fail(format!(
                "OFCb has {} weights for {} samples",
                self.ofc_b.len(),
                self.samples
            ));
        }
        if self.bunch_id_start > self.bunch_id_end {
            return fail(format!(
                "bunch window [{}, {}]",
                self.bunch_id_start, self.bunch_id_end
            ));
        }
        if !(self.bunch_duration > 0.0) {
            return fail(format!("bunch duration {}", self.bunch_duration));
        }
        if !(self.noise >= 0.0) {
            return fail(format!("noise {}", self.noise));
        }
        if !(self.shaper.step_ns > 0.0) || self.shaper.values.is_empty() {
            return fail("empty shaper response".to_string());
        }
        Ok(())
    }

    /// Number of pseudorapidity bins.
    #[must_use]
    pub fn n_eta(&self) -> usize {
        self.eta_bins.len().saturating_sub(1)
    }

    /// Number of azimuth bins.
    #[must_use]
    pub fn n_phi(&self) -> usize {
        self.phi_bins.len().saturating_sub(1)
    }

    /// Number of bunch crossings in the pileup window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        (self.bunch_id_end - self.bunch_id_start + 1).max(0) as usize
    }

    /// Returns true if `bcid` lies in the pileup window.
    #[inline]
    #[must_use]
    pub fn in_window(&self, bcid: i32) -> bool {
        (self.bunch_id_start..=self.bunch_id_end).contains(&bcid)
    }

    /// Returns true if the point lies inside the layer volume.
    #[inline]
    #[must_use]
    pub fn contains(&self, r: f32, z: f32) -> bool {
        r >= self.r_min && r < self.r_max && z >= self.z_min && z < self.z_max
    }

    /// Returns true if the azimuth bins cover the full circle.
    #[must_use]
    pub fn phi_wraps(&self) -> bool {
        match (self.phi_bins.first(), self.phi_bins.last()) {
            (Some(first), Some(last)) => (last - first - std::f32::consts::TAU).abs() < 1e-3,
            _ => false,
        }
    }

    /// Maps a pseudorapidity/azimuth pair onto a cell of this layer.
    #[must_use]
    pub fn cell_of(&self, eta: f32, phi: f32) -> Option<CellId> {
        let eta_bin = find_bin(&self.eta_bins, eta)?;
        let phi = fix_phi(phi);
        let phi_bin = match find_bin(&self.phi_bins, phi) {
            Some(bin) => bin,
            // pi and -pi are the same azimuth on a closed circle
            None if self.phi_wraps() => {
                if phi >= self.phi_bins[self.phi_bins.len() - 1] {
                    0
                } else {
                    (self.n_phi() - 1) as u16
                }
            }
            None => return None,
        };
        Some(CellId::new(self.sampling, eta_bin, phi_bin))
    }

    /// Geometry of a cell of this layer.
    #[must_use]
    pub fn geometry(&self, id: CellId) -> CellGeometry {
        let ie = usize::from(id.eta_bin);
        let ip = usize::from(id.phi_bin);
        let (eta_lo, eta_hi) = (self.eta_bins[ie], self.eta_bins[ie + 1]);
        let (phi_lo, phi_hi) = (self.phi_bins[ip], self.phi_bins[ip + 1]);
        CellGeometry {
            eta: 0.5 * (eta_lo + eta_hi),
            phi: 0.5 * (phi_lo + phi_hi),
            delta_eta: eta_hi - eta_lo,
            delta_phi: phi_hi - phi_lo,
            r_min: self.r_min,
            r_max: self.r_max,
        }
    }
}

fn check_edges(axis: &str, edges: &[f32]) -> std::result::Result<(), String> {
    if edges.len() < 2 {
        return Err(format!("{axis} bins need at least two edges"));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(format!("{axis} bins contain non-finite edges"));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(format!("{axis} bin edges must be strictly increasing"));
    }
    Ok(())
}

fn find_bin(edges: &[f32], value: f32) -> Option<u16> {
    let n = edges.len();
    if n < 2 || !(value >= edges[0] && value < edges[n - 1]) {
        return None;
    }
    let idx = edges.partition_point(|&edge| edge <= value);
    Some((idx - 1) as u16)
}

/// All sampling layers of the detector.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorDescription {
    pub samplings: Vec<SamplingLayerConfig>,
}

impl DetectorDescription {
    /// Creates a detector description from its layers.
    #[must_use]
    pub fn new(samplings: Vec<SamplingLayerConfig>) -> Self {
        Self { samplings }
    }

    /// Validates every layer and the uniqueness of identifiers.
    ///
    /// # Errors
    /// Returns the first configuration error found.
    pub fn validate(&self) -> Result<()> {
        if self.samplings.is_empty() {
            return Err(Error::Config("detector has no sampling layers".into()));
        }
        let mut keys = HashSet::new();
        let mut ids = HashSet::new();
        for layer in &self.samplings {
            layer.validate()?;
            if !keys.insert(layer.collection_key) {
                return Err(Error::DuplicateCollectionKey(layer.collection_key));
            }
            if !ids.insert(layer.sampling) {
                return Err(Error::Config(format!(
                    "sampling {} is declared more than once",
                    layer.sampling
                )));
            }
        }
        Ok(())
    }

    /// Looks up a layer by sampling id.
    #[must_use]
    pub fn layer(&self, sampling: SamplingId) -> Option<&SamplingLayerConfig> {
        self.samplings.iter().find(|l| l.sampling == sampling)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::f32::consts::PI;

    /// Single-layer description used across core tests.
    pub(crate) fn layer(n_eta: usize, n_phi: usize) -> SamplingLayerConfig {
        let eta_bins = (0..=n_eta).map(|i| -0.5 + i as f32 / n_eta as f32).collect();
        let phi_bins = (0..=n_phi)
            .map(|i| -PI + 2.0 * PI * i as f32 / n_phi as f32)
            .collect();
        SamplingLayerConfig {
            name: "EMB2".to_string(),
            sampling: SamplingId(2),
            collection_key: RecordKey::CollectionEm2,
            eta_bins,
            phi_bins,
            z_min: -3000.0,
            z_max: 3000.0,
            r_min: 1500.0,
            r_max: 1800.0,
            samples: 5,
            start_sampling_bc: 2,
            shaper: ShaperTable::new(1.0, vec![0.0, 0.5, 1.0, 0.5, 0.0]),
            noise: 10.0,
            ofc_a: vec![0.0, 0.0, 1.0, 0.0, 0.0],
            ofc_b: vec![0.0; 5],
            bunch_id_start: -21,
            bunch_id_end: 4,
            bunch_duration: 25.0,
        }
    }

    #[test]
    fn test_valid_layer() {
        let l = layer(4, 8);
        assert!(l.validate().is_ok());
        assert_eq!(l.n_eta(), 4);
        assert_eq!(l.n_phi(), 8);
        assert_eq!(l.window_len(), 26);
        assert!(l.phi_wraps());
    }

    #[test]
    fn test_cell_of_bins() {
        let l = layer(4, 8);
        let id = l.cell_of(-0.49, -PI + 0.01).unwrap();
        assert_eq!((id.eta_bin, id.phi_bin), (0, 0));
        let id = l.cell_of(0.1, 0.1).unwrap();
        assert_eq!((id.eta_bin, id.phi_bin), (2, 4));
        assert!(l.cell_of(0.5, 0.0).is_none());
        assert!(l.cell_of(-0.7, 0.0).is_none());
        let id = l.cell_of(0.0, PI - 1e-4).unwrap();
        assert_eq!(id.phi_bin, 7);
    }

    #[test]
    fn test_cell_of_phi_pi_wraps_to_first_bin() {
        let l = layer(4, 8);
        let p = crate::hit::Position::new(-1600.0, 0.0, 0.0);
        assert!((p.phi() - PI).abs() < f32::EPSILON);
        let id = l.cell_of(p.eta(), p.phi()).unwrap();
        assert_eq!((id.eta_bin, id.phi_bin), (2, 0));
        assert_eq!(l.cell_of(0.0, -PI), Some(id));
    }

    #[test]
    fn test_cell_of_phi_pi_outside_partial_layer() {
        let mut l = layer(4, 8);
        l.phi_bins.truncate(5);
        assert!(!l.phi_wraps());
        assert!(l.cell_of(0.0, PI).is_none());
    }

    #[test]
    fn test_geometry() {
        let l = layer(4, 8);
        let g = l.geometry(CellId::new(SamplingId(2), 1, 0));
        assert!((g.eta - (-0.125)).abs() < 1e-6);
        assert!((g.delta_eta - 0.25).abs() < 1e-6);
        assert!((g.delta_phi - PI / 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_inconsistent_ofc_rejected() {
        let mut l = layer(1, 1);
        l.ofc_a.pop();
        let err = l.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("OFCa"));
    }

    #[test]
    fn test_non_monotonic_bins_rejected() {
        let mut l = layer(2, 1);
        l.eta_bins = vec![0.0, 0.2, 0.1];
        assert!(l.validate().is_err());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut l = layer(1, 1);
        l.bunch_id_start = 5;
        assert!(l.validate().is_err());
    }

    #[test]
    fn test_detector_duplicate_keys() {
        let a = layer(1, 1);
        let mut b = layer(1, 1);
        b.sampling = SamplingId(3);
        let detector = DetectorDescription::new(vec![a, b]);
        assert!(matches!(
            detector.validate(),
            Err(Error::DuplicateCollectionKey(RecordKey::CollectionEm2))
        ));
    }
}
