//! Energy and time estimators for sampled pulses.

use calocell_core::error::{Error, Result};
use calocell_core::sampling::SamplingLayerConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Energy below which no time is estimated, whatever the noise (MeV).
pub const TIME_ENERGY_EPSILON: f32 = 1e-6;

/// Result of a cell estimation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Estimate {
    /// Energy (MeV).
    pub energy: f32,
    /// Time (ns).
    pub time: f32,
}

/// Stateless estimator applied to a frozen waveform.
pub trait CellEstimator: Send + Sync {
    /// Returns the name of the estimator.
    fn name(&self) -> &'static str;

    /// Estimates energy and time from `pulse`.
    ///
    /// # Errors
    /// Fails if the pulse length does not match the estimator weights.
    fn estimate(&self, pulse: &[f32], noise: f32) -> Result<Estimate>;
}

fn weighted_sum(weights: &[f32], pulse: &[f32]) -> Result<f32> {
    if weights.len() != pulse.len() {
        return Err(Error::WeightMismatch {
            weights: weights.len(),
            samples: pulse.len(),
        });
    }
    Ok(weights.iter().zip(pulse).map(|(w, s)| w * s).sum())
}

/// Optimal filter configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OptimalFilterConfig {
    /// Time is only estimated when the energy exceeds this many noise sigmas.
    pub time_noise_factor: f32,
}

impl Default for OptimalFilterConfig {
    fn default() -> Self {
        Self {
            time_noise_factor: 2.0,
        }
    }
}

/// Linear optimal filter with fixed energy (OFCa) and time (OFCb) weights.
///
/// ```text
/// E   = sum(a[i] * s[i])
/// tau = sum(b[i] * s[i]) / E     if E > factor * noise and E > epsilon
///     = 0                        otherwise
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct OptimalFilter {
    ofc_a: Vec<f32>,
    ofc_b: Vec<f32>,
    config: OptimalFilterConfig,
}

impl OptimalFilter {
    /// Creates a filter from its weight vectors.
    ///
    /// # Errors
    /// Returns [`Error::WeightMismatch`] if the vectors differ in length and a
    /// configuration error if they are empty.
    pub fn new(ofc_a: Vec<f32>, ofc_b: Vec<f32>) -> Result<Self> {
        if ofc_a.is_empty() {
            return Err(Error::Config("optimal filter weights are empty".into()));
        }
        if ofc_a.len() != ofc_b.len() {
            return Err(Error::WeightMismatch {
                weights: ofc_b.len(),
                samples: ofc_a.len(),
            });
        }
        Ok(Self {
            ofc_a,
            ofc_b,
            config: OptimalFilterConfig::default(),
        })
    }

    /// Creates a filter with the weights of a sampling layer.
    ///
    /// # Errors
    /// See [`OptimalFilter::new`].
    pub fn from_layer(layer: &SamplingLayerConfig) -> Result<Self> {
        Self::new(layer.ofc_a.clone(), layer.ofc_b.clone())
    }

    #[must_use]
    pub fn with_config(mut self, config: OptimalFilterConfig) -> Self {
        self.config = config;
        self
    }

    /// Energy weights.
    #[must_use]
    pub fn energy_weights(&self) -> &[f32] {
        &self.ofc_a
    }

    /// Time weights.
    #[must_use]
    pub fn time_weights(&self) -> &[f32] {
        &self.ofc_b
    }
}

impl CellEstimator for OptimalFilter {
    fn name(&self) -> &'static str {
        "OptimalFilter"
    }

    fn estimate(&self, pulse: &[f32], noise: f32) -> Result<Estimate> {
        let energy = weighted_sum(&self.ofc_a, pulse)?;
        let energy_tau = weighted_sum(&self.ofc_b, pulse)?;
        let time = if energy > self.config.time_noise_factor * noise && energy > TIME_ENERGY_EPSILON
        {
            energy_tau / energy
        } else {
            0.0
        };
        Ok(Estimate { energy, time })
    }
}

/// Deconvolving estimator resolving the amplitude of every bunch crossing.
///
/// Each weight row projects the waveform onto the amplitude of one crossing;
/// the energy is the amplitude of the triggered crossing. No time is estimated.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstrainedOptimalFilter {
    weights: Vec<Vec<f32>>,
    trigger_row: usize,
}

impl ConstrainedOptimalFilter {
    /// Creates the filter from its weight matrix.
    ///
    /// # Errors
    /// Returns a configuration error if the matrix is empty, ragged, or
    /// `trigger_row` is out of range.
    pub fn new(weights: Vec<Vec<f32>>, trigger_row: usize) -> Result<Self> {
        let Some(first) = weights.first() else {
            return Err(Error::Config("constrained filter has no weights".into()));
        };
        let n = first.len();
        if n == 0 || weights.iter().any(|row| row.len() != n) {
            return Err(Error::Config(
                "constrained filter weight rows must share a non-zero length".into(),
            ));
        }
        if trigger_row >= weights.len() {
            return Err(Error::Config(format!(
                "trigger row {trigger_row} outside {} weight rows",
                weights.len()
            )));
        }
        Ok(Self {
            weights,
            trigger_row,
        })
    }

    /// Amplitude of every crossing.
    ///
    /// # Errors
    /// Returns [`Error::WeightMismatch`] on a pulse length mismatch.
    pub fn amplitudes(&self, pulse: &[f32]) -> Result<Vec<f32>> {
        self.weights
            .iter()
            .map(|row| weighted_sum(row, pulse))
            .collect()
    }
}

impl CellEstimator for ConstrainedOptimalFilter {
    fn name(&self) -> &'static str {
        "ConstrainedOptimalFilter"
    }

    fn estimate(&self, pulse: &[f32], _noise: f32) -> Result<Estimate> {
        let energy = weighted_sum(&self.weights[self.trigger_row], pulse)?;
        Ok(Estimate { energy, time: 0.0 })
    }
}
