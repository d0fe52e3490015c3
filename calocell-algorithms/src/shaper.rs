//! Shaper response models.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use calocell_core::error::{Error, Result};
use calocell_core::sampling::ShaperTable;

/// Amplitude response of the readout shaper.
///
/// Implementations are normalized to a unit peak at `t = 0`.
pub trait PulseShape: Send + Sync {
    /// Returns the response at `t_ns` relative to the peak.
    fn amplitude(&self, t_ns: f32) -> f32;
}

/// Shaper response interpolated linearly from a table.
#[derive(Debug, Clone)]
pub struct TabulatedShaper {
    step_ns: f32,
    values: Vec<f32>,
    peak_index: usize,
}

impl TabulatedShaper {
    /// Builds a normalized shaper from a tabulated response.
    ///
    /// # Errors
    /// Returns a configuration error if the table is empty, has a
    /// non-positive step or no positive peak.
    pub fn new(table: &ShaperTable) -> Result<Self> {
        if !(table.step_ns > 0.0) {
            return Err(Error::Config(format!(
                "shaper step must be positive, got {}",
                table.step_ns
            )));
        }
        let (peak_index, peak) = table
            .values
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        if !(peak > 0.0) || !peak.is_finite() {
            return Err(Error::Config("shaper response has no positive peak".into()));
        }
        Ok(Self {
            step_ns: table.step_ns,
            values: table.values.iter().map(|v| v / peak).collect(),
            peak_index,
        })
    }

    /// Time of the peak from the start of the table (ns).
    #[must_use]
    pub fn peak_time(&self) -> f32 {
        self.peak_index as f32 * self.step_ns
    }
}

impl PulseShape for TabulatedShaper {
    fn amplitude(&self, t_ns: f32) -> f32 {
        let x = (t_ns + self.peak_time()) / self.step_ns;
        if !x.is_finite() || x < 0.0 {
            return 0.0;
        }
        let lo = x.floor() as usize;
        let frac = x - lo as f32;
        match (self.values.get(lo), self.values.get(lo + 1)) {
            (Some(a), Some(b)) => a + (b - a) * frac,
            (Some(a), None) if frac == 0.0 => *a,
            _ => 0.0,
        }
    }
}
