//! Pulse generation with bunch-crossing pileup.
//!
//! A deposit in bunch crossing `b` is sampled at shaper times
//! `t_i = (i - start_sampling_bc - b) * sampling_rate` relative to the shaper
//! peak, so an in-time deposit peaks at sample `start_sampling_bc`. Deposits
//! are superposed into the cell waveform; pedestal and electronic noise are
//! applied once per cell when the waveform is finalized.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::shaper::PulseShape;
use calocell_core::error::{Error, Result};
use calocell_core::sampling::SamplingLayerConfig;
use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pulse generator configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseGeneratorConfig {
    /// Samples per readout.
    pub n_samples: usize,
    /// Sample index of the triggered bunch crossing.
    pub start_sampling_bc: i32,
    /// Time between two samples (ns).
    pub sampling_rate: f32,
    /// Constant offset added once per cell.
    pub pedestal: f32,
    /// Mean of the relative shaper deformation.
    pub deformation_mean: f32,
    /// Standard deviation of the relative shaper deformation (0 disables).
    pub deformation_std: f32,
    /// Mean of the additive per-sample noise.
    pub noise_mean: f32,
    /// Standard deviation of the additive per-sample noise (0 disables).
    pub noise_std: f32,
    /// First accepted bunch crossing.
    pub bunch_id_start: i32,
    /// Last accepted bunch crossing.
    pub bunch_id_end: i32,
}

impl Default for PulseGeneratorConfig {
    fn default() -> Self {
        Self {
            n_samples: 5,
            start_sampling_bc: 2,
            sampling_rate: 25.0,
            pedestal: 0.0,
            deformation_mean: 0.0,
            deformation_std: 0.0,
            noise_mean: 0.0,
            noise_std: 0.0,
            bunch_id_start: -21,
            bunch_id_end: 4,
        }
    }
}

impl PulseGeneratorConfig {
    /// Copies the readout layout of a sampling layer, keeping the analog settings.
    #[must_use]
    pub fn for_layer(&self, layer: &SamplingLayerConfig) -> Self {
        Self {
            n_samples: layer.samples,
            start_sampling_bc: layer.start_sampling_bc,
            bunch_id_start: layer.bunch_id_start,
            bunch_id_end: layer.bunch_id_end,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_sampling_rate(mut self, sampling_rate: f32) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    #[must_use]
    pub fn with_pedestal(mut self, pedestal: f32) -> Self {
        self.pedestal = pedestal;
        self
    }

    #[must_use]
    pub fn with_noise(mut self, mean: f32, std: f32) -> Self {
        self.noise_mean = mean;
        self.noise_std = std;
        self
    }

    #[must_use]
    pub fn with_deformation(mut self, mean: f32, std: f32) -> Self {
        self.deformation_mean = mean;
        self.deformation_std = std;
        self
    }

    /// Returns true if `bcid` lies in the accepted window.
    #[inline]
    #[must_use]
    pub fn in_window(&self, bcid: i32) -> bool {
        (self.bunch_id_start..=self.bunch_id_end).contains(&bcid)
    }
}

/// Gaussian source that degenerates to a constant when the width is zero.
#[derive(Debug, Clone)]
struct Gaussian {
    mean: f32,
    normal: Option<Normal>,
}

impl Gaussian {
    fn new(what: &str, mean: f32, std: f32) -> Result<Self> {
        if !mean.is_finite() || !(std >= 0.0) || !std.is_finite() {
            return Err(Error::Config(format!(
                "{what} mean/std must be finite with std >= 0, got {mean}/{std}"
            )));
        }
        let normal = if std > 0.0 {
            Some(
                Normal::new(f64::from(mean), f64::from(std))
                    .map_err(|e| Error::Config(format!("{what}: {e}")))?,
            )
        } else {
            None
        };
        Ok(Self { mean, normal })
    }

    fn is_active(&self) -> bool {
        self.normal.is_some() || self.mean != 0.0
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        match &self.normal {
            Some(normal) => normal.sample(rng) as f32,
            None => self.mean,
        }
    }
}

/// Converts deposits into sampled pulses for one sampling layer.
pub struct PulseGenerator {
    config: PulseGeneratorConfig,
    shape: Box<dyn PulseShape>,
    noise: Gaussian,
    deformation: Gaussian,
}

impl std::fmt::Debug for PulseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PulseGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    /// Returns a configuration error for an empty readout, an inverted window,
    /// a non-positive sampling rate or invalid noise/deformation parameters.
    pub fn new(config: PulseGeneratorConfig, shape: Box<dyn PulseShape>) -> Result<Self> {
        if config.n_samples == 0 {
            return Err(Error::Config("pulse generator needs at least one sample".into()));
        }
        if !(config.sampling_rate > 0.0) {
            return Err(Error::Config(format!(
                "sampling rate must be positive, got {}",
                config.sampling_rate
            )));
        }
        if config.bunch_id_start > config.bunch_id_end {
            return Err(Error::Config(format!(
                "bunch window [{}, {}] is inverted",
                config.bunch_id_start, config.bunch_id_end
            )));
        }
        if !config.pedestal.is_finite() {
            return Err(Error::Config("pedestal must be finite".into()));
        }
        let noise = Gaussian::new("noise", config.noise_mean, config.noise_std)?;
        let deformation = Gaussian::new(
            "deformation",
            config.deformation_mean,
            config.deformation_std,
        )?;
        Ok(Self {
            config,
            shape,
            noise,
            deformation,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PulseGeneratorConfig {
        &self.config
    }

    /// Shaper time of sample `index` for a deposit in crossing `bcid`.
    #[inline]
    #[must_use]
    pub fn sample_time(&self, index: usize, bcid: i32) -> f32 {
        (index as f32 - self.config.start_sampling_bc as f32 - bcid as f32)
            * self.config.sampling_rate
    }

    /// Superposes the pulse of a deposit onto `waveform`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfWindowHit`] if `bcid` is outside the window and
    /// [`Error::SampleCountMismatch`] if the buffer has the wrong length. The
    /// waveform is left untouched on error.
    pub fn accumulate<R: Rng + ?Sized>(
        &self,
        waveform: &mut [f32],
        energy: f32,
        bcid: i32,
        rng: &mut R,
    ) -> Result<()> {
        self.check_len(waveform)?;
        if !self.config.in_window(bcid) {
            return Err(Error::OutOfWindowHit {
                bcid,
                start: self.config.bunch_id_start,
                end: self.config.bunch_id_end,
            });
        }
        let deform = self.deformation.is_active();
        for (i, sample) in waveform.iter_mut().enumerate() {
            let mut amplitude = self.shape.amplitude(self.sample_time(i, bcid));
            if deform {
                amplitude *= 1.0 + self.deformation.sample(rng);
            }
            *sample += energy * amplitude;
        }
        Ok(())
    }

    /// Adds pedestal and electronic noise to a complete waveform.
    ///
    /// # Errors
    /// Returns [`Error::SampleCountMismatch`] if the buffer has the wrong length.
    pub fn finalize<R: Rng + ?Sized>(&self, waveform: &mut [f32], rng: &mut R) -> Result<()> {
        self.check_len(waveform)?;
        let noisy = self.noise.is_active();
        for sample in waveform.iter_mut() {
            *sample += self.config.pedestal;
            if noisy {
                *sample += self.noise.sample(rng);
            }
        }
        Ok(())
    }

    fn check_len(&self, waveform: &[f32]) -> Result<()> {
        if waveform.len() == self.config.n_samples {
            Ok(())
        } else {
            Err(Error::SampleCountMismatch {
                expected: self.config.n_samples,
                found: waveform.len(),
            })
        }
    }
}
