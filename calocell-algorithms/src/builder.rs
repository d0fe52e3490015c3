//! Top-level pipeline assembly.

use crate::crosstalk::{CrossTalk, CrossTalkConfig, CrossTalkCoupling};
use crate::maker::CaloCellMaker;
use crate::merge::CaloCellMerge;
use crate::processing::Pipeline;
use crate::pulse::PulseGeneratorConfig;
use calocell_core::error::{Error, Result};
use calocell_core::key::RecordKey;
use calocell_core::sampling::DetectorDescription;
use log::{info, LevelFilter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Message verbosity, numbered like the framework output levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutputLevel {
    Verbose = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
}

impl OutputLevel {
    /// Parses a numeric level.
    ///
    /// # Errors
    /// Returns a configuration error for values above 5.
    pub fn from_level(level: u8) -> Result<Self> {
        Ok(match level {
            0 => Self::Verbose,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warning,
            4 => Self::Error,
            5 => Self::Fatal,
            other => {
                return Err(Error::Config(format!(
                    "output level must be in 0..=5, got {other}"
                )))
            }
        })
    }

    /// Matching `log` filter.
    #[must_use]
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Verbose => LevelFilter::Trace,
            Self::Debug => LevelFilter::Debug,
            Self::Info => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Error | Self::Fatal => LevelFilter::Error,
        }
    }
}

/// Configuration of the reconstruction chain.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellBuilderConfig {
    /// Monitoring root path.
    pub histogram_path: String,
    /// Input hits record.
    pub hits_key: RecordKey,
    /// Appends the cross-talk stage.
    pub do_crosstalk: bool,
    pub output_level: OutputLevel,
    /// Analog settings shared by all layers.
    pub pulse: PulseGeneratorConfig,
    pub crosstalk: CrossTalkConfig,
    /// Run seed for noise and deformation.
    pub seed: u64,
}

impl Default for CellBuilderConfig {
    fn default() -> Self {
        Self {
            histogram_path: "Expert".to_string(),
            hits_key: RecordKey::Hits,
            do_crosstalk: false,
            output_level: OutputLevel::Info,
            pulse: PulseGeneratorConfig::default(),
            crosstalk: CrossTalkConfig::default(),
            seed: 0,
        }
    }
}

impl CellBuilderConfig {
    #[must_use]
    pub fn with_histogram_path(mut self, path: impl Into<String>) -> Self {
        self.histogram_path = path.into();
        self
    }

    #[must_use]
    pub fn with_hits_key(mut self, key: RecordKey) -> Self {
        self.hits_key = key;
        self
    }

    #[must_use]
    pub fn with_crosstalk(mut self, enabled: bool) -> Self {
        self.do_crosstalk = enabled;
        self
    }

    #[must_use]
    pub fn with_xt_amplitudes(mut self, capacitive: f32, inductive: f32, resistive: f32) -> Self {
        self.crosstalk.coupling = CrossTalkCoupling {
            capacitive,
            inductive,
            resistive,
        };
        self
    }

    #[must_use]
    pub fn with_sigma_noise_cut(mut self, cut: f32) -> Self {
        self.crosstalk.sigma_noise_cut = cut;
        self
    }

    #[must_use]
    pub fn with_output_level(mut self, level: OutputLevel) -> Self {
        self.output_level = level;
        self
    }

    #[must_use]
    pub fn with_pulse(mut self, pulse: PulseGeneratorConfig) -> Self {
        self.pulse = pulse;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Builds the ordered list of reconstruction stages for a detector.
#[derive(Clone, Debug)]
pub struct CaloCellBuilder {
    detector: DetectorDescription,
    config: CellBuilderConfig,
}

impl CaloCellBuilder {
    #[must_use]
    pub fn new(detector: DetectorDescription, config: CellBuilderConfig) -> Self {
        Self { detector, config }
    }

    #[must_use]
    pub fn config(&self) -> &CellBuilderConfig {
        &self.config
    }

    #[must_use]
    pub fn detector(&self) -> &DetectorDescription {
        &self.detector
    }

    /// Validates the configuration and assembles the pipeline: one cell maker
    /// per sampling layer, the merge, then cross-talk when enabled.
    ///
    /// # Errors
    /// Returns the first configuration error found; no event is processed.
    pub fn configure(&self) -> Result<Pipeline> {
        info!("Configure CaloCellBuilder.");
        self.detector.validate()?;

        let outputs = [
            RecordKey::Cells,
            RecordKey::TruthCells,
            RecordKey::XTCells,
            RecordKey::EventInfo,
        ];
        if self.config.hits_key.is_layer_collection() || outputs.contains(&self.config.hits_key) {
            return Err(Error::Config(format!(
                "{} cannot be used as hits key",
                self.config.hits_key
            )));
        }

        let mut makers = Vec::with_capacity(self.detector.samplings.len());
        let mut collection_keys = Vec::with_capacity(self.detector.samplings.len());
        for layer in &self.detector.samplings {
            info!(
                "Create new CaloCellMaker and dump all cells into {} collection",
                layer.collection_key
            );
            collection_keys.push(layer.collection_key);
            makers.push(CaloCellMaker::new(layer.clone(), &self.config.pulse)?);
        }

        info!("Create CaloCellMerge and dump all cell collections into Cells container");
        let merge = CaloCellMerge::new(collection_keys, RecordKey::Cells, RecordKey::TruthCells)?;

        let crosstalk = if self.config.do_crosstalk {
            info!("Create CrossTalk effect into Cell Collection");
            let config = CrossTalkConfig {
                cells_key: merge.cells_key(),
                ..self.config.crosstalk.clone()
            };
            Some(CrossTalk::from_detector(config, &self.detector)?)
        } else {
            None
        };

        Ok(Pipeline::new(
            self.config.hits_key,
            makers,
            merge,
            crosstalk,
            self.config.seed,
            self.config.histogram_path.clone(),
        ))
    }
}
