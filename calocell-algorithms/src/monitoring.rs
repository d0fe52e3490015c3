//! Monitoring histograms.
//!
//! Histograms are booked per layer under `<histogram path>/<layer name>` and
//! have no influence on reconstruction results.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::collections::BTreeMap;

use calocell_core::collection::CellCollection;
use calocell_core::error::{Error, Result};
use calocell_core::sampling::SamplingLayerConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fixed-width one-dimensional histogram.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram1D {
    pub min: f32,
    pub max: f32,
    pub counts: Vec<u64>,
    pub underflow: u64,
    pub overflow: u64,
}

impl Histogram1D {
    /// Creates an empty histogram.
    ///
    /// # Errors
    /// Returns a configuration error for zero bins or an empty range.
    pub fn new(bins: usize, min: f32, max: f32) -> Result<Self> {
        if bins == 0 || !(min < max) {
            return Err(Error::Config(format!(
                "histogram needs bins > 0 and min < max, got {bins} [{min}, {max}]"
            )));
        }
        Ok(Self {
            min,
            max,
            counts: vec![0; bins],
            underflow: 0,
            overflow: 0,
        })
    }

    pub fn fill(&mut self, value: f32) {
        if value.is_nan() || value < self.min {
            self.underflow += 1;
        } else if value >= self.max {
            self.overflow += 1;
        } else {
            let width = (self.max - self.min) / self.counts.len() as f32;
            let bin = (((value - self.min) / width) as usize).min(self.counts.len() - 1);
            self.counts[bin] += 1;
        }
    }

    /// Total number of fills.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.counts.iter().sum::<u64>() + self.underflow + self.overflow
    }

    /// Adds the contents of a histogram with the same binning.
    ///
    /// # Errors
    /// Returns a configuration error if the binnings differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.counts.len() != other.counts.len() || self.min != other.min || self.max != other.max
        {
            return Err(Error::Config("cannot merge histograms with different binning".into()));
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        Ok(())
    }
}

/// Histograms of all layers, keyed by path.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MonitorSet {
    pub histograms: BTreeMap<String, Histogram1D>,
}

impl MonitorSet {
    /// Books the per-layer histograms.
    ///
    /// # Errors
    /// Never fails for the built-in binnings.
    pub fn book<'a>(
        histogram_path: &str,
        layers: impl IntoIterator<Item = &'a SamplingLayerConfig>,
    ) -> Result<Self> {
        let mut histograms = BTreeMap::new();
        for layer in layers {
            let dir = layer_dir(histogram_path, &layer.name);
            histograms.insert(
                format!("{dir}/cells_energy"),
                Histogram1D::new(200, -2e3, 1e5)?,
            );
            histograms.insert(
                format!("{dir}/res_energy"),
                Histogram1D::new(200, -500.0, 500.0)?,
            );
            histograms.insert(format!("{dir}/res_time"), Histogram1D::new(200, -50.0, 50.0)?);
        }
        Ok(Self { histograms })
    }

    /// Fills the histograms of one layer from its collection.
    pub fn fill_collection(
        &mut self,
        histogram_path: &str,
        layer_name: &str,
        collection: &CellCollection,
    ) {
        let dir = layer_dir(histogram_path, layer_name);
        for cell in collection.iter() {
            if let Some(h) = self.histograms.get_mut(&format!("{dir}/cells_energy")) {
                h.fill(cell.energy);
            }
            if let Some(h) = self.histograms.get_mut(&format!("{dir}/res_energy")) {
                h.fill(cell.energy - cell.truth.edep());
            }
            if cell.truth.edep() > 0.0 {
                if let Some(h) = self.histograms.get_mut(&format!("{dir}/res_time")) {
                    h.fill(cell.time - cell.truth.tof());
                }
            }
        }
    }

    /// Adds the contents of another set.
    ///
    /// # Errors
    /// Returns an error if a shared histogram has a different binning.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        for (path, h) in &other.histograms {
            match self.histograms.get_mut(path) {
                Some(mine) => mine.merge(h)?,
                None => {
                    self.histograms.insert(path.clone(), h.clone());
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Histogram1D> {
        self.histograms.get(path)
    }
}

fn layer_dir(histogram_path: &str, layer_name: &str) -> String {
    if histogram_path.is_empty() {
        layer_name.to_string()
    } else {
        format!("{}/{layer_name}", histogram_path.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_fill() {
        let mut h = Histogram1D::new(4, 0.0, 4.0).unwrap();
        h.fill(0.5);
        h.fill(3.99);
        h.fill(-1.0);
        h.fill(4.0);
        h.fill(f32::NAN);
        assert_eq!(h.counts, vec![1, 0, 0, 1]);
        assert_eq!(h.underflow, 2);
        assert_eq!(h.overflow, 1);
        assert_eq!(h.entries(), 5);
    }

    #[test]
    fn test_histogram_merge() {
        let mut a = Histogram1D::new(2, 0.0, 2.0).unwrap();
        let mut b = a.clone();
        a.fill(0.5);
        b.fill(1.5);
        a.merge(&b).unwrap();
        assert_eq!(a.counts, vec![1, 1]);
        let c = Histogram1D::new(3, 0.0, 2.0).unwrap();
        assert!(a.merge(&c).is_err());
        assert!(Histogram1D::new(0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_layer_dir() {
        assert_eq!(layer_dir("Expert", "EMB1"), "Expert/EMB1");
        assert_eq!(layer_dir("Expert/", "EMB1"), "Expert/EMB1");
        assert_eq!(layer_dir("", "EMB1"), "EMB1");
    }
}
