//! Cell calibration applied before estimation.

use calocell_core::cell::FrozenCell;

/// Speed of light (mm/ns).
pub const SPEED_OF_LIGHT_MM_PER_NS: f32 = 299.792_46;

/// Calibration step applied to every frozen cell of a layer.
pub trait Calibration: Send + Sync {
    /// Returns the name of the calibration.
    fn name(&self) -> &'static str;

    /// Calibrates the cell in place.
    fn calibrate(&self, cell: &mut FrozenCell);
}

/// Subtracts the flight time from the interaction point to the cell centre
/// from the truth times of flight.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeOfFlightCalibration;

impl TimeOfFlightCalibration {
    /// Flight time (ns) from the interaction point to a cell at pseudorapidity
    /// `eta` between radii `r_min` and `r_max` (mm).
    #[must_use]
    pub fn tof_ip(eta: f32, r_min: f32, r_max: f32) -> f32 {
        let theta = 2.0 * (-eta.abs()).exp().atan();
        let yn = 0.5 * (r_min + r_max);
        let rn = yn / theta.sin();
        rn / SPEED_OF_LIGHT_MM_PER_NS
    }
}

impl Calibration for TimeOfFlightCalibration {
    fn name(&self) -> &'static str {
        "TimeOfFlightCalibration"
    }

    fn calibrate(&self, cell: &mut FrozenCell) {
        let g = cell.geometry;
        let delay = Self::tof_ip(g.eta, g.r_min, g.r_max);
        for tof in cell.truth.tof.iter_mut().filter(|t| **t > 0.0) {
            *tof -= delay;
        }
    }
}
