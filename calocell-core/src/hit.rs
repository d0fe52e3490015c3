//! Truth energy deposits produced by the detector simulation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cartesian position in the detector frame, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Transverse distance to the beam axis.
    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Azimuthal angle in (-pi, pi].
    #[inline]
    #[must_use]
    pub fn phi(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Pseudorapidity.
    ///
    /// Points on the beam axis map to +/- infinity.
    #[inline]
    #[must_use]
    pub fn eta(&self) -> f32 {
        let r = self.radius();
        if r == 0.0 {
            return if self.z >= 0.0 {
                f32::INFINITY
            } else {
                f32::NEG_INFINITY
            };
        }
        (self.z / r).asinh()
    }
}

/// Core data structure for a single truth energy deposit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CaloHit {
    /// Position of the deposit.
    pub position: Position,
    /// Global time of the deposit (ns).
    pub time_ns: f32,
    /// Deposited energy (MeV).
    pub edep: f32,
    /// Bunch crossing relative to the triggered crossing.
    pub bcid: i32,
}

impl CaloHit {
    /// Creates a new hit.
    #[inline]
    #[must_use]
    pub fn new(position: Position, time_ns: f32, edep: f32, bcid: i32) -> Self {
        Self {
            position,
            time_ns,
            edep,
            bcid,
        }
    }
}

/// Trait for truth deposits consumed by the cell makers.
pub trait Hit: Send + Sync {
    /// Returns the deposit position.
    fn position(&self) -> Position;

    /// Returns the deposited energy (MeV).
    fn edep(&self) -> f32;

    /// Returns the bunch crossing id.
    fn bcid(&self) -> i32;

    /// Returns the global time (ns).
    fn time_ns(&self) -> f32;

    /// Returns the transverse radius.
    #[inline]
    fn radius(&self) -> f32 {
        self.position().radius()
    }

    /// Returns the pseudorapidity.
    #[inline]
    fn eta(&self) -> f32 {
        self.position().eta()
    }

    /// Returns the azimuth.
    #[inline]
    fn phi(&self) -> f32 {
        self.position().phi()
    }
}

impl Hit for CaloHit {
    #[inline]
    fn position(&self) -> Position {
        self.position
    }

    #[inline]
    fn edep(&self) -> f32 {
        self.edep
    }

    #[inline]
    fn bcid(&self) -> i32 {
        self.bcid
    }

    #[inline]
    fn time_ns(&self) -> f32 {
        self.time_ns
    }
}

/// Maps a global time onto the bunch crossing it belongs to.
///
/// Crossing `b` covers `[(b - 0.5) * duration, (b + 0.5) * duration)`.
/// Returns `None` outside `[bcid_start, bcid_end]`.
#[must_use]
pub fn bunch_crossing_for_time(
    time_ns: f32,
    bcid_start: i32,
    bcid_end: i32,
    bc_duration: f32,
) -> Option<i32> {
    if bc_duration <= 0.0 || !time_ns.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let bcid = (time_ns / bc_duration + 0.5).floor() as i32;
    (bcid_start..=bcid_end).contains(&bcid).then_some(bcid)
}

/// Wraps an azimuth into (-pi, pi].
#[must_use]
pub fn fix_phi(phi: f32) -> f32 {
    use std::f32::consts::PI;
    let mut phi = phi % (2.0 * PI);
    if phi > PI {
        phi -= 2.0 * PI;
    } else if phi <= -PI {
        phi += 2.0 * PI;
    }
    phi
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_position_angles() {
        let p = Position::new(0.0, 1500.0, 0.0);
        assert_abs_diff_eq!(p.radius(), 1500.0);
        assert_abs_diff_eq!(p.phi(), PI / 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(p.eta(), 0.0);

        // theta = 45 degrees -> eta = -ln(tan(pi/8))
        let p = Position::new(1000.0, 0.0, 1000.0);
        assert_abs_diff_eq!(p.eta(), 0.881_373_6, epsilon = 1e-5);
    }

    #[test]
    fn test_beam_axis_eta() {
        assert!(Position::new(0.0, 0.0, 10.0).eta().is_infinite());
        assert!(Position::new(0.0, 0.0, -10.0).eta() < 0.0);
    }

    #[test]
    fn test_hit_trait() {
        let hit = CaloHit::new(Position::new(1500.0, 0.0, 0.0), 5.0, 100.0, -2);
        assert_abs_diff_eq!(hit.radius(), 1500.0);
        assert_abs_diff_eq!(hit.phi(), 0.0);
        assert_eq!(hit.bcid(), -2);
        assert_abs_diff_eq!(Hit::edep(&hit), 100.0);
    }

    #[test]
    fn test_bunch_crossing_for_time() {
        assert_eq!(bunch_crossing_for_time(0.0, -21, 4, 25.0), Some(0));
        assert_eq!(bunch_crossing_for_time(12.4, -21, 4, 25.0), Some(0));
        assert_eq!(bunch_crossing_for_time(12.5, -21, 4, 25.0), Some(1));
        assert_eq!(bunch_crossing_for_time(-12.6, -21, 4, 25.0), Some(-1));
        assert_eq!(bunch_crossing_for_time(110.0, -21, 4, 25.0), Some(4));
        assert_eq!(bunch_crossing_for_time(113.0, -21, 4, 25.0), None);
        assert_eq!(bunch_crossing_for_time(-600.0, -21, 4, 25.0), None);
        assert_eq!(bunch_crossing_for_time(0.0, -21, 4, 0.0), None);
    }

    #[test]
    fn test_fix_phi() {
        assert_abs_diff_eq!(fix_phi(0.5), 0.5);
        assert_abs_diff_eq!(fix_phi(PI + 0.5), -PI + 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(fix_phi(-PI - 0.5), PI - 0.5, epsilon = 1e-5);
    }
}
