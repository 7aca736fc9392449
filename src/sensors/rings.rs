//! Vertical-angle to ring-index mapping for multi-ring lidars.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ring table construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingTableError {
    #[error("ring count must be positive")]
    ZeroRings,

    #[error("upper bound must exceed lower bound")]
    InvalidBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Mapping {
    /// Factory beam table of the VLP-16, three piecewise-linear segments
    Vlp16,
    /// Uniform beam spacing between the elevation bounds
    Linear,
}

/// Maps a point's vertical inclination to a discrete ring index.
///
/// Angles outside the device's beam table are rejected with `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingTable {
    lower_bound_deg: f32,
    upper_bound_deg: f32,
    n_rings: u16,
    factor: f32,
    mapping: Mapping,
}

impl RingTable {
    /// The VLP-16 factory beam table.
    pub fn vlp16() -> Self {
        Self {
            lower_bound_deg: -16.5,
            upper_bound_deg: 7.5,
            n_rings: 16,
            factor: 0.0,
            mapping: Mapping::Vlp16,
        }
    }

    /// Uniform beam spacing: `n_rings` beams between `lower_deg` and
    /// `upper_deg` degrees of elevation.
    pub fn linear(lower_deg: f32, upper_deg: f32, n_rings: u16) -> Result<Self, RingTableError> {
        if n_rings == 0 {
            return Err(RingTableError::ZeroRings);
        }
        if upper_deg <= lower_deg {
            return Err(RingTableError::InvalidBounds);
        }
        Ok(Self {
            lower_bound_deg: lower_deg,
            upper_bound_deg: upper_deg,
            n_rings,
            factor: (n_rings - 1) as f32 / (upper_deg - lower_deg),
            mapping: Mapping::Linear,
        })
    }

    /// Number of rings of the device.
    #[inline]
    pub fn n_rings(&self) -> usize {
        self.n_rings as usize
    }

    /// Ring index for a vertical angle in radians, or `None` when the angle
    /// falls outside the beam table.
    pub fn ring_for_angle(&self, angle_rad: f32) -> Option<usize> {
        let deg = angle_rad.to_degrees();
        let ring = match self.mapping {
            Mapping::Vlp16 => vlp16_ring(deg),
            Mapping::Linear => ((deg - self.lower_bound_deg) * self.factor + 0.5) as i32,
        };
        if ring < 0 || ring >= self.n_rings as i32 {
            None
        } else {
            Some(ring as usize)
        }
    }
}

/// VLP-16 beam table, angle in degrees. The 1.8 degree boundary belongs to
/// the middle segment.
fn vlp16_ring(deg: f32) -> i32 {
    if deg < 7.5 && deg > 1.8 {
        (8.0 - deg).round() as i32 - 1
    } else if deg <= 1.8 && deg > -5.8 {
        (30.0 - (deg + 6.0) * 3.0).round() as i32 - 1
    } else if deg <= -5.8 && deg >= -16.5 {
        ((-6.0 - deg) + 30.0).round() as i32 - 1
    } else {
        -1
    }
}
