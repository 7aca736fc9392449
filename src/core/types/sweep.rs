//! Per-sweep aggregate types shared between pipeline stages.

use super::point::PointCloud3D;
use serde::{Deserialize, Serialize};

/// Half-open index span of one ring inside the concatenated sweep cloud.
///
/// Spans of consecutive rings tile the full-resolution cloud without gaps
/// or overlap; an empty ring has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    /// First index of the ring
    pub start: usize,
    /// One past the last index of the ring
    pub end: usize,
}

impl IndexRange {
    /// Create a new range.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of points in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the ring holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Value snapshot of the IMU over one sweep.
///
/// Produced by the orchestrator (or an [`crate::sensors::ImuSampler`]) and
/// handed to odometry by value; odometry never reaches back into an IMU
/// buffer. Orientation triples are (pitch, yaw, roll) about the X, Y and Z
/// axes. Defaults to all zeros, which disables every IMU correction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuSweepState {
    /// Pitch at the start of the sweep in radians
    pub pitch_start: f64,
    /// Yaw at the start of the sweep in radians
    pub yaw_start: f64,
    /// Roll at the start of the sweep in radians
    pub roll_start: f64,
    /// Pitch at the end of the sweep in radians
    pub pitch_end: f64,
    /// Yaw at the end of the sweep in radians
    pub yaw_end: f64,
    /// Roll at the end of the sweep in radians
    pub roll_end: f64,
    /// Nonlinear position drift over the sweep, relative to constant
    /// velocity extrapolation from the sweep start (meters)
    pub shift_from_start: [f64; 3],
    /// Velocity change over the sweep relative to the sweep start (m/s)
    pub velocity_from_start: [f64; 3],
}

/// The feature partition of one sweep, plus its full-resolution cloud.
///
/// Clouds are owned snapshots: registration produces them, odometry consumes
/// them, and the adopted reference clouds are re-owned by the KD-tree index.
#[derive(Debug, Clone, Default)]
pub struct SweepFeatures {
    /// Strongest-curvature corner points (at most 2 per ring sextant)
    pub corner_sharp: PointCloud3D,
    /// Corner points including the sharp set (at most 20 per sextant)
    pub corner_less_sharp: PointCloud3D,
    /// Weakest-curvature surface points (at most 4 per sextant)
    pub surface_flat: PointCloud3D,
    /// All non-corner points after voxel-grid downsampling
    pub surface_less_flat: PointCloud3D,
    /// The concatenated per-ring sweep cloud
    pub full_resolution: PointCloud3D,
    /// IMU snapshot covering this sweep
    pub imu: ImuSweepState,
    /// Sweep timestamp in seconds
    pub time: f64,
}
