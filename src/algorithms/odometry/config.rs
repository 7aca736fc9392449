//! Laser odometry configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Laser odometry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OdometryError {
    #[error("scan period must be positive")]
    NonPositiveScanPeriod,

    #[error("iteration budget must be positive")]
    ZeroIterations,
}

/// Configuration for frame-to-frame laser odometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdometryConfig {
    /// Duration of one full sweep in seconds.
    pub scan_period: f64,

    /// Maximum optimization iterations per sweep.
    pub max_iterations: u32,

    /// Correspondences are rebuilt on every multiple of this iteration and
    /// reused in between.
    pub correspondence_interval: u32,

    /// Maximum squared distance for a corner feature's nearest reference
    /// point (square meters).
    pub corner_sq_dist_threshold: f32,

    /// Maximum squared distance for a surface feature's nearest reference
    /// point (square meters).
    pub surf_sq_dist_threshold: f32,

    /// Convergence threshold on the largest rotation step component
    /// (degrees).
    pub delta_rot_convergence: f64,

    /// Convergence threshold on the largest translation step component
    /// (meters).
    pub delta_trans_convergence: f64,

    /// Eigenvalues of the normal equations below this mark the update
    /// subspace as degenerate.
    pub degeneracy_eigen_threshold: f64,

    /// Constant damping added to the normal equations diagonal.
    pub lambda: f64,

    /// Minimum selected correspondences required to run an iteration.
    pub min_correspondences: usize,

    /// Iterations that use uniform residual weights before the
    /// distance-based down-weighting kicks in.
    pub uniform_weight_iters: u32,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        Self {
            scan_period: 0.1,
            max_iterations: 25,
            correspondence_interval: 5,
            corner_sq_dist_threshold: 25.0,
            surf_sq_dist_threshold: 25.0,
            delta_rot_convergence: 0.1,
            delta_trans_convergence: 1e-4,
            degeneracy_eigen_threshold: 10.0,
            lambda: 1e-3,
            min_correspondences: 10,
            uniform_weight_iters: 10,
        }
    }
}

impl OdometryConfig {
    /// Validate constructor-level invariants.
    pub fn validate(&self) -> Result<(), OdometryError> {
        if self.scan_period <= 0.0 {
            return Err(OdometryError::NonPositiveScanPeriod);
        }
        if self.max_iterations == 0 {
            return Err(OdometryError::ZeroIterations);
        }
        Ok(())
    }
}
