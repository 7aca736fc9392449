//! Sweep registration configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sweep registration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("scan period must be positive")]
    NonPositiveScanPeriod,
}

/// Configuration for sweep registration and feature extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Duration of one full sweep in seconds.
    pub scan_period: f64,

    /// Number of startup sweeps discarded while the sensor settles.
    pub system_delay: u32,

    /// Curvature above which a point qualifies as a corner candidate.
    pub edge_threshold: f32,

    /// Curvature below which a point qualifies as a surface candidate.
    pub surface_threshold: f32,

    /// Voxel leaf size for the less-flat surface cloud (meters).
    pub less_flat_filter_size: f32,

    /// Sharp corners emitted per ring sextant.
    pub max_corner_sharp: usize,

    /// Corner points (including the sharp ones) emitted per ring sextant.
    pub max_corner_less_sharp: usize,

    /// Flat surface points emitted per ring sextant.
    pub max_surface_flat: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            scan_period: 0.1,
            system_delay: 20,
            edge_threshold: 0.1,
            surface_threshold: 0.1,
            less_flat_filter_size: 0.2,
            max_corner_sharp: 2,
            max_corner_less_sharp: 20,
            max_surface_flat: 4,
        }
    }
}

impl RegistrationConfig {
    /// Validate constructor-level invariants.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.scan_period <= 0.0 {
            return Err(RegistrationError::NonPositiveScanPeriod);
        }
        Ok(())
    }
}
