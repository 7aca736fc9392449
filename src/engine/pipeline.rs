//! Registration and odometry glued into one sweep-in, pose-out stage.

use crate::algorithms::odometry::{LaserOdometry, OdometryConfig, OdometryError, SweepOdometry};
use crate::core::types::PointCloud3D;
use crate::sensors::registration::{
    RegistrationConfig, RegistrationError, SweepRegistration,
};
use crate::sensors::rings::RingTable;
use crate::sensors::ImuSampler;
use thiserror::Error;

/// Pipeline construction errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("registration: {0}")]
    Registration(#[from] RegistrationError),

    #[error("odometry: {0}")]
    Odometry(#[from] OdometryError),
}

/// Configuration for the end-to-end sweep pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Sweep registration configuration
    pub registration: RegistrationConfig,
    /// Laser odometry configuration
    pub odometry: OdometryConfig,
}

/// The embedded processing path: raw sweep in, refined pose out.
///
/// Sweeps run strictly in timestamp order; an out-of-order arrival is
/// dropped and logged rather than processed.
pub struct OdometryPipeline {
    registration: SweepRegistration,
    odometry: LaserOdometry,
    last_sweep_time: Option<f64>,
    dropped_sweeps: u64,
}

impl OdometryPipeline {
    /// Create a pipeline for the given device.
    pub fn new(config: PipelineConfig, rings: RingTable) -> Result<Self, PipelineError> {
        Ok(Self {
            registration: SweepRegistration::new(config.registration, rings)?,
            odometry: LaserOdometry::new(config.odometry)?,
            last_sweep_time: None,
            dropped_sweeps: 0,
        })
    }

    /// The registration stage.
    pub fn registration(&self) -> &SweepRegistration {
        &self.registration
    }

    /// The odometry stage.
    pub fn odometry(&self) -> &LaserOdometry {
        &self.odometry
    }

    /// Sweeps dropped by the pipeline for ordering violations.
    pub fn dropped_sweeps(&self) -> u64 {
        self.dropped_sweeps
    }

    /// Process one raw sweep.
    ///
    /// Returns `None` while the startup delay is active, when registration
    /// rejects the sweep, or when the sweep violates timestamp ordering.
    pub fn process(
        &mut self,
        cloud: &PointCloud3D,
        sweep_time: f64,
        imu: Option<&dyn ImuSampler>,
    ) -> Option<SweepOdometry> {
        if let Some(last) = self.last_sweep_time {
            if sweep_time <= last {
                self.dropped_sweeps += 1;
                log::warn!(
                    "dropping out-of-order sweep at t={:.3} (last processed t={:.3})",
                    sweep_time,
                    last
                );
                return None;
            }
        }

        let registered = self.registration.process(cloud, sweep_time, imu)?;
        self.last_sweep_time = Some(sweep_time);
        Some(self.odometry.process(registered.features))
    }

    /// Halt the pipeline between sweeps: clear all partial state.
    pub fn reset(&mut self) {
        self.registration.reset();
        self.odometry.reset();
        self.last_sweep_time = None;
        self.dropped_sweeps = 0;
    }
}
