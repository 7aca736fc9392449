//! Sweep registration: partitioning, capture-time recovery and feature
//! extraction.
//!
//! A raw sweep arrives as one unordered cloud in the conventional sensor
//! frame (X forward, Y left, Z up). Registration remaps it once into the
//! internal frame (X left, Y up, Z forward), splits it into per-ring scans
//! ordered by azimuth, recovers every point's sweep-relative capture time
//! from its horizontal orientation, and extracts the four-class feature
//! partition by locally-ranked curvature.

mod config;
mod features;
mod voxel;

pub use config::{RegistrationConfig, RegistrationError};
pub use voxel::VoxelGrid;

use crate::core::math;
use crate::core::types::{ImuSweepState, IndexRange, Point3D, PointCloud3D, SweepFeatures};
use crate::sensors::rings::RingTable;
use crate::sensors::ImuSampler;
use features::ExtractionBuffers;
use nalgebra::Vector3;
use std::f64::consts::PI;

/// Output of one registered sweep.
#[derive(Debug, Clone, Default)]
pub struct RegisteredSweep {
    /// Feature partition plus the full-resolution cloud
    pub features: SweepFeatures,
    /// Per-ring spans tiling the full-resolution cloud
    pub scan_ranges: Vec<IndexRange>,
}

/// Sweep registration stage.
pub struct SweepRegistration {
    config: RegistrationConfig,
    rings: RingTable,
    voxel: VoxelGrid,
    delay_remaining: u32,
    dropped_sweeps: u64,
    scans: Vec<PointCloud3D>,
    buffers: ExtractionBuffers,
}

impl SweepRegistration {
    /// Create a registration stage for the given device.
    pub fn new(
        config: RegistrationConfig,
        rings: RingTable,
    ) -> Result<Self, RegistrationError> {
        config.validate()?;
        let voxel = VoxelGrid::new(config.less_flat_filter_size);
        let scans = vec![PointCloud3D::new(); rings.n_rings()];
        Ok(Self {
            delay_remaining: config.system_delay,
            config,
            rings,
            voxel,
            dropped_sweeps: 0,
            scans,
            buffers: ExtractionBuffers::default(),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Sweeps dropped as malformed so far.
    pub fn dropped_sweeps(&self) -> u64 {
        self.dropped_sweeps
    }

    /// Clear per-sweep state and restart the startup delay.
    pub fn reset(&mut self) {
        self.delay_remaining = self.config.system_delay;
        self.dropped_sweeps = 0;
        for scan in &mut self.scans {
            scan.clear();
        }
    }

    /// Register one sweep.
    ///
    /// Returns `None` while the startup delay is active or when the sweep is
    /// malformed (empty, or led by non-finite points). With an
    /// [`ImuSampler`], every accepted point is projected to the sweep start
    /// before feature extraction.
    pub fn process(
        &mut self,
        input: &PointCloud3D,
        sweep_time: f64,
        imu: Option<&dyn ImuSampler>,
    ) -> Option<RegisteredSweep> {
        if self.delay_remaining > 0 {
            self.delay_remaining -= 1;
            return None;
        }
        if input.is_empty() {
            self.dropped_sweeps += 1;
            log::warn!("dropping empty sweep at t={:.3}", sweep_time);
            return None;
        }

        let first = &input[0];
        let last = &input[input.len() - 1];
        if !first.is_finite() || !last.is_finite() {
            self.dropped_sweeps += 1;
            log::warn!(
                "dropping sweep at t={:.3}: non-finite boundary points",
                sweep_time
            );
            return None;
        }

        // Sweep start and end orientations from the raw frame, with the end
        // unwrapped one turn ahead of the start.
        let start_ori = -(first.y as f64).atan2(first.x as f64);
        let mut end_ori = -(last.y as f64).atan2(last.x as f64) + 2.0 * PI;
        if end_ori - start_ori > 3.0 * PI {
            end_ori -= 2.0 * PI;
        } else if end_ori - start_ori < PI {
            end_ori += 2.0 * PI;
        }

        for scan in &mut self.scans {
            scan.clear();
        }

        let mut half_passed = false;
        for raw in input.iter() {
            // The axis remap into the internal frame happens here, once.
            let mut point = Point3D::new(raw.y, raw.z, raw.x, 0.0);

            if !point.is_finite() {
                continue;
            }
            if point.squared_norm() < 1e-4 {
                continue;
            }

            let vertical =
                (point.y / (point.x * point.x + point.z * point.z).sqrt()).atan();
            let Some(ring) = self.rings.ring_for_angle(vertical) else {
                continue;
            };

            let mut ori = -(point.x as f64).atan2(point.z as f64);
            if !half_passed {
                if ori < start_ori - PI / 2.0 {
                    ori += 2.0 * PI;
                } else if ori > start_ori + PI * 3.0 / 2.0 {
                    ori -= 2.0 * PI;
                }
                if ori - start_ori > PI {
                    half_passed = true;
                }
            } else {
                ori += 2.0 * PI;
                if ori < end_ori - PI * 3.0 / 2.0 {
                    ori += 2.0 * PI;
                } else if ori > end_ori + PI / 2.0 {
                    ori -= 2.0 * PI;
                }
            }

            let rel_time = self.config.scan_period * (ori - start_ori) / (end_ori - start_ori);
            point.intensity = ring as f32 + rel_time as f32;

            if let Some(sampler) = imu {
                project_to_sweep_start(&mut point, rel_time, sampler);
            }

            self.scans[ring].push(point);
        }

        // Concatenating the per-ring scans in ring order yields the
        // full-resolution cloud; the spans tile it exactly.
        let mut full = PointCloud3D::with_capacity(input.len());
        let mut scan_ranges = Vec::with_capacity(self.scans.len());
        for scan in &self.scans {
            let start = full.len();
            full.extend_from_cloud(scan);
            scan_ranges.push(IndexRange::new(start, full.len()));
        }

        if full.is_empty() {
            self.dropped_sweeps += 1;
            log::warn!(
                "dropping sweep at t={:.3}: no point passed the ingest filters",
                sweep_time
            );
            return None;
        }

        let extracted =
            features::extract_features(&self.config, &self.voxel, &full, &scan_ranges, &mut self.buffers);

        let imu_state = match imu {
            Some(sampler) => sweep_imu_state(sampler, self.config.scan_period),
            None => ImuSweepState::default(),
        };

        Some(RegisteredSweep {
            features: SweepFeatures {
                corner_sharp: extracted.corner_sharp,
                corner_less_sharp: extracted.corner_less_sharp,
                surface_flat: extracted.surface_flat,
                surface_less_flat: extracted.surface_less_flat,
                full_resolution: full,
                imu: imu_state,
                time: sweep_time,
            },
            scan_ranges,
        })
    }
}

/// Project a point captured at `rel_time` back to the start of the sweep
/// using the sampled IMU orientation and drift.
fn project_to_sweep_start(point: &mut Point3D, rel_time: f64, sampler: &dyn ImuSampler) {
    let cur = sampler.sample(rel_time);
    let start = sampler.sample(0.0);

    let v = Vector3::new(point.x as f64, point.y as f64, point.z as f64);
    // Into the global IMU frame at the capture instant.
    let mut v = math::rotate_zxy(v, cur.roll, cur.pitch, cur.yaw);
    v.x += cur.drift[0] - start.drift[0];
    v.y += cur.drift[1] - start.drift[1];
    v.z += cur.drift[2] - start.drift[2];
    // Back into the local frame of the sweep start.
    let v = math::rotate_yxz(v, -start.yaw, -start.pitch, -start.roll);

    point.x = v.x as f32;
    point.y = v.y as f32;
    point.z = v.z as f32;
}

/// Condense a sampler into the value snapshot handed to odometry.
fn sweep_imu_state(sampler: &dyn ImuSampler, scan_period: f64) -> ImuSweepState {
    let start = sampler.sample(0.0);
    let end = sampler.sample(scan_period);
    ImuSweepState {
        pitch_start: start.pitch,
        yaw_start: start.yaw,
        roll_start: start.roll,
        pitch_end: end.pitch,
        yaw_end: end.yaw,
        roll_end: end.roll,
        shift_from_start: [
            end.drift[0] - start.drift[0],
            end.drift[1] - start.drift[1],
            end.drift[2] - start.drift[2],
        ],
        velocity_from_start: sampler.velocity_from_start(),
    }
}
