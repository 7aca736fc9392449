//! Frame-to-frame laser odometry.
//!
//! Matches the feature partition of the current sweep against the feature
//! clouds of the previous sweep and estimates the 6-DoF motion of the
//! sensor over the sweep with a damped Gauss-Newton loop:
//!
//! 1. Every sharp corner point is motion-undistorted to the sweep start and
//!    paired with an edge line in the previous corner cloud; every flat
//!    surface point with a plane tripod in the previous surface cloud.
//! 2. Point-to-line and point-to-plane residuals are stacked into 6x6
//!    normal equations and solved for a pose update, with an eigenvalue
//!    guard freezing degenerate directions.
//! 3. At convergence the delta is composed into the accumulated world pose
//!    and the current less-sharp/less-flat clouds are projected to the
//!    sweep end to serve as the next reference.

mod config;
mod correspondence;
mod solver;

pub use config::{OdometryConfig, OdometryError};

use crate::core::kdtree::CloudIndex;
use crate::core::math;
use crate::core::types::{ImuSweepState, Point3D, PointCloud3D, Pose6D, SweepFeatures};
use correspondence::{CornerPair, ResidualTerm, SurfaceTriple};
use nalgebra::Vector3;
use solver::{DegeneracyGuard, NormalEquations};

/// Reference corner points required before optimization is attempted.
const MIN_REFERENCE_CORNERS: usize = 10;

/// Reference surface points required before optimization is attempted.
const MIN_REFERENCE_SURFACES: usize = 100;

/// Rejection floor for the robust residual weight.
const WEIGHT_FLOOR: f64 = 0.1;

/// Result of processing one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SweepOdometry {
    /// Sensor motion over the sweep
    pub transform: Pose6D,
    /// Accumulated world pose at the end of the sweep
    pub transform_sum: Pose6D,
    /// Optimization iterations spent
    pub iterations: u32,
    /// Whether the step thresholds were reached before the iteration budget
    pub converged: bool,
    /// Whether the eigenvalue guard constrained the update subspace
    pub degenerate: bool,
    /// Whether optimization was skipped and an identity delta propagated
    pub skipped: bool,
}

/// Frame-to-frame laser odometry stage.
pub struct LaserOdometry {
    config: OdometryConfig,
    system_inited: bool,
    frame_count: u64,
    dropped_sweeps: u64,
    skipped_sweeps: u64,
    transform: Pose6D,
    transform_sum: Pose6D,
    last_corner_index: CloudIndex,
    last_surface_index: CloudIndex,
    corner_pairs: Vec<CornerPair>,
    surface_triples: Vec<SurfaceTriple>,
    terms: Vec<ResidualTerm>,
    last_result: SweepOdometry,
}

impl LaserOdometry {
    /// Create an odometry stage.
    pub fn new(config: OdometryConfig) -> Result<Self, OdometryError> {
        config.validate()?;
        Ok(Self {
            config,
            system_inited: false,
            frame_count: 0,
            dropped_sweeps: 0,
            skipped_sweeps: 0,
            transform: Pose6D::identity(),
            transform_sum: Pose6D::identity(),
            last_corner_index: CloudIndex::empty(),
            last_surface_index: CloudIndex::empty(),
            corner_pairs: Vec::new(),
            surface_triples: Vec::new(),
            terms: Vec::new(),
            last_result: SweepOdometry::default(),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &OdometryConfig {
        &self.config
    }

    /// The most recent per-sweep result.
    pub fn latest(&self) -> &SweepOdometry {
        &self.last_result
    }

    /// Reference corner cloud from the previous sweep, projected to its end.
    pub fn last_corner_cloud(&self) -> &PointCloud3D {
        self.last_corner_index.points()
    }

    /// Reference surface cloud from the previous sweep, projected to its end.
    pub fn last_surface_cloud(&self) -> &PointCloud3D {
        self.last_surface_index.points()
    }

    /// Sweeps dropped as malformed so far.
    pub fn dropped_sweeps(&self) -> u64 {
        self.dropped_sweeps
    }

    /// Sweeps where optimization was skipped for lack of correspondences.
    pub fn skipped_sweeps(&self) -> u64 {
        self.skipped_sweeps
    }

    /// Processed sweeps since initialization.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Drop all inter-sweep state and counters.
    pub fn reset(&mut self) {
        self.system_inited = false;
        self.frame_count = 0;
        self.dropped_sweeps = 0;
        self.skipped_sweeps = 0;
        self.transform = Pose6D::identity();
        self.transform_sum = Pose6D::identity();
        self.last_corner_index = CloudIndex::empty();
        self.last_surface_index = CloudIndex::empty();
        self.corner_pairs.clear();
        self.surface_triples.clear();
        self.terms.clear();
        self.last_result = SweepOdometry::default();
    }

    /// Transform the current full-resolution cloud into the world frame at
    /// the accumulated pose.
    pub fn register_cloud(&self, cloud: &PointCloud3D) -> PointCloud3D {
        let mut out = PointCloud3D::with_capacity(cloud.len());
        for p in cloud.iter() {
            let v = self
                .transform_sum
                .transform_point(Vector3::new(p.x as f64, p.y as f64, p.z as f64));
            out.push(Point3D::new(
                v.x as f32,
                v.y as f32,
                v.z as f32,
                p.intensity,
            ));
        }
        out
    }

    /// Process one sweep of features and return the refined motion estimate.
    pub fn process(&mut self, sweep: SweepFeatures) -> SweepOdometry {
        if sweep.full_resolution.is_empty() {
            self.dropped_sweeps += 1;
            log::warn!("dropping sweep at t={:.3}: empty full-resolution cloud", sweep.time);
            self.last_result = SweepOdometry {
                transform: Pose6D::identity(),
                transform_sum: self.transform_sum,
                skipped: true,
                ..SweepOdometry::default()
            };
            return self.last_result;
        }

        if !self.system_inited {
            return self.initialize(sweep);
        }
        self.frame_count += 1;

        let imu = sweep.imu;
        // Constant-velocity seed from the IMU, applied on top of the warm
        // start carried over from the previous sweep.
        self.transform.tx -= imu.velocity_from_start[0] * self.config.scan_period;
        self.transform.ty -= imu.velocity_from_start[1] * self.config.scan_period;
        self.transform.tz -= imu.velocity_from_start[2] * self.config.scan_period;

        let mut iterations = 0;
        let mut converged = false;
        let mut degenerate = false;
        let mut skipped = false;

        if self.last_corner_index.len() > MIN_REFERENCE_CORNERS
            && self.last_surface_index.len() > MIN_REFERENCE_SURFACES
        {
            self.corner_pairs.clear();
            self.corner_pairs.resize(sweep.corner_sharp.len(), (-1, -1));
            self.surface_triples.clear();
            self.surface_triples
                .resize(sweep.surface_flat.len(), (-1, -1, -1));

            let mut guard: Option<DegeneracyGuard> = None;

            for iter in 0..self.config.max_iterations {
                let rebuild = iter % self.config.correspondence_interval == 0;
                let uniform = iter < self.config.uniform_weight_iters;

                self.terms.clear();
                self.collect_corner_terms(&sweep.corner_sharp, rebuild, uniform);
                self.collect_surface_terms(&sweep.surface_flat, rebuild, uniform);

                if self.terms.len() < self.config.min_correspondences {
                    if iter == 0 {
                        skipped = true;
                        log::warn!(
                            "sweep at t={:.3}: only {} correspondences, skipping optimization",
                            sweep.time,
                            self.terms.len()
                        );
                        break;
                    }
                    continue;
                }

                let mut eq = NormalEquations::new();
                solver::accumulate(&self.terms, &self.transform, &mut eq);

                if iter == 0 {
                    let analysis =
                        DegeneracyGuard::analyze(&eq.h, self.config.degeneracy_eigen_threshold);
                    if analysis.degenerate {
                        degenerate = true;
                        log::debug!(
                            "sweep at t={:.3}: degenerate geometry, constraining update",
                            sweep.time
                        );
                    }
                    guard = Some(analysis);
                }

                let Some(mut delta) = solver::solve(&eq, self.config.lambda) else {
                    log::warn!(
                        "sweep at t={:.3}: normal equations not solvable, stopping at iteration {}",
                        sweep.time,
                        iter
                    );
                    break;
                };
                if let Some(g) = &guard {
                    if g.degenerate {
                        delta = g.project(&delta);
                    }
                }

                self.transform.rx += delta[0];
                self.transform.ry += delta[1];
                self.transform.rz += delta[2];
                self.transform.tx += delta[3];
                self.transform.ty += delta[4];
                self.transform.tz += delta[5];
                self.transform.zero_non_finite();
                iterations = iter + 1;

                let delta_rot = delta[0]
                    .abs()
                    .max(delta[1].abs())
                    .max(delta[2].abs())
                    .to_degrees();
                let delta_trans = delta[3].abs().max(delta[4].abs()).max(delta[5].abs());
                if delta_rot < self.config.delta_rot_convergence
                    && delta_trans < self.config.delta_trans_convergence
                {
                    converged = true;
                    break;
                }
            }
        } else {
            skipped = true;
            log::warn!(
                "sweep at t={:.3}: reference clouds too small (corners={}, surfaces={}), skipping optimization",
                sweep.time,
                self.last_corner_index.len(),
                self.last_surface_index.len()
            );
        }

        if skipped {
            self.skipped_sweeps += 1;
            self.transform = Pose6D::identity();
        }

        self.integrate(&imu);
        self.adopt_reference(sweep, &imu);

        self.last_result = SweepOdometry {
            transform: self.transform,
            transform_sum: self.transform_sum,
            iterations,
            converged,
            degenerate,
            skipped,
        };
        self.last_result
    }

    /// First accepted sweep: adopt its relaxed feature clouds as the
    /// reference and seed the world orientation from the IMU.
    fn initialize(&mut self, sweep: SweepFeatures) -> SweepOdometry {
        if sweep.corner_less_sharp.is_empty() || sweep.surface_less_flat.is_empty() {
            self.dropped_sweeps += 1;
            log::warn!(
                "sweep at t={:.3}: feature clouds empty, cannot initialize",
                sweep.time
            );
        } else {
            self.last_corner_index = CloudIndex::build(sweep.corner_less_sharp);
            self.last_surface_index = CloudIndex::build(sweep.surface_less_flat);
            self.transform_sum.rx += sweep.imu.pitch_start;
            self.transform_sum.rz += sweep.imu.roll_start;
            self.system_inited = true;
        }
        self.last_result = SweepOdometry {
            transform: Pose6D::identity(),
            transform_sum: self.transform_sum,
            ..SweepOdometry::default()
        };
        self.last_result
    }

    /// Project a feature point to the start of the sweep by interpolating
    /// the current motion estimate over the point's capture phase.
    fn transform_to_start(&self, p: &Point3D) -> Point3D {
        let s = p.rel_time() as f64 / self.config.scan_period;
        let t = &self.transform;
        let q = Vector3::new(
            p.x as f64 - s * t.tx,
            p.y as f64 - s * t.ty,
            p.z as f64 - s * t.tz,
        );
        let v = math::rotate_zxy(q, -s * t.rz, -s * t.rx, -s * t.ry);
        Point3D::new(v.x as f32, v.y as f32, v.z as f32, p.intensity)
    }

    /// Project a feature point to the end of the sweep under the final
    /// motion estimate and the IMU correction, keeping its intensity.
    fn project_point_to_end(&self, p: &Point3D, imu: &ImuSweepState) -> Point3D {
        let s = p.rel_time() as f64 / self.config.scan_period;
        let t = &self.transform;

        let q = Vector3::new(
            p.x as f64 - s * t.tx,
            p.y as f64 - s * t.ty,
            p.z as f64 - s * t.tz,
        );
        let v = math::rotate_zxy(q, -s * t.rz, -s * t.rx, -s * t.ry);
        let mut v = math::rotate_yxz(v, t.ry, t.rx, t.rz);
        v.x += t.tx - imu.shift_from_start[0];
        v.y += t.ty - imu.shift_from_start[1];
        v.z += t.tz - imu.shift_from_start[2];
        let v = math::rotate_zxy(v, imu.roll_start, imu.pitch_start, imu.yaw_start);
        let v = math::rotate_yxz(v, -imu.yaw_end, -imu.pitch_end, -imu.roll_end);

        Point3D::new(v.x as f32, v.y as f32, v.z as f32, p.intensity)
    }

    /// Project a whole cloud to the sweep end, collapsing each intensity to
    /// its ring index.
    fn transform_to_end(&self, cloud: &mut PointCloud3D, imu: &ImuSweepState) {
        for p in &mut cloud.points {
            let mut projected = self.project_point_to_end(p, imu);
            projected.intensity = projected.ring() as f32;
            *p = projected;
        }
    }

    /// Select corner residual terms, rebuilding the cached edge pairs when
    /// asked to.
    fn collect_corner_terms(&mut self, sharp: &PointCloud3D, rebuild: bool, uniform: bool) {
        let max_sq = self.config.corner_sq_dist_threshold;
        for (i, p) in sharp.iter().enumerate() {
            let sel = self.transform_to_start(p);
            if rebuild {
                self.corner_pairs[i] =
                    correspondence::find_corner_pair(&self.last_corner_index, &sel, max_sq);
            }
            let (first, second) = self.corner_pairs[i];
            if second < 0 {
                continue;
            }
            let cloud = self.last_corner_index.points();
            let a = cloud[first as usize];
            let b = cloud[second as usize];
            let Some((normal, distance)) = correspondence::corner_residual(&sel, &a, &b) else {
                continue;
            };
            if distance == 0.0 {
                continue;
            }
            let weight = correspondence::residual_weight(distance, uniform);
            if weight > WEIGHT_FLOOR {
                self.terms.push(ResidualTerm {
                    point: *p,
                    normal,
                    distance,
                    weight,
                });
            }
        }
    }

    /// Select surface residual terms, rebuilding the cached plane tripods
    /// when asked to.
    fn collect_surface_terms(&mut self, flat: &PointCloud3D, rebuild: bool, uniform: bool) {
        let max_sq = self.config.surf_sq_dist_threshold;
        for (i, p) in flat.iter().enumerate() {
            let sel = self.transform_to_start(p);
            if rebuild {
                self.surface_triples[i] =
                    correspondence::find_surface_triple(&self.last_surface_index, &sel, max_sq);
            }
            let (first, same, other) = self.surface_triples[i];
            if same < 0 || other < 0 {
                continue;
            }
            let cloud = self.last_surface_index.points();
            let a = cloud[first as usize];
            let b = cloud[same as usize];
            let c = cloud[other as usize];
            let Some((normal, distance)) = correspondence::surface_residual(&sel, &a, &b, &c)
            else {
                continue;
            };
            if distance == 0.0 {
                continue;
            }
            let weight = correspondence::residual_weight(distance, uniform);
            if weight > WEIGHT_FLOOR {
                self.terms.push(ResidualTerm {
                    point: *p,
                    normal,
                    distance,
                    weight,
                });
            }
        }
    }

    /// Compose the sweep delta into the accumulated world pose.
    fn integrate(&mut self, imu: &ImuSweepState) {
        let t = self.transform;
        let (rx, ry, rz) = math::accumulate_rotation(
            (self.transform_sum.rx, self.transform_sum.ry, self.transform_sum.rz),
            (-t.rx, -t.ry, -t.rz),
        );

        let v = Vector3::new(
            t.tx - imu.shift_from_start[0],
            t.ty - imu.shift_from_start[1],
            t.tz - imu.shift_from_start[2],
        );
        let v = math::rotate_zxy(v, rz, rx, ry);
        let tx = self.transform_sum.tx - v.x;
        let ty = self.transform_sum.ty - v.y;
        let tz = self.transform_sum.tz - v.z;

        let (rx, ry, rz) = math::plugin_imu_rotation(
            (rx, ry, rz),
            (imu.pitch_start, imu.yaw_start, imu.roll_start),
            (imu.pitch_end, imu.yaw_end, imu.roll_end),
        );

        self.transform_sum = Pose6D {
            rx,
            ry,
            rz,
            tx,
            ty,
            tz,
        };
    }

    /// Replace the reference clouds with the current sweep's relaxed
    /// features, projected to the sweep end, and rebuild both indices.
    fn adopt_reference(&mut self, sweep: SweepFeatures, imu: &ImuSweepState) {
        let SweepFeatures {
            corner_less_sharp: mut less_sharp,
            surface_less_flat: mut less_flat,
            ..
        } = sweep;
        if less_sharp.is_empty() || less_flat.is_empty() {
            return;
        }
        self.transform_to_end(&mut less_sharp, imu);
        self.transform_to_end(&mut less_flat, imu);
        self.last_corner_index = CloudIndex::build(less_sharp);
        self.last_surface_index = CloudIndex::build(less_flat);
    }
}
