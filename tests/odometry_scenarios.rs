//! End-to-end scenarios for sweep registration and laser odometry.
//!
//! Synthetic sweeps are ray-cast against a rectangular room so that the
//! full pipeline (ingest remap, ring partitioning, capture-time recovery,
//! feature extraction, correspondence search, optimization, integration)
//! is exercised together.

use gati_odometry::{
    ImuSweepState, LaserOdometry, OdometryConfig, OdometryPipeline, PipelineConfig, Point3D,
    PointCloud3D, Pose6D, RegistrationConfig, RingTable, SweepFeatures, SweepRegistration,
    SweepSynchronizer, SynchronizerConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

// ============================================================================
// Synthetic sweep builders
// ============================================================================

/// Azimuth steps per ring in the synthetic room sweeps.
const AZIMUTH_STEPS: usize = 1024;

/// Vertical beam angle of a VLP-16 ring, in degrees.
fn vlp16_ring_angle_deg(ring: usize) -> f64 {
    if ring <= 5 {
        7.0 - ring as f64
    } else {
        (29.0 - ring as f64) / 3.0 - 6.0
    }
}

/// Horizontal range from `pos` along polar azimuth `theta` to the walls of
/// a rectangular room (raw frame: x in [-4, 6], y in [-3, 5]).
fn room_range(pos: [f64; 2], theta: f64) -> f64 {
    let (sin_t, cos_t) = theta.sin_cos();
    let mut best = f64::MAX;
    if cos_t > 1e-9 {
        best = best.min((6.0 - pos[0]) / cos_t);
    }
    if cos_t < -1e-9 {
        best = best.min((-4.0 - pos[0]) / cos_t);
    }
    if sin_t > 1e-9 {
        best = best.min((5.0 - pos[1]) / sin_t);
    }
    if sin_t < -1e-9 {
        best = best.min((-3.0 - pos[1]) / sin_t);
    }
    best
}

/// One full 16-ring sweep of the room in raw sensor coordinates.
///
/// `translation` is the raw-frame sensor displacement over the sweep and
/// `yaw` the raw-frame heading change; both are interpolated linearly over
/// the sweep so the cloud carries a physically consistent motion
/// distortion. `jitter` adds deterministic sub-millimeter range noise.
fn room_sweep(translation: [f64; 2], yaw: f64, jitter: Option<&mut StdRng>) -> PointCloud3D {
    let mut noise: Vec<f64> = vec![0.0; AZIMUTH_STEPS * 16];
    if let Some(rng) = jitter {
        for n in noise.iter_mut() {
            *n = rng.gen_range(-5e-4..5e-4);
        }
    }

    let mut cloud = PointCloud3D::with_capacity(AZIMUTH_STEPS * 16);
    for i in 0..AZIMUTH_STEPS {
        let fraction = i as f64 / (AZIMUTH_STEPS - 1) as f64;
        // The recovered orientation increases over the sweep, so the polar
        // azimuth of consecutive firings decreases.
        let theta_sensor = -2.0 * PI * i as f64 / AZIMUTH_STEPS as f64;
        let theta_world = theta_sensor + fraction * yaw;
        let pos = [fraction * translation[0], fraction * translation[1]];

        for ring in 0..16 {
            let range =
                room_range(pos, theta_world) + noise[i * 16 + ring];
            let alpha = vlp16_ring_angle_deg(ring).to_radians();
            let (sin_t, cos_t) = theta_sensor.sin_cos();
            cloud.push(Point3D::from_xyz(
                (range * cos_t) as f32,
                (range * sin_t) as f32,
                (range * alpha.tan()) as f32,
            ));
        }
    }
    cloud
}

fn room_registration_config() -> RegistrationConfig {
    RegistrationConfig {
        system_delay: 0,
        edge_threshold: 0.05,
        surface_threshold: 0.05,
        ..RegistrationConfig::default()
    }
}

fn room_pipeline() -> OdometryPipeline {
    let config = PipelineConfig {
        registration: room_registration_config(),
        odometry: OdometryConfig::default(),
    };
    OdometryPipeline::new(config, RingTable::vlp16()).unwrap()
}

// ============================================================================
// S1: single beam on a straight line
// ============================================================================

/// 100 points on a straight line at 5 m, equally spaced, one beam.
fn straight_line_sweep() -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    for i in 0..100 {
        let y = 2.0 - 4.0 * (i as f32 / 99.0);
        cloud.push(Point3D::from_xyz(5.0, y, 0.0));
    }
    cloud
}

#[test]
fn s1_straight_line_has_no_corners_and_zero_motion() {
    let mut registration = SweepRegistration::new(
        RegistrationConfig {
            system_delay: 0,
            ..RegistrationConfig::default()
        },
        RingTable::linear(-15.0, 15.0, 1).unwrap(),
    )
    .unwrap();
    let mut odometry = LaserOdometry::new(OdometryConfig::default()).unwrap();

    let first = registration
        .process(&straight_line_sweep(), 0.0, None)
        .expect("sweep must register");

    assert!(first.features.corner_sharp.is_empty());
    assert!(first.features.corner_less_sharp.is_empty());
    assert!(!first.features.surface_less_flat.is_empty());
    // The less-flat cloud is a downsampled copy of the line.
    assert!(first.features.surface_less_flat.len() < first.features.full_resolution.len());
    for p in first.features.surface_less_flat.iter() {
        assert!((p.z - 5.0).abs() < 0.01, "downsampled point left the line");
    }

    odometry.process(first.features);
    let second = registration
        .process(&straight_line_sweep(), 0.1, None)
        .unwrap();
    let result = odometry.process(second.features);

    assert_eq!(result.transform, Pose6D::identity());
    assert_eq!(result.transform_sum, Pose6D::identity());
}

// ============================================================================
// S2: pure translation between sweeps
// ============================================================================

#[test]
fn s2_translation_recovered_through_full_pipeline() {
    let mut pipe = room_pipeline();
    pipe.process(&room_sweep([0.0, 0.0], 0.0, None), 0.0, None)
        .expect("first sweep");

    // The sensor advances +0.1 m along raw x (internal z) during sweep two.
    let result = pipe
        .process(&room_sweep([0.1, 0.0], 0.0, None), 0.1, None)
        .expect("second sweep");

    assert!(
        (result.transform.tz + 0.1).abs() < 5e-3,
        "tz = {}",
        result.transform.tz
    );
    assert!(result.transform.tx.abs() < 5e-3);
    assert!(result.transform.max_abs_rotation().to_degrees() < 0.1);

    // The world pose advances by the same amount, with the opposite sign.
    assert!((result.transform_sum.tz - 0.1).abs() < 5e-3);
}

// ============================================================================
// S3: isolated corner in one beam sextant
// ============================================================================

/// Single-beam sweep with two walls meeting at point index 50.
fn corner_sweep() -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    let alpha = 1.0f64.to_radians();
    for i in 0..120 {
        let theta = (25.0 - 0.5 * i as f64).to_radians();
        let (sin_t, cos_t) = theta.sin_cos();
        // Wall A: x = 6 for theta >= 0; wall B bends away at 45 degrees.
        let range = if theta >= 0.0 {
            6.0 / cos_t
        } else {
            6.0 / (cos_t - sin_t)
        };
        cloud.push(Point3D::from_xyz(
            (range * cos_t) as f32,
            (range * sin_t) as f32,
            (range * alpha.tan()) as f32,
        ));
    }
    cloud
}

#[test]
fn s3_sharp_corner_found_at_wall_intersection() {
    let mut registration = SweepRegistration::new(
        RegistrationConfig {
            system_delay: 0,
            ..RegistrationConfig::default()
        },
        RingTable::vlp16(),
    )
    .unwrap();

    let registered = registration
        .process(&corner_sweep(), 0.0, None)
        .expect("sweep must register");
    let features = &registered.features;
    let full = &features.full_resolution;

    // A 1 degree beam maps to ring 8 of the device table.
    assert_eq!(full[0].ring(), 8);

    // Locate each sharp feature in the full-resolution cloud.
    let sharp_indices: Vec<usize> = features
        .corner_sharp
        .iter()
        .map(|s| {
            (0..full.len())
                .min_by(|&a, &b| {
                    full[a]
                        .squared_distance(s)
                        .partial_cmp(&full[b].squared_distance(s))
                        .unwrap()
                })
                .unwrap()
        })
        .collect();

    let near_bend = sharp_indices
        .iter()
        .filter(|&&idx| (idx as i64 - 50).unsigned_abs() <= 5)
        .count();
    assert_eq!(
        near_bend, 1,
        "expected exactly one sharp feature at the bend, indices: {:?}",
        sharp_indices
    );
    for p in features.corner_sharp.iter() {
        assert_eq!(p.ring(), 8);
    }
}

// ============================================================================
// S4: degenerate planar geometry
// ============================================================================

/// Distort a world point into the frame of a sensor moving by `pose`,
/// captured at phase `s`.
fn distort(world: &Point3D, pose: &Pose6D, s: f64) -> Point3D {
    let rotation = gati_odometry::math::euler_zxy(-s * pose.rx, -s * pose.ry, -s * pose.rz);
    let v = rotation.transpose() * nalgebra_vector(world);
    Point3D::new(
        (v.x + s * pose.tx) as f32,
        (v.y + s * pose.ty) as f32,
        (v.z + s * pose.tz) as f32,
        world.intensity,
    )
}

fn nalgebra_vector(p: &Point3D) -> nalgebra::Vector3<f64> {
    nalgebra::Vector3::new(p.x as f64, p.y as f64, p.z as f64)
}

/// Corner lines drawn on the floor plane, ring index advancing along each
/// line so edge pairs span rings.
fn floor_line_cloud(pose: &Pose6D) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    for ring in 0..12 {
        for (line, z) in [2.0f32, 3.0, 4.0].iter().enumerate() {
            let s = 0.5 + 0.1 * (line as f64);
            let world = Point3D::new(
                -2.5 + ring as f32 * 0.45,
                -0.5,
                *z,
                ring as f32 + (s * 0.1) as f32,
            );
            cloud.push(distort(&world, pose, s));
        }
    }
    cloud
}

/// A flat floor grid, one ring per depth row.
fn floor_grid_cloud(pose: &Pose6D) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    for ring in 0..12 {
        for i in 0..10 {
            let s = 0.5 + 0.4 * (i as f64 / 10.0);
            let world = Point3D::new(
                -3.0 + i as f32 * 0.667,
                -0.5,
                1.0 + ring as f32 * 0.5,
                ring as f32 + (s * 0.1) as f32,
            );
            cloud.push(distort(&world, pose, s));
        }
    }
    cloud
}

fn planar_sweep(pose: &Pose6D, time: f64) -> SweepFeatures {
    let corners = floor_line_cloud(pose);
    let surfaces = floor_grid_cloud(pose);
    let mut full = PointCloud3D::new();
    full.extend_from_cloud(&corners);
    full.extend_from_cloud(&surfaces);
    SweepFeatures {
        corner_sharp: corners.clone(),
        corner_less_sharp: corners,
        surface_flat: surfaces.clone(),
        surface_less_flat: surfaces,
        full_resolution: full,
        imu: ImuSweepState::default(),
        time,
    }
}

#[test]
fn s4_planar_geometry_activates_degeneracy_guard() {
    let mut odometry = LaserOdometry::new(OdometryConfig::default()).unwrap();
    odometry.process(planar_sweep(&Pose6D::identity(), 0.0));

    // The sensor sinks toward the floor; sliding along the floor plane is
    // unobservable in this scene.
    let truth = Pose6D {
        ty: -0.05,
        ..Pose6D::identity()
    };
    let result = odometry.process(planar_sweep(&truth, 0.1));

    assert!(result.degenerate, "the eigenvalue guard must activate");
    assert!(
        (result.transform.ty + 0.05).abs() < 2e-3,
        "ty = {}",
        result.transform.ty
    );
    // The unobservable in-plane translation stays frozen at the warm start.
    assert!(result.transform.tx.abs() < 1e-4, "tx = {}", result.transform.tx);
}

// ============================================================================
// S5: pure rotation between sweeps
// ============================================================================

#[test]
fn s5_yaw_recovered_through_full_pipeline() {
    let mut pipe = room_pipeline();
    pipe.process(&room_sweep([0.0, 0.0], 0.0, None), 0.0, None)
        .expect("first sweep");

    // The sensor yaws +5 degrees about raw z (internal y) over sweep two.
    let yaw = 5.0f64.to_radians();
    let result = pipe
        .process(&room_sweep([0.0, 0.0], yaw, None), 0.1, None)
        .expect("second sweep");

    assert!(
        (result.transform.ry.to_degrees() + 5.0).abs() < 0.2,
        "ry = {} deg",
        result.transform.ry.to_degrees()
    );
    assert!(result.transform.rx.to_degrees().abs() < 0.1);
    assert!(result.transform.rz.to_degrees().abs() < 0.1);
    assert!(result.transform.max_abs_translation() < 5e-3);
}

// ============================================================================
// S6: duplicate timestamps at the input boundary
// ============================================================================

#[test]
fn s6_duplicate_timestamp_dropped_by_synchronizer() {
    let mut sync = SweepSynchronizer::new(SynchronizerConfig::default());
    let cloud = straight_line_sweep;

    sync.offer_corner_sharp(cloud(), 0.1);
    sync.offer_corner_less_sharp(cloud(), 0.1);
    sync.offer_surface_flat(cloud(), 0.1);
    sync.offer_surface_less_flat(cloud(), 0.1);
    sync.offer_full_resolution(cloud(), 0.1);
    sync.offer_imu(ImuSweepState::default(), 0.1);

    // The same sweep delivered twice: every second message is dropped.
    sync.offer_corner_sharp(cloud(), 0.1);
    assert_eq!(sync.dropped(), 1);

    assert!(sync.take_aligned().is_some());
}

// ============================================================================
// Feature invariants over a realistic sweep
// ============================================================================

#[test]
fn feature_intensity_packing_invariants() {
    let mut registration =
        SweepRegistration::new(room_registration_config(), RingTable::vlp16()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    let registered = registration
        .process(&room_sweep([0.0, 0.0], 0.0, Some(&mut rng)), 0.0, None)
        .expect("sweep must register");
    let features = &registered.features;

    let all_clouds = [
        &features.corner_sharp,
        &features.corner_less_sharp,
        &features.surface_flat,
        &features.surface_less_flat,
        &features.full_resolution,
    ];
    assert!(!features.corner_sharp.is_empty());
    assert!(!features.surface_flat.is_empty());

    for cloud in all_clouds {
        for p in cloud.iter() {
            let ring = p.ring();
            let tau = p.rel_time() as f64;
            assert!((0..16).contains(&ring), "ring out of range: {}", ring);
            assert!(
                (0.0..=0.1 + 1e-6).contains(&tau),
                "relative time out of range: {}",
                tau
            );
        }
    }
}

#[test]
fn scan_ranges_tile_full_resolution_cloud() {
    let mut registration =
        SweepRegistration::new(room_registration_config(), RingTable::vlp16()).unwrap();
    let registered = registration
        .process(&room_sweep([0.0, 0.0], 0.0, None), 0.0, None)
        .unwrap();

    let full = &registered.features.full_resolution;
    let ranges = &registered.scan_ranges;

    assert_eq!(ranges.first().unwrap().start, 0);
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "gap or overlap between rings");
    }
    assert_eq!(ranges.last().unwrap().end, full.len());

    for (ring, range) in ranges.iter().enumerate() {
        for i in range.start..range.end {
            assert_eq!(full[i].ring() as usize, ring);
        }
    }
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn identical_input_sequence_is_bit_deterministic() {
    let sweeps: Vec<PointCloud3D> = {
        let mut rng = StdRng::seed_from_u64(42);
        vec![
            room_sweep([0.0, 0.0], 0.0, Some(&mut rng)),
            room_sweep([0.05, 0.0], 0.0, Some(&mut rng)),
            room_sweep([0.05, 0.03], 0.01, Some(&mut rng)),
        ]
    };

    let run = |sweeps: &[PointCloud3D]| {
        let mut pipe = room_pipeline();
        let mut results = Vec::new();
        for (k, sweep) in sweeps.iter().enumerate() {
            results.push(pipe.process(sweep, k as f64 * 0.1, None));
        }
        let corners = pipe.odometry().last_corner_cloud().clone();
        let surfaces = pipe.odometry().last_surface_cloud().clone();
        (results, corners, surfaces)
    };

    let (results_a, corners_a, surfaces_a) = run(&sweeps);
    let (results_b, corners_b, surfaces_b) = run(&sweeps);

    assert_eq!(results_a, results_b);
    assert_eq!(corners_a, corners_b);
    assert_eq!(surfaces_a, surfaces_b);
}

// ============================================================================
// Multi-sweep trajectory
// ============================================================================

#[test]
fn constant_velocity_trajectory_accumulates() {
    let mut pipe = room_pipeline();
    pipe.process(&room_sweep([0.0, 0.0], 0.0, None), 0.0, None)
        .expect("first sweep");

    // Three further sweeps, each advancing +0.05 m along raw x from where
    // the previous one ended.
    let mut expected = 0.0;
    for k in 1..=3 {
        let start = [0.05 * (k - 1) as f64, 0.0];
        let sweep = room_sweep_from(start, [0.05, 0.0], 0.0);
        let result = pipe
            .process(&sweep, k as f64 * 0.1, None)
            .expect("sweep must process");
        expected += 0.05;
        assert!(
            (result.transform_sum.tz - expected).abs() < 0.01,
            "after sweep {}: tz = {}, expected {}",
            k,
            result.transform_sum.tz,
            expected
        );
    }
}

/// Like [`room_sweep`] but starting from an arbitrary sensor position.
fn room_sweep_from(start: [f64; 2], translation: [f64; 2], yaw: f64) -> PointCloud3D {
    let mut cloud = PointCloud3D::with_capacity(AZIMUTH_STEPS * 16);
    for i in 0..AZIMUTH_STEPS {
        let fraction = i as f64 / (AZIMUTH_STEPS - 1) as f64;
        let theta_sensor = -2.0 * PI * i as f64 / AZIMUTH_STEPS as f64;
        let theta_world = theta_sensor + fraction * yaw;
        let pos = [
            start[0] + fraction * translation[0],
            start[1] + fraction * translation[1],
        ];
        for ring in 0..16 {
            let range = room_range(pos, theta_world);
            let alpha = vlp16_ring_angle_deg(ring).to_radians();
            let (sin_t, cos_t) = theta_sensor.sin_cos();
            cloud.push(Point3D::from_xyz(
                (range * cos_t) as f32,
                (range * sin_t) as f32,
                (range * alpha.tan()) as f32,
            ));
        }
    }
    cloud
}
