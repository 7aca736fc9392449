//! GatiOdometry - real-time lidar odometry for rotating multi-beam lidars.
//!
//! Consumes a stream of raw 3D sweeps and produces, per sweep, a set of
//! geometric feature points (sharp corners, flat surfaces and their relaxed
//! supersets), an incrementally refined 6-DoF transform describing the
//! sensor's ego-motion between consecutive sweeps, and an accumulated pose
//! in a fixed world frame.
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │          (input sync, sweep pipeline)               │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Pose estimation
//! │      (odometry: correspondences, LM solver)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sweep processing
//! │     (ring mapping, registration, voxel filter)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │            (types, math, KD-tree index)             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow
//!
//! [`SweepRegistration`] partitions a raw sweep into per-ring scans, recovers
//! each point's sweep-relative capture time, and extracts four feature
//! classes by a locally-ranked curvature measure. [`LaserOdometry`] matches
//! the features of the current sweep against the previous one using
//! point-to-line and point-to-plane residuals, runs a damped Gauss-Newton
//! loop with motion undistortion, and composes the resulting delta into the
//! accumulated world pose. [`OdometryPipeline`] glues the two stages;
//! [`SweepSynchronizer`] time-aligns feature clouds arriving as separate
//! messages.
//!
//! # References
//!
//! - Zhang, J. and Singh, S. "LOAM: Lidar Odometry and Mapping in
//!   Real-time", Robotics: Science and Systems, 2014

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sweep processing (depends on core)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 3: Pose estimation (depends on core, sensors)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: Orchestration (depends on all layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::kdtree::CloudIndex;
pub use crate::core::math;
pub use crate::core::types::{
    ImuSweepState, IndexRange, Point3D, PointCloud3D, Pose6D, SweepFeatures,
};

// Sensors
pub use crate::sensors::registration::{
    RegisteredSweep, RegistrationConfig, RegistrationError, SweepRegistration, VoxelGrid,
};
pub use crate::sensors::rings::{RingTable, RingTableError};
pub use crate::sensors::{ImuSample, ImuSampler};

// Algorithms
pub use crate::algorithms::odometry::{
    LaserOdometry, OdometryConfig, OdometryError, SweepOdometry,
};

// Engine
pub use crate::engine::pipeline::{OdometryPipeline, PipelineConfig, PipelineError};
pub use crate::engine::sync::{SweepSynchronizer, SynchronizerConfig};
