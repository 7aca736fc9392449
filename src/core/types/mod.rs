//! Core data types for the odometry pipeline.
//!
//! - [`Point3D`], [`PointCloud3D`]: lidar returns with the packed
//!   ring + relative-time intensity channel
//! - [`Pose6D`]: 6-DoF rigid transform in the crate's Z-X-Y convention
//! - [`IndexRange`]: per-ring span inside a concatenated sweep cloud
//! - [`ImuSweepState`]: value snapshot of the IMU over one sweep
//! - [`SweepFeatures`]: the per-sweep feature partition handed to odometry

mod point;
mod pose;
mod sweep;

pub use point::{Point3D, PointCloud3D};
pub use pose::Pose6D;
pub use sweep::{ImuSweepState, IndexRange, SweepFeatures};
