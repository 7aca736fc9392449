//! Core foundation layer.
//!
//! This is the bottom layer of the odometry stack with no internal
//! dependencies. All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Core data types (points, clouds, poses, sweep features)
//! - [`math`]: Rotation and angle primitives in the crate's Euler convention
//! - [`kdtree`]: Static nearest-neighbor index over a point cloud snapshot

pub mod kdtree;
pub mod math;
pub mod types;
