//! Pose estimation layer.
//!
//! # Contents
//!
//! - [`odometry`]: frame-to-frame laser odometry (feature correspondences,
//!   damped Gauss-Newton solver, motion undistortion, pose accumulation)

pub mod odometry;
