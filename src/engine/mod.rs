//! Orchestration layer.
//!
//! # Contents
//!
//! - [`sync`]: time-alignment of the six per-sweep inputs arriving as
//!   separate messages
//! - [`pipeline`]: registration and odometry glued into one sweep-in,
//!   pose-out stage

pub mod pipeline;
pub mod sync;
