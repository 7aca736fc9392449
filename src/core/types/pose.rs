//! 6-DoF rigid transform type.

use crate::core::math;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid-body transform as (rx, ry, rz, tx, ty, tz).
///
/// Rotation is applied in the Z-X-Y Euler convention (about Z by `rz`, then
/// X by `rx`, then Y by `ry`), followed by translation. Used both for the
/// per-sweep motion delta and for the accumulated world pose.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose6D {
    /// Rotation about X in radians
    pub rx: f64,
    /// Rotation about Y in radians
    pub ry: f64,
    /// Rotation about Z in radians
    pub rz: f64,
    /// Translation along X in meters
    pub tx: f64,
    /// Translation along Y in meters
    pub ty: f64,
    /// Translation along Z in meters
    pub tz: f64,
}

impl Pose6D {
    /// Identity transform.
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Rotation part as a matrix.
    #[inline]
    pub fn rotation(&self) -> Matrix3<f64> {
        math::euler_zxy(self.rx, self.ry, self.rz)
    }

    /// Translation part as a vector.
    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        Vector3::new(self.tx, self.ty, self.tz)
    }

    /// Apply the transform to a point: rotate Z-X-Y, then translate.
    #[inline]
    pub fn transform_point(&self, v: Vector3<f64>) -> Vector3<f64> {
        self.rotation() * v + self.translation()
    }

    /// Replace any non-finite component with zero.
    pub fn zero_non_finite(&mut self) {
        for c in [
            &mut self.rx,
            &mut self.ry,
            &mut self.rz,
            &mut self.tx,
            &mut self.ty,
            &mut self.tz,
        ] {
            if !c.is_finite() {
                *c = 0.0;
            }
        }
    }

    /// Largest absolute rotation component in radians.
    #[inline]
    pub fn max_abs_rotation(&self) -> f64 {
        self.rx.abs().max(self.ry.abs()).max(self.rz.abs())
    }

    /// Largest absolute translation component in meters.
    #[inline]
    pub fn max_abs_translation(&self) -> f64 {
        self.tx.abs().max(self.ty.abs()).max(self.tz.abs())
    }
}
