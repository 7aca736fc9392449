//! Rotation and angle primitives for 6-DoF lidar pose arithmetic.
//!
//! All pose math is `f64`. Rotations follow the Z-X-Y Euler convention used
//! throughout the crate: a rotation (rx, ry, rz) applied to a point rotates
//! about Z by `rz` first, then about X by `rx`, then about Y by `ry`.

use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

/// Normalize angle to (-π, π].
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Rotation about the X axis.
#[inline]
pub fn rot_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, c, -s, //
        0.0, s, c,
    )
}

/// Rotation about the Y axis.
#[inline]
pub fn rot_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c, 0.0, s, //
        0.0, 1.0, 0.0, //
        -s, 0.0, c,
    )
}

/// Rotation about the Z axis.
#[inline]
pub fn rot_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        c, -s, 0.0, //
        s, c, 0.0, //
        0.0, 0.0, 1.0,
    )
}

/// Rotation matrix for Euler angles (rx, ry, rz) in the Z-X-Y convention.
#[inline]
pub fn euler_zxy(rx: f64, ry: f64, rz: f64) -> Matrix3<f64> {
    rot_y(ry) * rot_x(rx) * rot_z(rz)
}

/// Extract (rx, ry, rz) from a Z-X-Y rotation matrix.
///
/// Inverse of [`euler_zxy`] for |rx| < π/2.
pub fn euler_angles_zxy(m: &Matrix3<f64>) -> (f64, f64, f64) {
    let rx = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
    let ry = m[(0, 2)].atan2(m[(2, 2)]);
    let rz = m[(1, 0)].atan2(m[(1, 1)]);
    (rx, ry, rz)
}

/// Rotate `v` about Z by `ez`, then about X by `ex`, then about Y by `ey`.
#[inline]
pub fn rotate_zxy(v: Vector3<f64>, ez: f64, ex: f64, ey: f64) -> Vector3<f64> {
    rot_y(ey) * (rot_x(ex) * (rot_z(ez) * v))
}

/// Rotate `v` about Y by `ey`, then about X by `ex`, then about Z by `ez`.
///
/// `rotate_yxz(_, -ey, -ex, -ez)` undoes `rotate_zxy(_, ez, ex, ey)`.
#[inline]
pub fn rotate_yxz(v: Vector3<f64>, ey: f64, ex: f64, ez: f64) -> Vector3<f64> {
    rot_z(ez) * (rot_x(ex) * (rot_y(ey) * v))
}

/// Compose an accumulated Z-X-Y rotation with an incremental one.
///
/// Returns the Euler angles of `R(acc) * R(inc)`, each triple given and
/// returned as (rx, ry, rz).
pub fn accumulate_rotation(acc: (f64, f64, f64), inc: (f64, f64, f64)) -> (f64, f64, f64) {
    let m = euler_zxy(acc.0, acc.1, acc.2) * euler_zxy(inc.0, inc.1, inc.2);
    euler_angles_zxy(&m)
}

/// Re-anchor an accumulated rotation between two IMU orientations.
///
/// Returns the Euler angles of `R(acc) * R(imu_start)ᵀ * R(imu_end)`: the
/// lidar-estimated rotation with the IMU-measured orientation change over
/// the sweep substituted for the corresponding lidar estimate. With both
/// IMU orientations at identity the result equals `acc`.
pub fn plugin_imu_rotation(
    acc: (f64, f64, f64),
    imu_start: (f64, f64, f64),
    imu_end: (f64, f64, f64),
) -> (f64, f64, f64) {
    let m = euler_zxy(acc.0, acc.1, acc.2)
        * euler_zxy(imu_start.0, imu_start.1, imu_start.2).transpose()
        * euler_zxy(imu_end.0, imu_end.1, imu_end.2);
    euler_angles_zxy(&m)
}
