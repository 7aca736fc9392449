//! Normal-equation assembly, damped solve and degeneracy projection.
//!
//! Each selected residual contributes one row to the linearized system.
//! The undistorted feature position is
//! `p' = Ry(-ry) * Rx(-rx) * Rz(-rz) * (p - t)`, so the row Jacobian chains
//! the residual gradient through the rotation-matrix derivatives. Rows are
//! accumulated in input order to keep the reduction deterministic.

use super::correspondence::ResidualTerm;
use crate::core::math;
use crate::core::types::Pose6D;
use nalgebra::{Cholesky, Matrix3, Matrix6, SymmetricEigen, Vector3, Vector6};

/// Accumulated normal equations `H * delta = g`.
#[derive(Debug)]
pub(crate) struct NormalEquations {
    pub h: Matrix6<f64>,
    pub g: Vector6<f64>,
    pub rows: usize,
}

impl NormalEquations {
    pub fn new() -> Self {
        Self {
            h: Matrix6::zeros(),
            g: Vector6::zeros(),
            rows: 0,
        }
    }
}

/// Derivative of [`math::rot_x`] with respect to its angle.
#[inline]
fn rot_x_deriv(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        0.0, 0.0, 0.0, //
        0.0, -s, -c, //
        0.0, c, -s,
    )
}

/// Derivative of [`math::rot_y`] with respect to its angle.
#[inline]
fn rot_y_deriv(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        -s, 0.0, c, //
        0.0, 0.0, 0.0, //
        -c, 0.0, -s,
    )
}

/// Derivative of [`math::rot_z`] with respect to its angle.
#[inline]
fn rot_z_deriv(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(
        -s, -c, 0.0, //
        c, -s, 0.0, //
        0.0, 0.0, 0.0,
    )
}

/// Fold all residual terms into the normal equations at the current
/// transform estimate.
pub(crate) fn accumulate(terms: &[ResidualTerm], transform: &Pose6D, eq: &mut NormalEquations) {
    let rz_m = math::rot_z(-transform.rz);
    let rx_m = math::rot_x(-transform.rx);
    let ry_m = math::rot_y(-transform.ry);

    // d/d(angle) of each factor of Ry(-ry) * Rx(-rx) * Rz(-rz); the inner
    // minus signs come from the negated angles.
    let d_rx = ry_m * (-rot_x_deriv(-transform.rx)) * rz_m;
    let d_ry = (-rot_y_deriv(-transform.ry)) * rx_m * rz_m;
    let d_rz = ry_m * rx_m * (-rot_z_deriv(-transform.rz));
    let rotation = ry_m * rx_m * rz_m;
    let translation = transform.translation();

    for term in terms {
        let p = Vector3::new(
            term.point.x as f64,
            term.point.y as f64,
            term.point.z as f64,
        );
        let q = p - translation;
        let n = &term.normal;
        let j_trans = -(rotation.transpose() * n);

        let row = Vector6::new(
            n.dot(&(d_rx * q)),
            n.dot(&(d_ry * q)),
            n.dot(&(d_rz * q)),
            j_trans.x,
            j_trans.y,
            j_trans.z,
        );

        let weighted = row * term.weight;
        eq.h += weighted * weighted.transpose();
        eq.g -= weighted * (term.weight * term.distance);
        eq.rows += 1;
    }
}

/// Projection of the update onto the well-conditioned eigenspace of `H`.
#[derive(Debug, Clone)]
pub(crate) struct DegeneracyGuard {
    pub degenerate: bool,
    projection: Matrix6<f64>,
}

impl DegeneracyGuard {
    /// Eigen-decompose `H` and retain only directions whose eigenvalue
    /// reaches `threshold`.
    pub fn analyze(h: &Matrix6<f64>, threshold: f64) -> Self {
        let eigen = SymmetricEigen::new(*h);
        let mut projection = Matrix6::zeros();
        let mut degenerate = false;
        for i in 0..6 {
            if eigen.eigenvalues[i] < threshold {
                degenerate = true;
                continue;
            }
            let v = eigen.eigenvectors.column(i).into_owned();
            projection += v * v.transpose();
        }
        Self {
            degenerate,
            projection,
        }
    }

    /// Constrain an update to the well-conditioned subspace.
    pub fn project(&self, delta: &Vector6<f64>) -> Vector6<f64> {
        self.projection * delta
    }
}

/// Solve the damped system `(H + lambda * I) * delta = g`.
///
/// Returns `None` when the damped matrix is not positive definite.
pub(crate) fn solve(eq: &NormalEquations, lambda: f64) -> Option<Vector6<f64>> {
    let damped = eq.h + Matrix6::identity() * lambda;
    Cholesky::new(damped).map(|chol| chol.solve(&eq.g))
}
