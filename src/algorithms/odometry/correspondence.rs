//! Feature correspondence search and residual geometry.
//!
//! Corner features pair with an edge line through two reference points on
//! neighboring rings; surface features pair with a plane through three
//! reference points spanning two rings. Reference clouds are ordered ring
//! by ring, which bounds the ring walk around a nearest neighbor.

use crate::core::kdtree::CloudIndex;
use crate::core::types::Point3D;
use nalgebra::Vector3;

/// Rings on either side of the nearest neighbor searched for companions.
const RING_SEARCH_SPAN: i32 = 2;

/// One selected residual: the original (distorted) feature point, the unit
/// residual gradient at the undistorted position, the residual value and
/// its robust weight.
#[derive(Debug, Clone)]
pub(crate) struct ResidualTerm {
    pub point: Point3D,
    pub normal: Vector3<f64>,
    pub distance: f64,
    pub weight: f64,
}

/// Indices into the reference corner cloud forming an edge line, -1 when
/// unmatched.
pub(crate) type CornerPair = (i32, i32);

/// Indices into the reference surface cloud forming a plane tripod, -1 when
/// unmatched.
pub(crate) type SurfaceTriple = (i32, i32, i32);

/// Find the edge-line pair for an undistorted corner feature.
///
/// The first index is the nearest reference point; the second is the
/// closest reference point on a different ring within two rings of it.
pub(crate) fn find_corner_pair(index: &CloudIndex, query: &Point3D, max_sq_dist: f32) -> CornerPair {
    let nearest = index.nearest_k(query, 1);
    let Some(&(closest, sq_dist)) = nearest.first() else {
        return (-1, -1);
    };
    if sq_dist >= max_sq_dist {
        return (-1, -1);
    }

    let cloud = index.points();
    let closest_ring = cloud[closest].ring();
    let mut best_sq = max_sq_dist;
    let mut second: i32 = -1;

    for j in (closest + 1)..cloud.len() {
        let p = &cloud[j];
        if p.ring() > closest_ring + RING_SEARCH_SPAN {
            break;
        }
        if p.ring() > closest_ring {
            let sq = p.squared_distance(query);
            if sq < best_sq {
                best_sq = sq;
                second = j as i32;
            }
        }
    }
    for j in (0..closest).rev() {
        let p = &cloud[j];
        if p.ring() < closest_ring - RING_SEARCH_SPAN {
            break;
        }
        if p.ring() < closest_ring {
            let sq = p.squared_distance(query);
            if sq < best_sq {
                best_sq = sq;
                second = j as i32;
            }
        }
    }

    (closest as i32, second)
}

/// Find the plane tripod for an undistorted surface feature.
///
/// The first index is the nearest reference point; the second shares its
/// ring, the third sits on a different ring, both minimizing distance to
/// the query within two rings.
pub(crate) fn find_surface_triple(
    index: &CloudIndex,
    query: &Point3D,
    max_sq_dist: f32,
) -> SurfaceTriple {
    let nearest = index.nearest_k(query, 1);
    let Some(&(closest, sq_dist)) = nearest.first() else {
        return (-1, -1, -1);
    };
    if sq_dist >= max_sq_dist {
        return (-1, -1, -1);
    }

    let cloud = index.points();
    let closest_ring = cloud[closest].ring();
    let mut best_same = max_sq_dist;
    let mut best_other = max_sq_dist;
    let mut same: i32 = -1;
    let mut other: i32 = -1;

    for j in (closest + 1)..cloud.len() {
        let p = &cloud[j];
        if p.ring() > closest_ring + RING_SEARCH_SPAN {
            break;
        }
        let sq = p.squared_distance(query);
        if p.ring() <= closest_ring {
            if sq < best_same {
                best_same = sq;
                same = j as i32;
            }
        } else if sq < best_other {
            best_other = sq;
            other = j as i32;
        }
    }
    for j in (0..closest).rev() {
        let p = &cloud[j];
        if p.ring() < closest_ring - RING_SEARCH_SPAN {
            break;
        }
        let sq = p.squared_distance(query);
        if p.ring() >= closest_ring {
            if sq < best_same {
                best_same = sq;
                same = j as i32;
            }
        } else if sq < best_other {
            best_other = sq;
            other = j as i32;
        }
    }

    (closest as i32, same, other)
}

#[inline]
fn to_vector(p: &Point3D) -> Vector3<f64> {
    Vector3::new(p.x as f64, p.y as f64, p.z as f64)
}

/// Distance from `query` to the infinite line through `a` and `b`, with the
/// unit residual gradient at `query`. `None` when the line degenerates.
pub(crate) fn corner_residual(
    query: &Point3D,
    a: &Point3D,
    b: &Point3D,
) -> Option<(Vector3<f64>, f64)> {
    let p0 = to_vector(query);
    let p1 = to_vector(a);
    let p2 = to_vector(b);

    let cross = (p0 - p1).cross(&(p0 - p2));
    let area = cross.norm();
    let edge = p1 - p2;
    let base = edge.norm();
    if base < 1e-9 || area < 1e-12 {
        return None;
    }

    let distance = area / base;
    let normal = edge.cross(&cross) / (area * base);
    Some((normal, distance))
}

/// Signed distance from `query` to the plane through `a`, `b` and `c`, with
/// the plane's unit normal. `None` when the tripod is collinear.
pub(crate) fn surface_residual(
    query: &Point3D,
    a: &Point3D,
    b: &Point3D,
    c: &Point3D,
) -> Option<(Vector3<f64>, f64)> {
    let p0 = to_vector(query);
    let pa = to_vector(a);
    let pb = to_vector(b);
    let pc = to_vector(c);

    let normal = (pb - pa).cross(&(pc - pa));
    let norm = normal.norm();
    if norm < 1e-9 {
        return None;
    }
    let normal = normal / norm;
    let distance = normal.dot(&(p0 - pa));
    Some((normal, distance))
}

/// Robust weight for a residual: uniform during the early iterations,
/// distance-penalized afterwards.
#[inline]
pub(crate) fn residual_weight(distance: f64, uniform: bool) -> f64 {
    if uniform {
        1.0
    } else {
        1.0 - 1.8 * distance.abs()
    }
}
