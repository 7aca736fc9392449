//! Curvature ranking and feature extraction over per-ring scans.

use super::config::RegistrationConfig;
use super::voxel::VoxelGrid;
use crate::core::types::{IndexRange, Point3D, PointCloud3D};
use std::cmp::Ordering;

/// Neighbors on each side contributing to a point's curvature.
pub(crate) const CURVATURE_REGION: usize = 5;

/// Equal index-count segments each ring is split into for feature ranking.
pub(crate) const FEATURE_REGIONS: usize = 6;

/// Squared coordinate jump between consecutive points that stops the
/// de-clustering mask from spreading.
const MASK_BREAK_SQ_DIST: f32 = 0.05;

/// The four feature classes extracted from one sweep.
#[derive(Debug, Default)]
pub(crate) struct FeatureClouds {
    pub corner_sharp: PointCloud3D,
    pub corner_less_sharp: PointCloud3D,
    pub surface_flat: PointCloud3D,
    pub surface_less_flat: PointCloud3D,
}

/// Scratch buffers reused across sweeps.
#[derive(Debug, Default)]
pub(crate) struct ExtractionBuffers {
    curvature: Vec<f32>,
    picked: Vec<bool>,
    is_corner: Vec<bool>,
    region_order: Vec<usize>,
    less_flat_scan: PointCloud3D,
}

/// Extract the feature partition from a concatenated sweep cloud.
///
/// `ranges` gives the per-ring spans of `cloud`; rings with too few points
/// to form a full curvature neighborhood are skipped entirely.
pub(crate) fn extract_features(
    config: &RegistrationConfig,
    voxel: &VoxelGrid,
    cloud: &PointCloud3D,
    ranges: &[IndexRange],
    bufs: &mut ExtractionBuffers,
) -> FeatureClouds {
    let n = cloud.len();
    bufs.curvature.clear();
    bufs.curvature.resize(n, 0.0);
    bufs.picked.clear();
    bufs.picked.resize(n, false);
    bufs.is_corner.clear();
    bufs.is_corner.resize(n, false);

    let mut out = FeatureClouds::default();

    for range in ranges {
        if range.len() <= 2 * CURVATURE_REGION + 1 {
            continue;
        }
        let (start, end) = (range.start, range.end);

        mark_unreliable(cloud, start, end, &mut bufs.picked);
        compute_curvature(cloud, start, end, &mut bufs.curvature);

        bufs.less_flat_scan.clear();
        let first = start + CURVATURE_REGION;
        let last = end - 1 - CURVATURE_REGION;

        for j in 0..FEATURE_REGIONS {
            let sp = (first * (FEATURE_REGIONS - j) + last * j) / FEATURE_REGIONS;
            let ep = (first * (FEATURE_REGIONS - 1 - j) + last * (j + 1)) / FEATURE_REGIONS - 1;
            if ep <= sp {
                continue;
            }

            bufs.region_order.clear();
            bufs.region_order.extend(sp..=ep);
            let curvature = &bufs.curvature;
            bufs.region_order
                .sort_by(|&a, &b| curvature[a].partial_cmp(&curvature[b]).unwrap_or(Ordering::Equal));

            // Corner pass, strongest curvature first.
            let mut corners = 0;
            for &idx in bufs.region_order.iter().rev() {
                if corners >= config.max_corner_less_sharp {
                    break;
                }
                if bufs.picked[idx] || bufs.curvature[idx] <= config.edge_threshold {
                    continue;
                }
                corners += 1;
                bufs.is_corner[idx] = true;
                if corners <= config.max_corner_sharp {
                    out.corner_sharp.push(cloud[idx]);
                }
                out.corner_less_sharp.push(cloud[idx]);
                mark_as_picked(cloud, idx, &mut bufs.picked);
            }

            // Surface pass, weakest curvature first.
            let mut flats = 0;
            for &idx in bufs.region_order.iter() {
                if flats >= config.max_surface_flat {
                    break;
                }
                if bufs.picked[idx] || bufs.curvature[idx] >= config.surface_threshold {
                    continue;
                }
                flats += 1;
                out.surface_flat.push(cloud[idx]);
                mark_as_picked(cloud, idx, &mut bufs.picked);
            }

            // Everything that is not a corner feeds the less-flat cloud.
            for idx in sp..=ep {
                if !bufs.is_corner[idx] {
                    bufs.less_flat_scan.push(cloud[idx]);
                }
            }
        }

        out.surface_less_flat
            .extend_from_cloud(&voxel.filter(&bufs.less_flat_scan));
    }

    out
}

/// Curvature of each interior point of one ring:
/// `|sum of the 10 neighbor offsets|^2` over five points on each side.
fn compute_curvature(cloud: &PointCloud3D, start: usize, end: usize, curvature: &mut [f32]) {
    for i in (start + CURVATURE_REGION)..(end - CURVATURE_REGION) {
        let p = &cloud[i];
        let weight = 2.0 * CURVATURE_REGION as f32;
        let mut dx = -weight * p.x;
        let mut dy = -weight * p.y;
        let mut dz = -weight * p.z;
        for k in 1..=CURVATURE_REGION {
            dx += cloud[i + k].x + cloud[i - k].x;
            dy += cloud[i + k].y + cloud[i - k].y;
            dz += cloud[i + k].z + cloud[i - k].z;
        }
        curvature[i] = dx * dx + dy * dy + dz * dz;
    }
}

/// Squared distance between `a` and `b` scaled by `scale`.
#[inline]
fn scaled_squared_distance(a: &Point3D, b: &Point3D, scale: f32) -> f32 {
    let dx = a.x - scale * b.x;
    let dy = a.y - scale * b.y;
    let dz = a.z - scale * b.z;
    dx * dx + dy * dy + dz * dz
}

/// Mask points unusable for feature extraction: returns hidden behind an
/// occluding edge, and returns on surfaces nearly parallel to the beam.
fn mark_unreliable(cloud: &PointCloud3D, start: usize, end: usize, picked: &mut [bool]) {
    for i in (start + CURVATURE_REGION)..(end - CURVATURE_REGION - 1) {
        let prev = &cloud[i - 1];
        let point = &cloud[i];
        let next = &cloud[i + 1];

        let diff_next = next.squared_distance(point);
        if diff_next > 0.1 {
            let depth1 = point.range();
            let depth2 = next.range();

            if depth1 > depth2 {
                let gap = scaled_squared_distance(next, point, depth2 / depth1).sqrt() / depth2;
                if gap < 0.1 {
                    // This side of the jump is occluded by the nearer one.
                    for k in (i - CURVATURE_REGION)..=i {
                        picked[k] = true;
                    }
                    continue;
                }
            } else {
                let gap = scaled_squared_distance(point, next, depth1 / depth2).sqrt() / depth1;
                if gap < 0.1 {
                    for k in (i + 1)..=(i + CURVATURE_REGION + 1) {
                        picked[k] = true;
                    }
                }
            }
        }

        let diff_prev = point.squared_distance(prev);
        let dist = point.squared_norm();
        if diff_next > 0.0002 * dist && diff_prev > 0.0002 * dist {
            picked[i] = true;
        }
    }
}

/// Mask a picked feature and its run of close neighbors on both sides.
fn mark_as_picked(cloud: &PointCloud3D, idx: usize, picked: &mut [bool]) {
    picked[idx] = true;
    for i in 1..=CURVATURE_REGION {
        if cloud[idx + i].squared_distance(&cloud[idx + i - 1]) > MASK_BREAK_SQ_DIST {
            break;
        }
        picked[idx + i] = true;
    }
    for i in 1..=CURVATURE_REGION {
        if cloud[idx - i].squared_distance(&cloud[idx - i + 1]) > MASK_BREAK_SQ_DIST {
            break;
        }
        picked[idx - i] = true;
    }
}
