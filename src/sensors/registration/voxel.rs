//! Deterministic voxel-grid downsampling.

use crate::core::types::{Point3D, PointCloud3D};
use std::collections::BTreeMap;

/// Voxel-grid downsampling filter.
///
/// Bins points into axis-aligned cubes of `leaf_size` meters and replaces
/// each occupied voxel with the centroid of its points (the intensity
/// channel is averaged like the coordinates). Output order follows the
/// voxel coordinates, so identical input always yields identical output.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    leaf_size: f32,
}

#[derive(Default)]
struct VoxelAccumulator {
    x: f64,
    y: f64,
    z: f64,
    intensity: f64,
    count: u32,
}

impl VoxelGrid {
    /// Create a filter with the given leaf size in meters.
    ///
    /// A non-positive leaf size disables binning and `filter` returns the
    /// input unchanged.
    pub fn new(leaf_size: f32) -> Self {
        Self { leaf_size }
    }

    /// The configured leaf size.
    #[inline]
    pub fn leaf_size(&self) -> f32 {
        self.leaf_size
    }

    /// Downsample `cloud` to one centroid per occupied voxel.
    pub fn filter(&self, cloud: &PointCloud3D) -> PointCloud3D {
        if self.leaf_size <= 0.0 || cloud.is_empty() {
            return cloud.clone();
        }

        let inv_leaf = 1.0 / self.leaf_size;
        let mut voxels: BTreeMap<(i32, i32, i32), VoxelAccumulator> = BTreeMap::new();

        for p in cloud.iter() {
            let key = (
                (p.x * inv_leaf).floor() as i32,
                (p.y * inv_leaf).floor() as i32,
                (p.z * inv_leaf).floor() as i32,
            );
            let acc = voxels.entry(key).or_default();
            acc.x += p.x as f64;
            acc.y += p.y as f64;
            acc.z += p.z as f64;
            acc.intensity += p.intensity as f64;
            acc.count += 1;
        }

        let mut out = PointCloud3D::with_capacity(voxels.len());
        for acc in voxels.values() {
            let n = acc.count as f64;
            out.push(Point3D::new(
                (acc.x / n) as f32,
                (acc.y / n) as f32,
                (acc.z / n) as f32,
                (acc.intensity / n) as f32,
            ));
        }
        out
    }
}
