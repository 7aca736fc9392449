//! Static nearest-neighbor index over a point cloud snapshot.

use crate::core::types::{Point3D, PointCloud3D};
use kiddo::{KdTree, SquaredEuclidean};

/// A balanced k-d tree over an owned point cloud snapshot.
///
/// The index exclusively owns its backing cloud, taken at build time, so a
/// query can never observe the producer mutating the points. Queries are
/// read-only and safe to issue from multiple threads after the build.
#[derive(Debug)]
pub struct CloudIndex {
    tree: KdTree<f32, 3>,
    points: PointCloud3D,
}

impl CloudIndex {
    /// Build an index over `points`, taking ownership of the snapshot.
    pub fn build(points: PointCloud3D) -> Self {
        let mut tree = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        Self { tree, points }
    }

    /// Build an empty index.
    pub fn empty() -> Self {
        Self::build(PointCloud3D::new())
    }

    /// The `k` nearest points to `query` as (index, squared distance),
    /// closest first.
    pub fn nearest_k(&self, query: &Point3D, k: usize) -> Vec<(usize, f32)> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }
        self.tree
            .nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k)
            .into_iter()
            .map(|n| (n.item as usize, n.distance))
            .collect()
    }

    /// All points within `radius` meters of `query` as (index, squared
    /// distance), closest first.
    pub fn within_radius(&self, query: &Point3D, radius: f32) -> Vec<(usize, f32)> {
        if self.points.is_empty() {
            return Vec::new();
        }
        self.tree
            .within::<SquaredEuclidean>(&[query.x, query.y, query.z], radius * radius)
            .into_iter()
            .map(|n| (n.item as usize, n.distance))
            .collect()
    }

    /// The backing cloud snapshot.
    #[inline]
    pub fn points(&self) -> &PointCloud3D {
        &self.points
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the index holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
