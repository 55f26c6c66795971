use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use rayon::prelude::*;

use crate::error::RegistrationError;
use crate::pointcloud::is_valid_point;

/// The closest reference point to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbor in the reference point cloud.
    pub index: usize,
    /// Squared Euclidean distance between the query and the neighbor.
    pub distance: f64,
}

/// A read-only structure answering nearest neighbor queries over a reference point set.
///
/// Implementations must be safe to query concurrently from several threads.
pub trait SpatialIndex: Sync {
    /// Build the index over the reference points.
    fn build(points: &[[f64; 3]]) -> Result<Self, RegistrationError>
    where
        Self: Sized;

    /// Find the closest reference point to `point`.
    ///
    /// Returns `None` when the index holds no point.
    fn nearest(&self, point: &[f64; 3]) -> Option<Neighbor>;
}

/// A k-d tree index backed by [`kiddo`].
///
/// Reference points with non-finite coordinates are left out of the tree; reported indices always
/// refer to the original ordering of the reference points.
pub struct KdTreeIndex {
    tree: ImmutableKdTree<f64, u32, 3, 32>,
    // maps tree items back to reference indices
    indices: Vec<usize>,
}

impl SpatialIndex for KdTreeIndex {
    fn build(points: &[[f64; 3]]) -> Result<Self, RegistrationError> {
        if points.len() > u32::MAX as usize {
            return Err(RegistrationError::InvalidInput(format!(
                "reference point cloud is too large: {} points",
                points.len()
            )));
        }

        let (indices, valid_points): (Vec<usize>, Vec<[f64; 3]>) = points
            .iter()
            .enumerate()
            .filter(|(_, p)| is_valid_point(p))
            .map(|(i, p)| (i, *p))
            .unzip();

        if valid_points.is_empty() {
            return Err(RegistrationError::InvalidInput(
                "reference point cloud has no valid point".to_string(),
            ));
        }

        let tree = ImmutableKdTree::new_from_slice(&valid_points);

        Ok(Self { tree, indices })
    }

    fn nearest(&self, point: &[f64; 3]) -> Option<Neighbor> {
        let nn = self.tree.nearest_one::<SquaredEuclidean>(point);
        let index = *self.indices.get(nn.item as usize)?;
        Some(Neighbor {
            index,
            distance: nn.distance,
        })
    }
}

/// Query the closest reference point for every source point in parallel.
///
/// Invalid source points are never queried and yield `None`.
pub fn find_nearest_neighbors<I: SpatialIndex>(
    index: &I,
    points: &[[f64; 3]],
) -> Vec<Option<Neighbor>> {
    points
        .par_iter()
        .map(|p| {
            if is_valid_point(p) {
                index.nearest(p)
            } else {
                None
            }
        })
        .collect()
}
