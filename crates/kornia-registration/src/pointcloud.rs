use glam::{DMat4, DVec3};
use rayon::prelude::*;

use crate::error::RegistrationError;

/// An ordered, index-stable set of 3D points.
///
/// Points with a non-finite coordinate are treated as invalid measurements: they keep their slot but
/// are never matched during registration.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a point cloud from a non-empty vector of points.
    pub fn from_vec(points: Vec<[f64; 3]>) -> Result<Self, RegistrationError> {
        if points.is_empty() {
            return Err(RegistrationError::InvalidInput(
                "point cloud data is empty".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// Get the number of points in the point cloud, invalid ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as mutable reference the points in the point cloud.
    pub fn points_mut(&mut self) -> &mut [[f64; 3]] {
        &mut self.points
    }

    /// Number of points with finite coordinates.
    pub fn num_valid(&self) -> usize {
        self.points.iter().filter(|p| is_valid_point(p)).count()
    }

    /// Apply a homogeneous transform to every point in place.
    ///
    /// Invalid points stay invalid since non-finite values propagate through the transform.
    pub fn transform_in_place(&mut self, transform: &DMat4) {
        self.points.par_iter_mut().for_each(|p| {
            *p = transform
                .transform_point3(DVec3::from_array(*p))
                .to_array();
        });
    }

    /// Consume the point cloud and return its points.
    pub fn into_vec(self) -> Vec<[f64; 3]> {
        self.points
    }
}

/// Whether a point carries a usable measurement, i.e. all coordinates are finite.
#[inline]
pub fn is_valid_point(point: &[f64; 3]) -> bool {
    point.iter().all(|c| c.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud_smoke() -> Result<(), RegistrationError> {
        let data = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [f64::NAN, 8.0, 9.0]];
        let pc = PointCloud::from_vec(data)?;
        assert_eq!(pc.len(), 3);
        assert_eq!(pc.num_valid(), 2);
        Ok(())
    }

    #[test]
    fn test_infinite_points_are_invalid() -> Result<(), RegistrationError> {
        let pc = PointCloud::from_vec(vec![
            [0.0, 0.0, 0.0],
            [f64::INFINITY, 0.0, 0.0],
            [0.0, f64::NEG_INFINITY, 0.0],
            [0.0, 0.0, f64::NAN],
        ])?;
        assert_eq!(pc.num_valid(), 1);
        assert!(is_valid_point(&pc.points()[0]));
        assert!(!is_valid_point(&pc.points()[1]));
        assert!(!is_valid_point(&pc.points()[2]));
        Ok(())
    }

    #[test]
    fn test_pointcloud_empty() {
        let pc = PointCloud::from_vec(vec![]);
        assert!(matches!(pc, Err(RegistrationError::InvalidInput(_))));
    }

    #[test]
    fn test_transform_in_place() -> Result<(), RegistrationError> {
        let mut pc = PointCloud::from_vec(vec![[1.0, 0.0, 0.0], [f64::NAN, 0.0, 0.0]])?;
        let transform = DMat4::from_rotation_translation(
            glam::DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2),
            DVec3::new(0.0, 0.0, 1.0),
        );
        pc.transform_in_place(&transform);

        let p = DVec3::from_array(pc.points()[0]);
        assert!(p.abs_diff_eq(DVec3::new(0.0, 1.0, 1.0), 1e-12));
        assert!(!is_valid_point(&pc.points()[1]));
        Ok(())
    }
}
