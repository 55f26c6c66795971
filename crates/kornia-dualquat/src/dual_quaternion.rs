use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::Quaternion;

/// A rigid motion in screw form, `real + ε·dual`.
///
/// The real part encodes the rotation and the dual part is `½·t·real`, where `t` is the
/// translation as a pure quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DualQuaternion {
    /// Rotation part.
    pub real: Quaternion,
    /// Translation part, coupled with the rotation.
    pub dual: Quaternion,
}

impl DualQuaternion {
    /// The identity motion.
    pub const IDENTITY: Self = Self {
        real: Quaternion::IDENTITY,
        dual: Quaternion::ZERO,
    };

    /// Create a dual quaternion from its real and dual parts.
    pub fn new(real: Quaternion, dual: Quaternion) -> Self {
        Self { real, dual }
    }

    /// Create the motion that first rotates by `rotation` and then translates by `translation`.
    ///
    /// PRECONDITION: `rotation` has unit norm.
    pub fn from_rotation_translation(rotation: Quaternion, translation: DVec3) -> Self {
        let dual = Quaternion::pure(translation)
            .left_multiply(&rotation)
            .scale(0.5);
        Self::new(rotation, dual)
    }

    /// Scale both parts so that the real part has unit norm.
    ///
    /// Returns `None` when the real part is zero or not finite.
    pub fn normalize(&self) -> Option<Self> {
        let norm = self.real.norm();
        let real = self.real.normalize()?;
        Some(Self::new(real, self.dual.scale(1.0 / norm)))
    }

    /// The translation `t = 2·dual·real*`.
    pub fn translation(&self) -> DVec3 {
        self.dual
            .left_multiply(&self.real.conjugate())
            .scale(2.0)
            .vector()
    }

    /// The rotation angle of the real part in radians.
    pub fn angle(&self) -> f64 {
        self.real.angle()
    }

    /// The 4x4 homogeneous transform encoded by this motion.
    ///
    /// PRECONDITION: the real part has unit norm.
    pub fn matrix(&self) -> DMat4 {
        let mut m = DMat4::from_mat3(self.real.rotation_matrix());
        m.w_axis = self.translation().extend(1.0);
        m
    }

    /// Apply the motion to a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.real.rotate_point(point) + self.translation()
    }

    /// The motion that applies `other` first and then `self`.
    pub fn compose(&self, other: &DualQuaternion) -> DualQuaternion {
        let real = self.real.left_multiply(&other.real);
        let dual = self.real.left_multiply(&other.dual).to_vec4()
            + self.dual.left_multiply(&other.real).to_vec4();
        Self::new(real, Quaternion::from_vec4(dual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity() {
        let dq = DualQuaternion::IDENTITY;
        assert!(dq.matrix().abs_diff_eq(DMat4::IDENTITY, 1e-12));
        assert_eq!(dq.translation(), DVec3::ZERO);
        assert_eq!(dq.angle(), 0.0);
    }

    #[test]
    fn test_translation_and_angle() {
        let rotation = Quaternion::from_axis_angle(DVec3::new(0.0, 1.0, 1.0), 0.7);
        let translation = DVec3::new(0.3, -1.2, 2.5);
        let dq = DualQuaternion::from_rotation_translation(rotation, translation);

        assert!(dq.translation().abs_diff_eq(translation, 1e-12));
        assert_relative_eq!(dq.angle(), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix() {
        let rotation = Quaternion::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2);
        let dq = DualQuaternion::from_rotation_translation(rotation, DVec3::new(1.0, 2.0, 3.0));

        let expected = DMat4::from_cols_array_2d(&[
            [0.0, 1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [1.0, 2.0, 3.0, 1.0],
        ]);
        assert!(dq.matrix().abs_diff_eq(expected, 1e-12));

        let p = DVec3::new(0.5, -0.5, 2.0);
        assert!(dq
            .transform_point(p)
            .abs_diff_eq(dq.matrix().transform_point3(p), 1e-12));
    }

    #[test]
    fn test_sign_invariance() {
        let rotation = Quaternion::from_axis_angle(DVec3::X, 1.1);
        let dq = DualQuaternion::from_rotation_translation(rotation, DVec3::new(-1.0, 0.5, 0.0));
        let flipped = DualQuaternion::new(dq.real.scale(-1.0), dq.dual.scale(-1.0));
        assert!(dq.matrix().abs_diff_eq(flipped.matrix(), 1e-12));
    }

    #[test]
    fn test_normalize() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = Quaternion::from_axis_angle(DVec3::Y, 0.4);
        let dq = DualQuaternion::from_rotation_translation(rotation, DVec3::new(1.0, 1.0, 0.0));
        let scaled = DualQuaternion::new(dq.real.scale(3.0), dq.dual.scale(3.0));

        let normalized = scaled.normalize().ok_or("zero real part")?;
        assert_relative_eq!(normalized.real.norm(), 1.0, epsilon = 1e-12);
        assert!(normalized.translation().abs_diff_eq(dq.translation(), 1e-12));

        assert!(DualQuaternion::new(Quaternion::ZERO, Quaternion::ZERO)
            .normalize()
            .is_none());
        Ok(())
    }

    #[test]
    fn test_compose_matches_matrix_product() {
        let a = DualQuaternion::from_rotation_translation(
            Quaternion::from_axis_angle(DVec3::Z, 0.3),
            DVec3::new(1.0, 0.0, 0.0),
        );
        let b = DualQuaternion::from_rotation_translation(
            Quaternion::from_axis_angle(DVec3::X, -0.8),
            DVec3::new(0.0, 2.0, -1.0),
        );
        let ab = a.compose(&b);
        assert!(ab.matrix().abs_diff_eq(a.matrix() * b.matrix(), 1e-12));
    }
}
