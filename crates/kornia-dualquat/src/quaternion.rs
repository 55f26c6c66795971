use glam::{DMat3, DMat4, DQuat, DVec3, DVec4};
use serde::{Deserialize, Serialize};

/// A quaternion stored as `(x, y, z, w)` with `w` the scalar part.
///
/// When used as a rotation the quaternion must have unit norm. The same type is used for the
/// dual part of a [`crate::DualQuaternion`] and for points lifted to pure quaternions, in which
/// case the norm is arbitrary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// First component of the vector part.
    pub x: f64,
    /// Second component of the vector part.
    pub y: f64,
    /// Third component of the vector part.
    pub z: f64,
    /// Scalar part.
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    /// The identity rotation.
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// The zero quaternion.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a quaternion from its components.
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Create a quaternion from a 4-vector laid out as `(x, y, z, w)`.
    pub fn from_vec4(v: DVec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }

    /// Get the quaternion as a 4-vector laid out as `(x, y, z, w)`.
    pub fn to_vec4(self) -> DVec4 {
        DVec4::new(self.x, self.y, self.z, self.w)
    }

    /// Create a pure quaternion `(v, 0)`.
    pub fn pure(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z, 0.0)
    }

    /// Lift a 3D point to the pure quaternion of half its coordinates.
    ///
    /// With this convention the closed-form registration solution yields a dual part equal to
    /// `½·t·r`, i.e. a standard unit dual quaternion.
    pub fn from_point(point: &[f64; 3]) -> Self {
        Self::new(0.5 * point[0], 0.5 * point[1], 0.5 * point[2], 0.0)
    }

    /// Create a rotation quaternion from an axis and an angle in radians.
    ///
    /// The axis does not need to be normalized. A zero axis yields the identity.
    pub fn from_axis_angle(axis: DVec3, angle: f64) -> Self {
        let axis = axis.normalize_or_zero();
        if axis == DVec3::ZERO {
            return Self::IDENTITY;
        }
        let (s, c) = (0.5 * angle).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// The vector part `(x, y, z)`.
    pub fn vector(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// Multiply all four components by a scalar.
    pub fn scale(&self, s: f64) -> Self {
        Self::from_vec4(self.to_vec4() * s)
    }

    /// Squared Euclidean norm of the 4-vector.
    pub fn norm_squared(&self) -> f64 {
        self.to_vec4().length_squared()
    }

    /// Euclidean norm of the 4-vector.
    pub fn norm(&self) -> f64 {
        self.to_vec4().length()
    }

    /// Return the unit quaternion pointing in the same direction.
    ///
    /// Returns `None` when the norm is zero or not finite.
    pub fn normalize(&self) -> Option<Self> {
        let norm = self.norm();
        if !norm.is_finite() || norm <= f64::EPSILON {
            return None;
        }
        Some(self.scale(1.0 / norm))
    }

    /// The conjugate `(-v, w)`.
    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// The matrix `Q(p)` such that `p ⊗ q = Q(p) · q` for any quaternion `q`.
    pub fn q_matrix(&self) -> DMat4 {
        let Self { x, y, z, w } = *self;
        from_rows([
            [w, -z, y, x],
            [z, w, -x, y],
            [-y, x, w, z],
            [-x, -y, -z, w],
        ])
    }

    /// The matrix `W(p)` such that `q ⊗ p = W(p) · q` for any quaternion `q`.
    pub fn w_matrix(&self) -> DMat4 {
        let Self { x, y, z, w } = *self;
        from_rows([
            [w, z, -y, x],
            [-z, w, x, y],
            [y, -x, w, z],
            [-x, -y, -z, w],
        ])
    }

    /// Hamilton product `self ⊗ rhs`.
    pub fn left_multiply(&self, rhs: &Quaternion) -> Quaternion {
        Self::from_vec4(self.q_matrix() * rhs.to_vec4())
    }

    /// Hamilton product `lhs ⊗ self`.
    pub fn right_multiply(&self, lhs: &Quaternion) -> Quaternion {
        Self::from_vec4(self.w_matrix() * lhs.to_vec4())
    }

    /// Rotation angle in radians encoded by a unit quaternion, in `[0, π]`.
    ///
    /// `q` and `-q` encode the same rotation, hence the absolute value of the scalar part.
    pub fn angle(&self) -> f64 {
        let norm = self.norm();
        if norm <= f64::EPSILON {
            return 0.0;
        }
        2.0 * (self.w.abs() / norm).min(1.0).acos()
    }

    /// The 3x3 rotation matrix encoded by this quaternion.
    ///
    /// PRECONDITION: the quaternion has unit norm.
    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_quat(self.to_dquat())
    }

    /// Rotate a point, `p' = q ⊗ p ⊗ q*`.
    ///
    /// PRECONDITION: the quaternion has unit norm.
    pub fn rotate_point(&self, point: DVec3) -> DVec3 {
        self.left_multiply(&Self::pure(point))
            .left_multiply(&self.conjugate())
            .vector()
    }

    fn to_dquat(self) -> DQuat {
        DQuat::from_xyzw(self.x, self.y, self.z, self.w)
    }
}

fn from_rows(rows: [[f64; 4]; 4]) -> DMat4 {
    DMat4::from_cols_array_2d(&rows).transpose()
}
