#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Dual Quaternions
//!
//! Value types used to represent rigid motions in screw form.
//!
//! - [`Quaternion`]: a 4-vector `(x, y, z, w)` that encodes a rotation when it has unit norm,
//!   together with the linear operators `Q` and `W` that turn quaternion products into
//!   matrix-vector products.
//! - [`DualQuaternion`]: a pair `(real, dual)` encoding a rotation and a translation.
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use kornia_dualquat::{DualQuaternion, Quaternion};
//!
//! let rotation = Quaternion::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2);
//! let motion = DualQuaternion::from_rotation_translation(rotation, DVec3::new(1.0, 0.0, 0.0));
//!
//! let point = motion.transform_point(DVec3::X);
//! assert!((point - DVec3::new(1.0, 1.0, 0.0)).length() < 1e-12);
//! ```

/// Quaternion value type and its matrix operators.
pub mod quaternion;
pub use quaternion::Quaternion;

/// Dual quaternion value type for rigid motions.
pub mod dual_quaternion;
pub use dual_quaternion::DualQuaternion;
