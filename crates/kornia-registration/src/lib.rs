#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Registration
//!
//! Rigid registration of a source point set onto a reference point set with iterative closest
//! point (ICP). Each iteration matches every source point to its nearest reference point,
//! rejects outliers with an adaptive distance threshold and solves for the incremental motion in
//! closed form with dual quaternions.
//!
//! ```no_run
//! use glam::DMat4;
//! use kornia_registration::{PointCloud, RobustIcp, RobustIcpParams};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let reference = PointCloud::from_vec(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])?;
//! let mut source = PointCloud::from_vec(vec![[0.1, 0.0, 0.0], [1.1, 0.0, 0.0], [0.1, 1.0, 0.0]])?;
//!
//! let icp = RobustIcp::new(&reference, RobustIcpParams::default())?;
//! let mut dst_t_src = DMat4::IDENTITY;
//! let result = icp.register(&mut source, &mut dst_t_src, &mut StdRng::seed_from_u64(0))?;
//! println!("{:?} after {} iterations", result.status, result.num_iterations);
//! # Ok::<(), kornia_registration::RegistrationError>(())
//! ```

/// Closed-form absolute orientation solver.
pub mod absolute_orientation;

/// Adaptive correspondence rejection.
pub mod correspondence;

/// Eigendecomposition of small dense matrices.
pub mod eigen;

mod error;
pub use error::RegistrationError;

mod icp_robust;
pub use icp_robust::*;

/// Point cloud container.
pub mod pointcloud;
pub use pointcloud::PointCloud;

/// Nearest neighbor search over the reference points.
pub mod spatial_index;
