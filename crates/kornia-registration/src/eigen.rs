use faer::complex_native::c64;
use glam::{DMat4, DVec4};

use crate::error::RegistrationError;

/// An eigenvalue with the real part of its eigenvector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenPair {
    /// Real part of the eigenvalue.
    pub value_re: f64,
    /// Imaginary part of the eigenvalue.
    pub value_im: f64,
    /// Real part of the eigenvector.
    pub vector: DVec4,
}

/// Computes the full eigendecomposition of a small dense real matrix.
pub trait EigenSolver {
    /// Return all eigenpairs of `matrix`, in no particular order.
    fn eigen_pairs(&self, matrix: &DMat4) -> Result<Vec<EigenPair>, RegistrationError>;
}

/// General real eigendecomposition backed by [`faer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FaerEigenSolver;

impl EigenSolver for FaerEigenSolver {
    fn eigen_pairs(&self, matrix: &DMat4) -> Result<Vec<EigenPair>, RegistrationError> {
        if !matrix.is_finite() {
            return Err(RegistrationError::NumericalFailure(
                "cannot decompose a matrix with non-finite entries".to_string(),
            ));
        }

        // glam is column-major, faer indexes (row, col)
        let mat = faer::Mat::<f64>::from_fn(4, 4, |i, j| matrix.col(j)[i]);
        let evd = mat.eigendecomposition::<c64>();

        let s = evd.s().column_vector();
        let u = evd.u();

        let pairs = (0..4)
            .map(|j| {
                let value = s.read(j);
                EigenPair {
                    value_re: value.re,
                    value_im: value.im,
                    vector: DVec4::new(
                        u.read(0, j).re,
                        u.read(1, j).re,
                        u.read(2, j).re,
                        u.read(3, j).re,
                    ),
                }
            })
            .collect();

        Ok(pairs)
    }
}
