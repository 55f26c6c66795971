use glam::DMat4;
use kornia_dualquat::{DualQuaternion, Quaternion};

use crate::correspondence::CorrespondenceSet;
use crate::eigen::{EigenPair, EigenSolver};
use crate::error::RegistrationError;

// relative tolerance on the imaginary part of an eigenvalue
const IMAGINARY_TOLERANCE: f64 = 1e-8;

/// Compute the rigid motion that best aligns the matched source points onto the reference
/// points in the least-squares sense.
///
/// Closed-form dual quaternion solution of the absolute orientation problem, see:
/// Walker, M. W., Shao, L., and Volz, R. A. "Estimating 3-D location parameters using dual
/// number quaternions." CVGIP: Image Understanding, 1991.
///
/// With points lifted to pure quaternions of half their coordinates, the matrices
///
/// * `C1 = -2 Σ Q(y)ᵀ W(x)`
/// * `C2 = 2 Σ (W(x) - Q(y))`
///
/// are accumulated over the `n` matches `x -> y`. The rotation is the eigenvector of
/// `A = ½ (½/n C2ᵀ C2 - C1 - C1ᵀ)` with the largest eigenvalue and the dual part is
/// `-½/n C2 r`.
///
/// # Arguments
///
/// * `reference` - The reference points.
/// * `source` - The source points.
/// * `correspondences` - Matches from source indices to reference indices.
/// * `eigen_solver` - Solver used for the 4x4 eigenproblem.
///
/// # Returns
///
/// The incremental motion taking the source points onto the reference points.
pub fn solve_absolute_orientation<E: EigenSolver>(
    reference: &[[f64; 3]],
    source: &[[f64; 3]],
    correspondences: &CorrespondenceSet,
    eigen_solver: &E,
) -> Result<DualQuaternion, RegistrationError> {
    let mut c1 = DMat4::ZERO;
    let mut c2 = DMat4::ZERO;
    let mut num_matches = 0usize;

    for (i, j) in correspondences.iter() {
        let (Some(p_src), Some(p_ref)) = (source.get(i), reference.get(j)) else {
            return Err(RegistrationError::InvalidInput(format!(
                "correspondence {i} -> {j} is out of bounds"
            )));
        };
        let w_src = Quaternion::from_point(p_src).w_matrix();
        let q_ref = Quaternion::from_point(p_ref).q_matrix();
        c1 += q_ref.transpose() * w_src;
        c2 += w_src - q_ref;
        num_matches += 1;
    }

    if num_matches == 0 {
        return Err(RegistrationError::InvalidInput(
            "cannot align an empty correspondence set".to_string(),
        ));
    }

    let c1 = c1 * -2.0;
    let c2 = c2 * 2.0;
    let w = num_matches as f64;

    let a = (c2.transpose() * c2 * (0.5 / w) - c1 - c1.transpose()) * 0.5;

    let pairs = eigen_solver.eigen_pairs(&a)?;
    let best = select_max_eigen_pair(&pairs).ok_or_else(|| {
        RegistrationError::NumericalFailure(format!(
            "no finite real eigenpair among {} eigenpairs",
            pairs.len()
        ))
    })?;

    let real = Quaternion::from_vec4(best.vector)
        .normalize()
        .ok_or_else(|| RegistrationError::NumericalFailure("zero eigenvector".to_string()))?;
    let dual = Quaternion::from_vec4(c2 * real.to_vec4() * (-0.5 / w));

    Ok(DualQuaternion::new(real, dual))
}

/// Pick the eigenpair with the largest real eigenvalue, ignoring non-finite or complex ones.
fn select_max_eigen_pair(pairs: &[EigenPair]) -> Option<&EigenPair> {
    pairs
        .iter()
        .filter(|p| {
            p.value_re.is_finite()
                && p.value_im.is_finite()
                && p.value_im.abs() <= IMAGINARY_TOLERANCE * p.value_re.abs().max(1.0)
                && p.vector.is_finite()
                && p.vector.length_squared() > f64::EPSILON
        })
        .max_by(|a, b| a.value_re.total_cmp(&b.value_re))
}
