use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DMat4;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::absolute_orientation::solve_absolute_orientation;
use crate::correspondence::{filter_correspondences, CorrespondenceFilterParams, CorrespondenceSet};
use crate::eigen::{EigenSolver, FaerEigenSolver};
use crate::error::RegistrationError;
use crate::pointcloud::PointCloud;
use crate::spatial_index::{find_nearest_neighbors, KdTreeIndex, Neighbor, SpatialIndex};

/// How a registration that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// The incremental motion fell below both tolerances.
    Converged,
    /// The maximum number of iterations was reached before convergence.
    IterationLimitReached,
}

/// Result of the robust ICP algorithm.
///
/// The transformation is from the source to the reference frame.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Estimated homogeneous transform, including the prior.
    pub transform: DMat4,
    /// Termination status.
    pub status: RegistrationStatus,
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Number of correspondences accepted in the last iteration.
    pub num_correspondences: usize,
    /// Root mean squared nearest neighbor distance over the last accepted correspondences.
    pub rmse: f64,
    /// The adaptive distance threshold after the last iteration, in squared units.
    pub max_distance: f64,
    /// Time spent in each phase, summed over all iterations.
    pub timings: PhaseTimings,
}

/// Wall-clock time spent in the phases of a registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Nearest neighbor search.
    pub search: Duration,
    /// Correspondence filtering.
    pub matching: Duration,
    /// Absolute orientation solve.
    pub localize: Duration,
    /// Transforming the source and accumulating the estimate.
    pub update: Duration,
}

impl PhaseTimings {
    /// Sum of all phases.
    pub fn total(&self) -> Duration {
        self.search + self.matching + self.localize + self.update
    }
}

/// Structure to define the robust ICP parameters.
///
/// Distances and thresholds are squared Euclidean distances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustIcpParams {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// The initial threshold is this factor times the noise scale.
    pub initial_threshold_factor: f64,
    /// Convergence tolerance on the norm of the incremental translation.
    pub translation_tolerance: f64,
    /// Convergence tolerance on the incremental rotation angle, in radians.
    pub rotation_tolerance: f64,
    /// Parameters of the correspondence filter.
    pub filter: CorrespondenceFilterParams,
}

impl Default for RobustIcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 40,
            initial_threshold_factor: 20.0,
            translation_tolerance: 0.01,
            rotation_tolerance: 0.01,
            filter: CorrespondenceFilterParams::default(),
        }
    }
}

impl RobustIcpParams {
    fn validate(&self) -> Result<(), RegistrationError> {
        if self.max_iterations == 0 {
            return Err(RegistrationError::InvalidInput(
                "max_iterations must be positive".to_string(),
            ));
        }
        let positive = [
            ("noise_scale", self.filter.noise_scale),
            ("initial_threshold_factor", self.initial_threshold_factor),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(RegistrationError::InvalidInput(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        let non_negative = [
            ("min_threshold", self.filter.min_threshold),
            ("translation_tolerance", self.translation_tolerance),
            ("rotation_tolerance", self.rotation_tolerance),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(RegistrationError::InvalidInput(format!(
                    "{name} must be non-negative and finite, got {value}"
                )));
            }
        }
        let histogram = &self.filter.histogram;
        if histogram.num_bins == 0 || histogram.num_samples == 0 {
            return Err(RegistrationError::InvalidInput(
                "histogram needs at least one bin and one sample".to_string(),
            ));
        }
        Ok(())
    }
}

/// Robust point-to-point ICP with a closed-form dual quaternion solve.
///
/// The reference point cloud is indexed once at construction and is never modified. Each call
/// to [`RobustIcp::register`] deforms the source point cloud in place and accumulates the
/// estimated motion into the caller's transform.
pub struct RobustIcp<'a, I: SpatialIndex, E: EigenSolver> {
    reference: &'a PointCloud,
    index: I,
    eigen_solver: E,
    params: RobustIcpParams,
    cancel_token: Option<Arc<AtomicBool>>,
}

impl<'a> RobustIcp<'a, KdTreeIndex, FaerEigenSolver> {
    /// Build a k-d tree over the reference point cloud and use the faer eigen solver.
    pub fn new(
        reference: &'a PointCloud,
        params: RobustIcpParams,
    ) -> Result<Self, RegistrationError> {
        let now = Instant::now();
        let index = KdTreeIndex::build(reference.points())?;
        log::trace!(
            "k-d tree over {} points built in {:?}",
            reference.len(),
            now.elapsed()
        );
        Ok(Self::with_solvers(reference, index, FaerEigenSolver, params))
    }
}

impl<'a, I: SpatialIndex, E: EigenSolver> RobustIcp<'a, I, E> {
    /// Create the registration from a prebuilt index over `reference` and an eigen solver.
    ///
    /// PRECONDITION: `index` was built over the points of `reference`.
    pub fn with_solvers(
        reference: &'a PointCloud,
        index: I,
        eigen_solver: E,
        params: RobustIcpParams,
    ) -> Self {
        Self {
            reference,
            index,
            eigen_solver,
            params,
            cancel_token: None,
        }
    }

    /// Stop the registration at the next iteration once the token is set.
    pub fn with_cancel_token(mut self, cancel_token: Arc<AtomicBool>) -> Self {
        self.cancel_token = Some(cancel_token);
        self
    }

    /// The registration parameters.
    pub fn params(&self) -> &RobustIcpParams {
        &self.params
    }

    /// Register the source point cloud onto the reference point cloud.
    ///
    /// # Arguments
    ///
    /// * `source` - Source point cloud, transformed in place by the prior and every incremental
    ///   motion. Points with non-finite coordinates are never matched.
    /// * `dst_t_src` - Prior transform from the source to the reference frame, updated in place
    ///   with the refined estimate.
    /// * `rng` - Random source for the histogram threshold estimator.
    ///
    /// # Returns
    ///
    /// The refined transform and the termination status. On error the source point cloud and
    /// `dst_t_src` hold intermediate values that must not be trusted.
    pub fn register<R: Rng>(
        &self,
        source: &mut PointCloud,
        dst_t_src: &mut DMat4,
        rng: &mut R,
    ) -> Result<IcpResult, RegistrationError> {
        self.params.validate()?;

        if self.reference.is_empty() || source.is_empty() {
            return Err(RegistrationError::InvalidInput(
                "reference and source point clouds must not be empty".to_string(),
            ));
        }
        if source.num_valid() == 0 {
            return Err(RegistrationError::InvalidInput(
                "source point cloud has no valid point".to_string(),
            ));
        }
        if !dst_t_src.is_finite() {
            return Err(RegistrationError::InvalidInput(
                "prior transform has non-finite entries".to_string(),
            ));
        }

        // transform source points according to the prior
        source.transform_in_place(dst_t_src);

        let mut max_distance =
            self.params.initial_threshold_factor * self.params.filter.noise_scale;
        let mut timings = PhaseTimings::default();

        for iteration in 0..self.params.max_iterations {
            if self.is_cancelled() {
                return Err(RegistrationError::Cancelled { iteration });
            }

            // NOTE: for debugging purposes, we measure the time taken for each phase
            let mut step = PhaseTimings::default();

            // find closest points
            let now = Instant::now();
            let neighbors = find_nearest_neighbors(&self.index, source.points());
            step.search = now.elapsed();

            // choose which matches to use
            let now = Instant::now();
            let filtered =
                filter_correspondences(&neighbors, max_distance, &self.params.filter, rng);
            max_distance = filtered.max_distance;
            step.matching = now.elapsed();

            let correspondences = filtered.correspondences;
            let num_correspondences = correspondences.num_matches();
            if num_correspondences == 0 {
                return Err(RegistrationError::NoCorrespondences { iteration });
            }

            // compute motion
            let now = Instant::now();
            let motion = solve_absolute_orientation(
                self.reference.points(),
                source.points(),
                &correspondences,
                &self.eigen_solver,
            )?;
            step.localize = now.elapsed();

            // apply to all source points and accumulate
            let now = Instant::now();
            let motion_mat = motion.matrix();
            source.transform_in_place(&motion_mat);
            *dst_t_src = motion_mat * *dst_t_src;
            step.update = now.elapsed();

            timings.search += step.search;
            timings.matching += step.matching;
            timings.localize += step.localize;
            timings.update += step.update;

            let dt = motion.translation().length();
            let dth = motion.angle();
            let rmse = mean_squared_distance(&neighbors, &correspondences).sqrt();

            log::debug!(
                "Iteration: {} matches: {} max_distance: {:.6} dt: {:.6} dtheta: {:.6} \
                 rmse: {:.6} elapsed: {:?}",
                iteration,
                num_correspondences,
                max_distance,
                dt,
                dth,
                rmse,
                step.total()
            );
            log::trace!(
                "Iteration: {} search: {:?} match: {:?} localize: {:?} update: {:?}",
                iteration,
                step.search,
                step.matching,
                step.localize,
                step.update
            );

            let converged = iteration > 0
                && dt < self.params.translation_tolerance
                && dth < self.params.rotation_tolerance;
            let exhausted = iteration + 1 == self.params.max_iterations;

            if converged || exhausted {
                let status = if converged {
                    log::debug!("ICP converged in {} iterations with rmse {}", iteration + 1, rmse);
                    RegistrationStatus::Converged
                } else {
                    log::warn!(
                        "ICP reached {} iterations without converging, last step dt: {} dtheta: {}",
                        self.params.max_iterations,
                        dt,
                        dth
                    );
                    RegistrationStatus::IterationLimitReached
                };
                return Ok(IcpResult {
                    transform: *dst_t_src,
                    status,
                    num_iterations: iteration + 1,
                    num_correspondences,
                    rmse,
                    max_distance,
                    timings,
                });
            }
        }

        // max_iterations > 0 is validated, the loop always returns
        Err(RegistrationError::InvalidInput(
            "max_iterations must be positive".to_string(),
        ))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|token| token.load(Ordering::SeqCst))
    }
}

/// Robust ICP using a k-d tree over the reference and the faer eigen solver.
///
/// # Arguments
///
/// * `reference` - Reference point cloud.
/// * `source` - Source point cloud, transformed in place.
/// * `dst_t_src` - Prior transform from the source to the reference frame, updated in place.
/// * `params` - Registration parameters.
/// * `rng` - Random source for the histogram threshold estimator.
///
/// Example:
///
/// ```no_run
/// use glam::DMat4;
/// use kornia_registration::{icp_robust, PointCloud, RobustIcpParams};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let reference = PointCloud::from_vec(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])?;
/// let mut source = reference.clone();
/// let mut dst_t_src = DMat4::IDENTITY;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let result = icp_robust(&reference, &mut source, &mut dst_t_src, &RobustIcpParams::default(), &mut rng)?;
/// println!("{:?}", result.status);
/// # Ok::<(), kornia_registration::RegistrationError>(())
/// ```
pub fn icp_robust<R: Rng>(
    reference: &PointCloud,
    source: &mut PointCloud,
    dst_t_src: &mut DMat4,
    params: &RobustIcpParams,
    rng: &mut R,
) -> Result<IcpResult, RegistrationError> {
    RobustIcp::new(reference, *params)?.register(source, dst_t_src, rng)
}

fn mean_squared_distance(
    neighbors: &[Option<Neighbor>],
    correspondences: &CorrespondenceSet,
) -> f64 {
    let (sum, count) = correspondences
        .iter()
        .filter_map(|(i, _)| neighbors.get(i).copied().flatten())
        .fold((0.0, 0usize), |(sum, count), nn| (sum + nn.distance, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use rand::{rngs::StdRng, SeedableRng};

    fn create_random_points(rng: &mut StdRng, num_points: usize) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| {
                [
                    rng.random_range(0.0..1.0),
                    rng.random_range(0.0..1.0),
                    rng.random_range(0.0..1.0),
                ]
            })
            .collect()
    }

    #[test]
    fn test_icp_identity() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(0);
        let reference = PointCloud::from_vec(create_random_points(&mut rng, 100))?;
        let mut source = reference.clone();
        let mut dst_t_src = DMat4::IDENTITY;

        let result = icp_robust(
            &reference,
            &mut source,
            &mut dst_t_src,
            &RobustIcpParams::default(),
            &mut rng,
        )?;

        assert_eq!(result.status, RegistrationStatus::Converged);
        assert_eq!(result.num_iterations, 2);
        assert_eq!(result.num_correspondences, 100);
        assert!(result.rmse < 1e-6);
        assert!(dst_t_src.abs_diff_eq(DMat4::IDENTITY, 1e-6));
        assert_eq!(result.transform, dst_t_src);
        Ok(())
    }

    #[test]
    fn test_icp_phase_timings() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(3);
        let reference = PointCloud::from_vec(create_random_points(&mut rng, 500))?;
        let mut source = reference.clone();
        let mut dst_t_src = DMat4::from_translation(DVec3::new(0.01, 0.0, -0.01));

        let result = icp_robust(
            &reference,
            &mut source,
            &mut dst_t_src,
            &RobustIcpParams::default(),
            &mut rng,
        )?;

        let timings = result.timings;
        assert!(timings.search > Duration::ZERO);
        assert!(timings.localize > Duration::ZERO);
        assert!(timings.total() >= timings.search + timings.localize);
        Ok(())
    }

    #[test]
    fn test_icp_no_correspondences() -> Result<(), Box<dyn std::error::Error>> {
        // every source point is farther than the initial threshold
        let reference = PointCloud::from_vec(vec![[100.0, 0.0, 0.0], [100.0, 1.0, 0.0]])?;
        let mut source = PointCloud::from_vec(vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]])?;
        let mut dst_t_src = DMat4::IDENTITY;
        let mut rng = StdRng::seed_from_u64(0);

        let res = icp_robust(
            &reference,
            &mut source,
            &mut dst_t_src,
            &RobustIcpParams::default(),
            &mut rng,
        );
        assert_eq!(
            res.err(),
            Some(RegistrationError::NoCorrespondences { iteration: 0 })
        );
        Ok(())
    }

    #[test]
    fn test_icp_invalid_source() -> Result<(), Box<dyn std::error::Error>> {
        let reference = PointCloud::from_vec(vec![[0.0, 0.0, 0.0]])?;
        let mut source = PointCloud::from_vec(vec![[f64::NAN, 0.0, 0.0]])?;
        let mut dst_t_src = DMat4::IDENTITY;
        let mut rng = StdRng::seed_from_u64(0);

        let res = icp_robust(
            &reference,
            &mut source,
            &mut dst_t_src,
            &RobustIcpParams::default(),
            &mut rng,
        );
        assert!(matches!(res, Err(RegistrationError::InvalidInput(_))));
        Ok(())
    }

    #[test]
    fn test_icp_invalid_params() -> Result<(), Box<dyn std::error::Error>> {
        let reference = PointCloud::from_vec(vec![[0.0, 0.0, 0.0]])?;
        let mut source = reference.clone();
        let mut dst_t_src = DMat4::IDENTITY;
        let mut rng = StdRng::seed_from_u64(0);

        let params = RobustIcpParams {
            max_iterations: 0,
            ..Default::default()
        };
        let res = icp_robust(&reference, &mut source, &mut dst_t_src, &params, &mut rng);
        assert!(matches!(res, Err(RegistrationError::InvalidInput(_))));

        let mut params = RobustIcpParams::default();
        params.filter.histogram.num_bins = 0;
        let res = icp_robust(&reference, &mut source, &mut dst_t_src, &params, &mut rng);
        assert!(matches!(res, Err(RegistrationError::InvalidInput(_))));
        Ok(())
    }

    #[test]
    fn test_icp_iteration_limit() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(0);
        let reference = PointCloud::from_vec(create_random_points(&mut rng, 50))?;
        let mut source = reference.clone();
        let mut dst_t_src = DMat4::from_translation(DVec3::new(0.05, 0.0, 0.0));

        // convergence needs at least two iterations
        let params = RobustIcpParams {
            max_iterations: 1,
            ..Default::default()
        };
        let result = icp_robust(&reference, &mut source, &mut dst_t_src, &params, &mut rng)?;
        assert_eq!(result.status, RegistrationStatus::IterationLimitReached);
        assert_eq!(result.num_iterations, 1);
        Ok(())
    }

    #[test]
    fn test_icp_cancelled() -> Result<(), Box<dyn std::error::Error>> {
        let reference = PointCloud::from_vec(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]])?;
        let mut source = reference.clone();
        let mut dst_t_src = DMat4::IDENTITY;
        let mut rng = StdRng::seed_from_u64(0);

        let cancel_token = Arc::new(AtomicBool::new(true));
        let icp = RobustIcp::new(&reference, RobustIcpParams::default())?
            .with_cancel_token(cancel_token);
        let res = icp.register(&mut source, &mut dst_t_src, &mut rng);
        assert_eq!(res.err(), Some(RegistrationError::Cancelled { iteration: 0 }));
        Ok(())
    }

    #[test]
    fn test_params_from_partial_json() -> Result<(), Box<dyn std::error::Error>> {
        let params: RobustIcpParams =
            serde_json::from_str(r#"{"max_iterations": 10, "filter": {"noise_scale": 2.5}}"#)?;
        assert_eq!(params.max_iterations, 10);
        assert_eq!(params.filter.noise_scale, 2.5);
        assert_eq!(params.filter.histogram, Default::default());
        assert_eq!(params.translation_tolerance, 0.01);
        Ok(())
    }
}
