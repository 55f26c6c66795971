use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::spatial_index::Neighbor;

/// Parameters of the histogram valley threshold estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramParams {
    /// Number of equal-width bins over `[0, max)`. One extra bin collects distances `>= max`.
    pub num_bins: usize,
    /// Number of random distances sampled to estimate `max`.
    pub num_samples: usize,
    /// Factor applied to the largest sampled distance to obtain `max`.
    pub max_inflation: f64,
    /// A valley bin holds at most this fraction of the peak bin count.
    pub valley_ratio: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            num_bins: 25,
            num_samples: 100,
            max_inflation: 1.05,
            valley_ratio: 0.6,
        }
    }
}

/// Divisor used for the mean and standard deviation of the accepted distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceNormalization {
    /// Divide by the number of source points, invalid and rejected ones included.
    #[default]
    SourceSize,
    /// Divide by the number of accepted correspondences.
    AcceptedCount,
}

/// Parameters of the adaptive correspondence filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceFilterParams {
    /// Noise scale `D`, in squared distance units.
    pub noise_scale: f64,
    /// Lower bound of the adaptive threshold, in squared distance units.
    pub min_threshold: f64,
    /// Normalization of the distance statistics.
    pub normalization: DistanceNormalization,
    /// Histogram estimator used under heavy outlier contamination.
    pub histogram: HistogramParams,
}

impl Default for CorrespondenceFilterParams {
    fn default() -> Self {
        Self {
            noise_scale: 10.0,
            min_threshold: 1e-9,
            normalization: DistanceNormalization::default(),
            histogram: HistogramParams::default(),
        }
    }
}

/// Accepted matches indexed by source point.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceSet {
    matches: Vec<Option<usize>>,
    num_matches: usize,
}

impl CorrespondenceSet {
    /// Keep the neighbors strictly closer than `max_distance`.
    pub fn from_neighbors(neighbors: &[Option<Neighbor>], max_distance: f64) -> Self {
        let matches = neighbors
            .iter()
            .map(|nn| nn.filter(|nn| nn.distance < max_distance).map(|nn| nn.index))
            .collect::<Vec<_>>();
        let num_matches = matches.iter().flatten().count();
        Self {
            matches,
            num_matches,
        }
    }

    /// The reference index matched to each source index, if any.
    pub fn matches(&self) -> &[Option<usize>] {
        &self.matches
    }

    /// Number of accepted correspondences.
    pub fn num_matches(&self) -> usize {
        self.num_matches
    }

    /// Iterate over the accepted `(source_index, reference_index)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.matches
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.map(|j| (i, j)))
    }
}

/// Outcome of one filtering step.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    /// Correspondences accepted under the updated threshold.
    pub correspondences: CorrespondenceSet,
    /// The updated threshold `Dmax`, to be used in the next iteration.
    pub max_distance: f64,
    /// Mean of the distances accepted in the first pass.
    pub mean: f64,
    /// Standard deviation of the distances accepted in the first pass.
    pub std_dev: f64,
}

/// Two-pass robust selection of correspondences.
///
/// The first pass accepts neighbors closer than `max_distance` and accumulates the mean `µ`
/// and standard deviation `σ` of their distances. The threshold is then updated from `µ`
/// relative to the noise scale `D`:
///
/// | `µ`              | new threshold                 |
/// |------------------|-------------------------------|
/// | `µ < D`          | `µ + 3σ`                      |
/// | `D <= µ < 3D`    | `µ + 2σ`                      |
/// | `3D <= µ < 6D`   | `µ + σ`                       |
/// | `µ >= 6D`        | [`histogram_valley_threshold`]|
///
/// The second pass keeps the neighbors closer than the new threshold.
pub fn filter_correspondences<R: Rng>(
    neighbors: &[Option<Neighbor>],
    max_distance: f64,
    params: &CorrespondenceFilterParams,
    rng: &mut R,
) -> FilterOutput {
    let (mut sum, mut sum_sq, mut num_accepted) = (0.0, 0.0, 0usize);
    for nn in neighbors.iter().flatten() {
        if nn.distance < max_distance {
            sum += nn.distance;
            sum_sq += nn.distance * nn.distance;
            num_accepted += 1;
        }
    }

    let n = match params.normalization {
        DistanceNormalization::SourceSize => neighbors.len(),
        DistanceNormalization::AcceptedCount => num_accepted,
    };

    let (mean, std_dev) = if n > 0 {
        let mean = sum / n as f64;
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        (mean, variance.sqrt())
    } else {
        (0.0, 0.0)
    };

    let d = params.noise_scale;
    let threshold = if mean < d {
        mean + 3.0 * std_dev
    } else if mean < 3.0 * d {
        mean + 2.0 * std_dev
    } else if mean < 6.0 * d {
        mean + std_dev
    } else {
        let distances = neighbors
            .iter()
            .flatten()
            .map(|nn| nn.distance)
            .collect::<Vec<_>>();
        histogram_valley_threshold(&distances, &params.histogram, rng)
    };
    let max_distance = threshold.max(params.min_threshold);

    FilterOutput {
        correspondences: CorrespondenceSet::from_neighbors(neighbors, max_distance),
        max_distance,
        mean,
        std_dev,
    }
}

/// Estimate an inlier threshold from the first valley of the distance histogram.
///
/// The histogram range `max` is the largest of `num_samples` randomly sampled distances,
/// inflated by `max_inflation`. After the highest bin (the peak), the first bin whose count
/// is at most `valley_ratio` times the peak count and is followed by a larger count marks the
/// valley `v`; the threshold is `v / num_bins * max`.
///
/// When no valley exists the threshold is `max` itself, so no distance below the sampled
/// range gets rejected.
pub fn histogram_valley_threshold<R: Rng>(
    distances: &[f64],
    params: &HistogramParams,
    rng: &mut R,
) -> f64 {
    if distances.is_empty() || params.num_bins == 0 {
        return 0.0;
    }

    let mut max = 0.0f64;
    for _ in 0..params.num_samples {
        let r = rng.random_range(0..distances.len());
        max = max.max(distances[r]);
    }
    max *= params.max_inflation;

    if max <= 0.0 || !max.is_finite() {
        return max;
    }

    let num_bins = params.num_bins;
    let mut counts = vec![0usize; num_bins + 1];
    for &d in distances {
        let bin = if d >= max {
            num_bins
        } else {
            ((num_bins as f64 * d / max) as usize).min(num_bins)
        };
        counts[bin] += 1;
    }

    // the first highest bin wins ties
    let (peak, elevation) = counts
        .iter()
        .enumerate()
        .fold((0, 0), |(peak, elevation), (i, &count)| {
            if count > elevation {
                (i, count)
            } else {
                (peak, elevation)
            }
        });

    let mut valley = peak + 1;
    while valley < num_bins {
        let count = counts[valley];
        if count as f64 <= params.valley_ratio * elevation as f64 && counts[valley + 1] > count {
            break;
        }
        valley += 1;
    }

    log::trace!(
        "histogram: max {:.4}, peak {}, valley {}, counts {:?}",
        max,
        peak,
        valley,
        counts
    );

    valley.min(num_bins) as f64 / num_bins as f64 * max
}
