//! Posterior storage and summaries for ecological inference.

use faer::Mat;
use num_traits::ToPrimitive;

use crate::input::{EcoInput, InputError};
use crate::utils::usize_to_f64;

use super::niw::GaussianParams;
use super::types::EcoError;

/// One recorded `(mu, Sigma)`.
#[derive(Debug, Clone)]
pub struct NormalDraw {
    pub mu: Vec<f64>,
    pub sigma: Mat<f64>,
}

impl From<&GaussianParams> for NormalDraw {
    fn from(params: &GaussianParams) -> Self {
        Self {
            mu: params.mean().to_vec(),
            sigma: params.covariance().clone(),
        }
    }
}

/// Population parameters at a recorded sweep.
#[derive(Debug, Clone)]
pub enum PopulationDraw {
    Parametric(NormalDraw),
    DirichletProcess {
        /// Distinct cluster parameters, indexed by cluster id.
        clusters: Vec<NormalDraw>,
        /// Cluster id of every unit, contiguous in `[0, clusters.len())`.
        assignments: Vec<usize>,
        /// Recorded only when the concentration is resampled.
        concentration: Option<f64>,
    },
}

impl PopulationDraw {
    /// Parameters governing `unit`.
    #[must_use]
    pub fn unit_params(&self, unit: usize) -> Option<&NormalDraw> {
        match self {
            Self::Parametric(draw) => Some(draw),
            Self::DirichletProcess {
                clusters,
                assignments,
                ..
            } => assignments.get(unit).and_then(|id| clusters.get(*id)),
        }
    }

    #[must_use]
    pub fn cluster_count(&self) -> usize {
        match self {
            Self::Parametric(_) => 1,
            Self::DirichletProcess { clusters, .. } => clusters.len(),
        }
    }
}

/// Posterior-predictive latent pair and margin for every unit.
#[derive(Debug, Clone)]
pub struct PredictiveDraw {
    /// `t x 2` matrix of predicted `(W1, W2)`.
    pub w: Mat<f64>,
    /// Predicted `Y`; `NaN` for survey units supplied without `X`.
    pub y: Vec<f64>,
}

/// A single recorded sweep.
#[derive(Debug, Clone)]
pub struct EcoPosteriorDraw {
    pub population: PopulationDraw,
    /// One row per unit, one column per latent proportion.
    pub w: Mat<f64>,
    pub predictive: Option<PredictiveDraw>,
    /// Total tomography-line log-likelihood of the mixed units.
    pub log_likelihood: Option<f64>,
}

/// Posterior draw collection in sweep order.
#[derive(Debug, Clone, Default)]
pub struct EcoPosteriorSamples {
    pub draws: Vec<EcoPosteriorDraw>,
}

impl EcoPosteriorSamples {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            draws: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.draws.len()
    }

    /// Trace of a latent proportion.
    #[must_use]
    pub fn w_trace(&self, unit: usize, column: usize) -> Vec<f64> {
        self.draws.iter().map(|draw| draw.w[(unit, column)]).collect()
    }

    /// Trace of `mu[component]` for the parameters governing `unit`.
    #[must_use]
    pub fn unit_mu_trace(&self, unit: usize, component: usize) -> Vec<f64> {
        self.draws
            .iter()
            .filter_map(|draw| draw.population.unit_params(unit))
            .map(|params| params.mu[component])
            .collect()
    }

    /// Trace of the shared `mu[component]` (parametric model only).
    #[must_use]
    pub fn mu_trace(&self, component: usize) -> Vec<f64> {
        self.draws
            .iter()
            .filter_map(|draw| match &draw.population {
                PopulationDraw::Parametric(params) => Some(params.mu[component]),
                PopulationDraw::DirichletProcess { .. } => None,
            })
            .collect()
    }

    /// Trace of the shared `Sigma[(row, col)]` (parametric model only).
    #[must_use]
    pub fn sigma_trace(&self, row: usize, col: usize) -> Vec<f64> {
        self.draws
            .iter()
            .filter_map(|draw| match &draw.population {
                PopulationDraw::Parametric(params) => Some(params.sigma[(row, col)]),
                PopulationDraw::DirichletProcess { .. } => None,
            })
            .collect()
    }

    #[must_use]
    pub fn concentration_trace(&self) -> Vec<f64> {
        self.draws
            .iter()
            .filter_map(|draw| match &draw.population {
                PopulationDraw::DirichletProcess { concentration, .. } => *concentration,
                PopulationDraw::Parametric(_) => None,
            })
            .collect()
    }

    /// Number of distinct clusters at each recorded sweep.
    #[must_use]
    pub fn cluster_count_trace(&self) -> Vec<usize> {
        self.draws
            .iter()
            .map(|draw| draw.population.cluster_count())
            .collect()
    }

    #[must_use]
    pub fn log_likelihood_trace(&self) -> Vec<f64> {
        self.draws.iter().filter_map(|draw| draw.log_likelihood).collect()
    }

    /// Trace of the predicted margin of `unit`, when predictive draws were kept.
    #[must_use]
    pub fn predictive_y_trace(&self, unit: usize) -> Vec<f64> {
        self.draws
            .iter()
            .filter_map(|draw| draw.predictive.as_ref().map(|pred| pred.y[unit]))
            .collect()
    }

    /// Population-level `(W1, W2)` per draw over the main-input units.
    ///
    /// `W1` is weighted by `N_i X_i` and `W2` by `N_i (1 - X_i)`, with equal
    /// sizes when `input` carries none. A proportion with zero total weight is
    /// reported as `NaN`.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::EmptyPosterior` without draws, and
    /// `InputError::UnitCountMismatch` if `input` has more main units than the
    /// draws, and `InputError::InvalidUnitSizeLength` if the unit sizes do not
    /// cover every main unit.
    pub fn aggregate_proportions(&self, input: &EcoInput) -> Result<Vec<[f64; 2]>, EcoError> {
        let first = self.draws.first().ok_or(EcoError::EmptyPosterior)?;
        let n_main = input.n_main();
        if n_main > first.w.nrows() {
            return Err(InputError::UnitCountMismatch {
                expected: first.w.nrows(),
                found: n_main,
            }
            .into());
        }
        if let Some(sizes) = &input.unit_sizes
            && sizes.len() != n_main
        {
            return Err(InputError::InvalidUnitSizeLength {
                sizes: sizes.len(),
                units: n_main,
            }
            .into());
        }

        let weights: Vec<(f64, f64)> = (0..n_main)
            .map(|unit| {
                let size = input.unit_sizes.as_ref().map_or(1.0, |sizes| sizes[unit]);
                (size * input.x[unit], size * (1.0 - input.x[unit]))
            })
            .collect();
        let total_w1 = weights.iter().map(|(w1, _)| w1).sum::<f64>();
        let total_w2 = weights.iter().map(|(_, w2)| w2).sum::<f64>();

        Ok(self
            .draws
            .iter()
            .map(|draw| {
                let mut sums = [0.0, 0.0];
                for (unit, (weight1, weight2)) in weights.iter().enumerate() {
                    sums[0] += weight1 * draw.w[(unit, 0)];
                    sums[1] += weight2 * draw.w[(unit, 1)];
                }
                [ratio(sums[0], total_w1), ratio(sums[1], total_w2)]
            })
            .collect())
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        f64::NAN
    }
}

/// Scalar posterior summary statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub q025: f64,
    pub q50: f64,
    pub q975: f64,
}

/// Posterior summary of the recorded blocks.
#[derive(Debug, Clone, Default)]
pub struct EcoPosteriorSummary {
    /// Shared population mean (parametric model).
    pub mu: Vec<ParameterSummary>,
    /// Per-unit summaries of each latent proportion, indexed `[unit][column]`.
    pub w: Vec<Vec<ParameterSummary>>,
    pub concentration: Option<ParameterSummary>,
    pub cluster_count: Option<ParameterSummary>,
    pub log_likelihood: Option<ParameterSummary>,
    pub draw_count: usize,
}

/// Compute posterior summaries for all stored blocks.
#[must_use]
pub fn summarize_posterior(samples: &EcoPosteriorSamples) -> EcoPosteriorSummary {
    let draw_count = samples.len();
    let Some(first) = samples.draws.first() else {
        return EcoPosteriorSummary::default();
    };

    let mu = match &first.population {
        PopulationDraw::Parametric(params) => (0..params.mu.len())
            .map(|component| summarize_scalar(&samples.mu_trace(component)))
            .collect(),
        PopulationDraw::DirichletProcess { .. } => Vec::new(),
    };

    let w = (0..first.w.nrows())
        .map(|unit| {
            (0..first.w.ncols())
                .map(|column| summarize_scalar(&samples.w_trace(unit, column)))
                .collect()
        })
        .collect();

    let (concentration, cluster_count) = match &first.population {
        PopulationDraw::DirichletProcess { concentration, .. } => {
            let counts: Vec<f64> = samples
                .cluster_count_trace()
                .into_iter()
                .map(usize_to_f64)
                .collect();
            (
                concentration.map(|_| summarize_scalar(&samples.concentration_trace())),
                Some(summarize_scalar(&counts)),
            )
        }
        PopulationDraw::Parametric(_) => (None, None),
    };

    let log_likelihood = first
        .log_likelihood
        .map(|_| summarize_scalar(&samples.log_likelihood_trace()));

    EcoPosteriorSummary {
        mu,
        w,
        concentration,
        cluster_count,
        log_likelihood,
        draw_count,
    }
}

/// Mean, standard deviation and the 2.5/50/97.5% quantiles.
#[must_use]
pub fn summarize_scalar(values: &[f64]) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let n = usize_to_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n.max(1.0);

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    ParameterSummary {
        mean,
        std_dev: variance.sqrt(),
        q025: percentile(&sorted, 0.025),
        q50: percentile(&sorted, 0.5),
        q975: percentile(&sorted, 0.975),
    }
}

#[must_use]
fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }

    let clamped = probability.clamp(0.0, 1.0);
    let last = sorted_values.len() - 1;
    let position = clamped * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(last);

    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}
