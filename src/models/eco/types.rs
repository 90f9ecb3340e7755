//! Core public types for the ecological inference module.

use faer::Mat;
use thiserror::Error;

use super::link::LinkFunction;
use super::posterior::EcoPosteriorSummary;
use super::priors::{DirichletPrior, NiwPrior};
use crate::inference::{InferenceError, McmcConfig};
use crate::input::InputError;

/// Errors returned by configuration, validation, and fitting.
#[derive(Debug, Error)]
pub enum EcoError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    InvalidSchedule(#[from] InferenceError),
    #[error("prior {parameter} has dimension {found}; expected {expected}")]
    PriorDimensionMismatch {
        parameter: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("starting value {parameter} has dimension {found}; expected {expected}")]
    StartingValueDimensionMismatch {
        parameter: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid value {value} for {parameter}")]
    InvalidHyperparameter { parameter: &'static str, value: f64 },
    #[error("grid steps must be at least 2; found {0}")]
    InvalidGridSteps(usize),
    #[error("the contextual model needs an X value for every survey unit")]
    MissingSurveyCovariate,
    #[error("sampler cannot start: bounds of unit {unit} are too tight after {attempts} attempts")]
    InfeasibleBounds { unit: usize, attempts: usize },
    #[error("matrix factorization failed")]
    SolveFailed,
    #[error("posterior draws are required")]
    EmptyPosterior,
}

/// Population prior used for the transformed latent proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopulationModel {
    /// One `(mu, Sigma)` shared by every unit, Normal/Inverse-Wishart prior.
    #[default]
    Parametric,
    /// Dirichlet-process mixture of Normals with an NIW base measure.
    DirichletProcess,
}

/// How mixed units draw their latent pair along the tomography line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatentMethod {
    /// Inverse-CDF sampling over a discretized line.
    #[default]
    Grid,
    /// Independence Metropolis with uniform proposals on the continuous line.
    /// Exact, but mixes considerably slower than the grid.
    Metropolis,
}

/// User-supplied starting point for the parametric model.
#[derive(Debug, Clone)]
pub struct StartingValues {
    pub mu: Vec<f64>,
    pub sigma: Mat<f64>,
}

/// Full sampler configuration for 2x2 fitting.
#[derive(Debug, Clone)]
pub struct EcoSamplerConfig {
    pub schedule: McmcConfig,
    pub link: LinkFunction,
    pub model: PopulationModel,
    pub latent_method: LatentMethod,
    /// Model `link(X)` jointly with the latent pair.
    pub contextual: bool,
    /// Inverse grid step on the W1 axis.
    pub grid_steps: usize,
    /// `None` selects `NiwPrior::for_dimension` for the model dimension.
    pub niw_prior: Option<NiwPrior>,
    pub dirichlet_prior: DirichletPrior,
    /// Parametric model only; `None` starts from one prior draw.
    pub start: Option<StartingValues>,
    /// Store posterior-predictive W and Y with every retained draw.
    pub predictive: bool,
    /// Store the tomography-line log-likelihood of the mixed units with every
    /// retained draw.
    pub track_log_likelihood: bool,
}

impl Default for EcoSamplerConfig {
    fn default() -> Self {
        Self {
            schedule: McmcConfig::default(),
            link: LinkFunction::Logit,
            model: PopulationModel::Parametric,
            latent_method: LatentMethod::Grid,
            contextual: false,
            grid_steps: 1_000,
            niw_prior: None,
            dirichlet_prior: DirichletPrior::default(),
            start: None,
            predictive: false,
            track_log_likelihood: false,
        }
    }
}

impl EcoSamplerConfig {
    /// Dimension of the transformed latent vector.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        if self.contextual { 3 } else { 2 }
    }

    /// Prior in effect for this configuration.
    #[must_use]
    pub fn resolved_prior(&self) -> NiwPrior {
        self.niw_prior
            .clone()
            .unwrap_or_else(|| NiwPrior::for_dimension(self.dimension()))
    }

    /// # Errors
    ///
    /// Returns `EcoError` if any configuration block is invalid.
    pub fn validate(&self) -> Result<(), EcoError> {
        self.schedule.validate()?;
        if self.grid_steps < 2 {
            return Err(EcoError::InvalidGridSteps(self.grid_steps));
        }
        let dim = self.dimension();
        self.resolved_prior().validate(dim)?;
        if self.model == PopulationModel::DirichletProcess {
            self.dirichlet_prior.validate()?;
        }
        if let Some(start) = &self.start {
            if start.mu.len() != dim {
                return Err(EcoError::StartingValueDimensionMismatch {
                    parameter: "mu",
                    expected: dim,
                    found: start.mu.len(),
                });
            }
            if start.sigma.nrows() != dim || start.sigma.ncols() != dim {
                return Err(EcoError::StartingValueDimensionMismatch {
                    parameter: "sigma",
                    expected: dim,
                    found: start.sigma.nrows().max(start.sigma.ncols()),
                });
            }
        }
        Ok(())
    }
}

/// Configuration for the 2xC parametric sampler.
#[derive(Debug, Clone, Default)]
pub struct MultiColumnConfig {
    pub schedule: McmcConfig,
    /// `None` selects `NiwPrior::for_dimension` for the number of columns.
    pub prior: Option<NiwPrior>,
    /// Restrict Dirichlet proposals to the unit's bounds by rejection.
    pub rejection: bool,
}

impl MultiColumnConfig {
    #[must_use]
    pub fn resolved_prior(&self, columns: usize) -> NiwPrior {
        self.prior
            .clone()
            .unwrap_or_else(|| NiwPrior::for_dimension(columns))
    }

    /// # Errors
    ///
    /// Returns `EcoError` if the schedule or the prior does not fit `columns`.
    pub fn validate(&self, columns: usize) -> Result<(), EcoError> {
        self.schedule.validate()?;
        self.resolved_prior(columns).validate(columns)
    }
}

/// Fitted model metadata.
#[derive(Debug, Clone, Copy)]
pub struct EcoModel {
    pub n_units: usize,
    pub n_mixed: usize,
    pub n_homogeneous: usize,
    pub n_known: usize,
    /// Dimension of the transformed latent vector.
    pub dimension: usize,
    pub link: LinkFunction,
    pub model: PopulationModel,
}

/// Sampler diagnostics summary.
#[derive(Debug, Clone, Default)]
pub struct EcoSamplerDiagnostics {
    pub sweeps_completed: usize,
    pub retained_draws: usize,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
    /// Only set for Metropolis latent updates.
    pub metropolis_acceptance: Option<f64>,
    pub final_concentration: Option<f64>,
    pub final_cluster_count: Option<usize>,
    /// Quadrature calls that returned a non-converged estimate.
    pub integration_warnings: usize,
}

/// Output report from fitting.
#[derive(Debug, Clone, Default)]
pub struct EcoReport {
    pub diagnostics: EcoSamplerDiagnostics,
    pub posterior_summary: Option<EcoPosteriorSummary>,
}
