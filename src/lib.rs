#![forbid(unsafe_code)]

//! # `eco_inference`
//!
//! Bayesian ecological inference: recover the unobserved cell proportions of
//! 2x2 and 2xC tables from their row and column margins by Markov chain
//! Monte Carlo.
//!
//! Latent proportions are drawn unit by unit along each unit's tomography
//! line. Their link-transformed values share a Normal/Inverse-Wishart
//! population, or are clustered by a Dirichlet-process mixture of Normals.
//! Survey units with fully observed proportions and homogeneous units with
//! `X = 0` or `X = 1` inform the population alongside the aggregate data.
//!
//! The library emits `tracing` events and installs no subscriber.

pub mod inference;
pub mod input;
pub mod models;
pub mod utils;

pub use inference::{CancellationToken, InferenceError, McmcConfig, ProposalStats};
pub use input::{EcoInput, InputError, MultiColumnInput};

pub use models::eco::{
    DirichletPrior, EPS_PROPORTION, EcoError, EcoModel, EcoPosteriorDraw, EcoPosteriorSamples,
    EcoPosteriorSummary, EcoReport, EcoSamplerConfig, EcoSamplerDiagnostics, GaussianParams,
    IntegrationStatus, LatentMethod, LineLikelihood, LinkFunction, MAX_REJECTION_ATTEMPTS,
    MultiColumnConfig, NiwPrior, NormalDraw, ParameterSummary, PopulationDraw, PopulationModel,
    PredictiveDraw, QuadratureOptions, QuadratureResult, StartingValues, UnitBounds, UnitKind,
    fit_eco_input, fit_eco_input_with_cancellation, fit_multi_column_input,
    fit_multi_column_input_with_cancellation, summarize_posterior, summarize_scalar,
    unit_line_integral, unit_log_likelihood,
};
