//! Bayesian ecological inference for 2x2 and 2xC tables.
//!
//! Latent cell proportions are imputed unit by unit under a Normal prior on
//! their link-transformed values. The Normal parameters are either shared by
//! all units (Normal/Inverse-Wishart) or drawn from a Dirichlet-process
//! mixture. Every fit returns the model metadata, a report with diagnostics
//! and summaries, and the retained posterior draws.

pub mod bounds;
pub mod contingency;
pub mod dirichlet;
pub mod integrate;
pub mod latent;
pub mod likelihood;
pub mod link;
pub mod niw;
pub mod parametric;
pub mod population;
pub mod posterior;
pub mod priors;
pub mod random;
pub mod recorder;
pub mod sampler;
pub mod types;

pub use bounds::{UnitBounds, UnitKind};
pub use contingency::{
    MAX_REJECTION_ATTEMPTS, fit_multi_column_input, fit_multi_column_input_with_cancellation,
};
pub use integrate::{IntegrationStatus, QuadratureOptions, QuadratureResult};
pub use likelihood::{LineLikelihood, unit_line_integral, unit_log_likelihood};
pub use link::{EPS_PROPORTION, LinkFunction};
pub use niw::GaussianParams;
pub use posterior::{
    EcoPosteriorDraw, EcoPosteriorSamples, EcoPosteriorSummary, NormalDraw, ParameterSummary,
    PopulationDraw, PredictiveDraw, summarize_posterior, summarize_scalar,
};
pub use priors::{DirichletPrior, NiwPrior};
pub use sampler::{fit_eco_input, fit_eco_input_with_cancellation};
pub use types::{
    EcoError, EcoModel, EcoReport, EcoSamplerConfig, EcoSamplerDiagnostics, LatentMethod,
    MultiColumnConfig, PopulationModel, StartingValues,
};
