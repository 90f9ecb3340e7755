//! Population-level updaters shared by the sweep loop.

use faer::Mat;
use rand::rngs::StdRng;

use super::niw::GaussianParams;
use super::posterior::PopulationDraw;
use super::types::EcoError;

/// Prior over the transformed latent vectors.
///
/// The latent sampler only needs each unit's current `(mu, Sigma)`, so the
/// parametric and Dirichlet-process models plug into the same sweep.
pub trait PopulationUpdater {
    /// Parameters currently governing `unit`.
    fn unit_params(&self, unit: usize) -> &GaussianParams;

    /// Resample the population parameters given the transformed latents
    /// (one row per unit).
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if a conjugate draw breaks down.
    fn update(&mut self, rng: &mut StdRng, latents: &Mat<f64>) -> Result<(), EcoError>;

    /// Copy of the current state for the draw store.
    fn snapshot(&self) -> PopulationDraw;
}
