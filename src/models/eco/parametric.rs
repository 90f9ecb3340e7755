//! Single shared `(mu, Sigma)` under a Normal/Inverse-Wishart prior.

use faer::Mat;
use rand::rngs::StdRng;

use super::niw::{GaussianParams, NiwPosterior, niw_prior_draw};
use super::population::PopulationUpdater;
use super::posterior::{NormalDraw, PopulationDraw};
use super::priors::NiwPrior;
use super::types::{EcoError, StartingValues};

#[derive(Debug, Clone)]
pub struct ParametricPopulation {
    prior: NiwPrior,
    params: GaussianParams,
    members: Vec<usize>,
}

impl ParametricPopulation {
    /// Start from user values when given, otherwise from one prior draw.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if the starting covariance is not
    /// positive definite.
    pub fn initialize(
        rng: &mut StdRng,
        prior: NiwPrior,
        start: Option<&StartingValues>,
        n_units: usize,
    ) -> Result<Self, EcoError> {
        let params = match start {
            Some(start) => GaussianParams::new(start.mu.clone(), start.sigma.clone())?,
            None => niw_prior_draw(rng, &prior)?,
        };
        Ok(Self::new(prior, params, n_units))
    }

    #[must_use]
    pub fn new(prior: NiwPrior, params: GaussianParams, n_units: usize) -> Self {
        Self {
            prior,
            params,
            members: (0..n_units).collect(),
        }
    }

    #[must_use]
    pub const fn params(&self) -> &GaussianParams {
        &self.params
    }
}

impl PopulationUpdater for ParametricPopulation {
    fn unit_params(&self, _unit: usize) -> &GaussianParams {
        &self.params
    }

    fn update(&mut self, rng: &mut StdRng, latents: &Mat<f64>) -> Result<(), EcoError> {
        self.params = NiwPosterior::from_rows(&self.prior, latents, &self.members).draw(rng)?;
        Ok(())
    }

    fn snapshot(&self) -> PopulationDraw {
        PopulationDraw::Parametric(NormalDraw::from(&self.params))
    }
}
