//! Prior specifications for the population parameters.

use faer::Mat;

use crate::utils::{cholesky_lower, usize_to_f64};

use super::types::EcoError;

/// Normal/Inverse-Wishart hyperparameters.
///
/// `Sigma ~ IW(nu0, s0)` and `mu | Sigma ~ N(mu0, Sigma / tau0)`.
#[derive(Debug, Clone)]
pub struct NiwPrior {
    /// Inverse-Wishart degrees of freedom.
    pub nu0: f64,
    /// Prior sample size for the mean.
    pub tau0: f64,
    /// Prior mean.
    pub mu0: Vec<f64>,
    /// Inverse-Wishart scale matrix.
    pub s0: Mat<f64>,
}

impl Default for NiwPrior {
    fn default() -> Self {
        Self::for_dimension(2)
    }
}

impl NiwPrior {
    /// Diffuse default: `nu0 = d + 2`, `tau0 = 2`, `mu0 = 0`, `s0 = 10 I`.
    #[must_use]
    pub fn for_dimension(dim: usize) -> Self {
        Self {
            nu0: usize_to_f64(dim) + 2.0,
            tau0: 2.0,
            mu0: vec![0.0; dim],
            s0: Mat::from_fn(dim, dim, |row, col| if row == col { 10.0 } else { 0.0 }),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.mu0.len()
    }

    /// # Errors
    ///
    /// Returns `EcoError` naming the first hyperparameter that does not fit a
    /// `dim`-dimensional model.
    pub fn validate(&self, dim: usize) -> Result<(), EcoError> {
        if self.mu0.len() != dim {
            return Err(EcoError::PriorDimensionMismatch {
                parameter: "mu0",
                expected: dim,
                found: self.mu0.len(),
            });
        }
        if self.s0.nrows() != dim || self.s0.ncols() != dim {
            return Err(EcoError::PriorDimensionMismatch {
                parameter: "s0",
                expected: dim,
                found: self.s0.nrows().max(self.s0.ncols()),
            });
        }
        if !(self.tau0 > 0.0 && self.tau0.is_finite()) {
            return Err(EcoError::InvalidHyperparameter {
                parameter: "tau0",
                value: self.tau0,
            });
        }
        if !(self.nu0 > usize_to_f64(dim) - 1.0 && self.nu0.is_finite()) {
            return Err(EcoError::InvalidHyperparameter {
                parameter: "nu0",
                value: self.nu0,
            });
        }
        if self.mu0.iter().any(|value| !value.is_finite()) {
            return Err(EcoError::InvalidHyperparameter {
                parameter: "mu0",
                value: f64::NAN,
            });
        }
        if cholesky_lower(&self.s0).is_none() {
            return Err(EcoError::InvalidHyperparameter {
                parameter: "s0",
                value: self.s0[(0, 0)],
            });
        }
        Ok(())
    }
}

/// Hyperparameters for the Dirichlet-process concentration `alpha`.
///
/// `alpha ~ Gamma(a0, rate = b0)` when the concentration is updated.
#[derive(Debug, Clone, Copy)]
pub struct DirichletPrior {
    pub a0: f64,
    pub b0: f64,
    /// Resample `alpha` every sweep (Escobar–West).
    pub update_concentration: bool,
    /// Starting (or fixed) value of `alpha`.
    pub initial_concentration: f64,
}

impl Default for DirichletPrior {
    fn default() -> Self {
        Self {
            a0: 1.0,
            b0: 0.1,
            update_concentration: true,
            initial_concentration: 1.0,
        }
    }
}

impl DirichletPrior {
    /// # Errors
    ///
    /// Returns `EcoError::InvalidHyperparameter` for non-positive values.
    pub fn validate(self) -> Result<(), EcoError> {
        let checks = [
            ("a0", self.a0),
            ("b0", self.b0),
            ("initial_concentration", self.initial_concentration),
        ];
        for (parameter, value) in checks {
            if !(value > 0.0 && value.is_finite()) {
                return Err(EcoError::InvalidHyperparameter { parameter, value });
            }
        }
        Ok(())
    }
}
