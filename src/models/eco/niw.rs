//! Normal/Inverse-Wishart algebra and Gaussian parameter caches.

use faer::Mat;
use rand::rngs::StdRng;
use statrs::function::gamma::ln_gamma;

use crate::utils::{
    centered_quadratic_form, cholesky_lower, log_determinant_spd, matrix_inverse, usize_to_f64,
};

use super::priors::NiwPrior;
use super::random::{sample_inverse_wishart, sample_multivariate_normal_with_factor};
use super::types::EcoError;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Multivariate normal `N(mu, sigma)` with its precision, log-determinant and
/// lower Cholesky factor cached for repeated density evaluation.
#[derive(Debug, Clone)]
pub struct GaussianParams {
    mu: Vec<f64>,
    sigma: Mat<f64>,
    precision: Mat<f64>,
    log_det: f64,
    lower: Mat<f64>,
}

impl GaussianParams {
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if `sigma` is not positive definite or
    /// its shape does not match `mu`.
    pub fn new(mu: Vec<f64>, sigma: Mat<f64>) -> Result<Self, EcoError> {
        if sigma.nrows() != mu.len() || sigma.ncols() != mu.len() {
            return Err(EcoError::SolveFailed);
        }
        let lower = cholesky_lower(&sigma).ok_or(EcoError::SolveFailed)?;
        let log_det = 2.0 * (0..lower.ncols()).map(|idx| lower[(idx, idx)].ln()).sum::<f64>();
        let precision = matrix_inverse(&sigma)?;
        Ok(Self {
            mu,
            sigma,
            precision,
            log_det,
            lower,
        })
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.mu.len()
    }

    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mu
    }

    #[must_use]
    pub const fn covariance(&self) -> &Mat<f64> {
        &self.sigma
    }

    /// Log density at `x`.
    #[must_use]
    pub fn log_density(&self, x: &[f64]) -> f64 {
        let dim = usize_to_f64(self.mu.len());
        let quadratic = centered_quadratic_form(x, &self.mu, &self.precision);
        -0.5 * (dim.mul_add(LN_2PI, self.log_det) + quadratic)
    }

    pub fn sample(&self, rng: &mut StdRng) -> Vec<f64> {
        sample_multivariate_normal_with_factor(rng, &self.mu, &self.lower)
    }

    /// Distribution of the coordinates not listed in `known`, given
    /// `x[known[k]] = values[k]`.
    ///
    /// Free coordinates keep their original relative order.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if a covariance block cannot be
    /// inverted.
    pub fn conditional(&self, known: &[usize], values: &[f64]) -> Result<Self, EcoError> {
        let free: Vec<usize> = (0..self.mu.len()).filter(|idx| !known.contains(idx)).collect();
        if known.is_empty() {
            return Ok(self.clone());
        }
        let sigma_bb = Mat::from_fn(known.len(), known.len(), |r, c| {
            self.sigma[(known[r], known[c])]
        });
        let sigma_ab = Mat::from_fn(free.len(), known.len(), |r, c| {
            self.sigma[(free[r], known[c])]
        });
        let inv_bb = matrix_inverse(&sigma_bb)?;
        let gain = &sigma_ab * &inv_bb;

        let mu = free
            .iter()
            .enumerate()
            .map(|(r, idx)| {
                self.mu[*idx]
                    + known
                        .iter()
                        .enumerate()
                        .map(|(c, k)| gain[(r, c)] * (values[c] - self.mu[*k]))
                        .sum::<f64>()
            })
            .collect();
        let reduction = &gain * sigma_ab.transpose();
        let sigma = Mat::from_fn(free.len(), free.len(), |r, c| {
            self.sigma[(free[r], free[c])] - reduction[(r, c)]
        });
        Self::new(mu, sigma)
    }
}

/// Posterior NIW hyperparameters after observing a set of rows.
#[derive(Debug, Clone)]
pub struct NiwPosterior {
    pub nu: f64,
    pub tau: f64,
    pub mu: Vec<f64>,
    pub scale: Mat<f64>,
}

impl NiwPosterior {
    /// Conjugate update from the rows of `data` listed in `members`.
    #[must_use]
    pub fn from_rows(prior: &NiwPrior, data: &Mat<f64>, members: &[usize]) -> Self {
        let dim = prior.dimension();
        let n = usize_to_f64(members.len());
        if members.is_empty() {
            return Self {
                nu: prior.nu0,
                tau: prior.tau0,
                mu: prior.mu0.clone(),
                scale: prior.s0.clone(),
            };
        }

        let mut mean = vec![0.0; dim];
        for row in members {
            for (col, value) in mean.iter_mut().enumerate() {
                *value += data[(*row, col)];
            }
        }
        for value in &mut mean {
            *value /= n;
        }

        let shrink = prior.tau0 * n / (prior.tau0 + n);
        let scale = Mat::from_fn(dim, dim, |r, c| {
            let scatter = members
                .iter()
                .map(|row| (data[(*row, r)] - mean[r]) * (data[(*row, c)] - mean[c]))
                .sum::<f64>();
            let offset = (mean[r] - prior.mu0[r]) * (mean[c] - prior.mu0[c]);
            prior.s0[(r, c)] + scatter + shrink * offset
        });
        let mu = (0..dim)
            .map(|idx| prior.tau0.mul_add(prior.mu0[idx], n * mean[idx]) / (prior.tau0 + n))
            .collect();

        Self {
            nu: prior.nu0 + n,
            tau: prior.tau0 + n,
            mu,
            scale,
        }
    }

    /// `Sigma ~ IW(nu, scale)`, then `mu | Sigma ~ N(mu_n, Sigma / tau)`.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if the scale matrix is not positive
    /// definite.
    pub fn draw(&self, rng: &mut StdRng) -> Result<GaussianParams, EcoError> {
        niw_draw(rng, self.nu, self.tau, &self.mu, &self.scale)
    }
}

/// Draw `(mu, Sigma)` from the prior itself.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if `s0` is not positive definite.
pub fn niw_prior_draw(rng: &mut StdRng, prior: &NiwPrior) -> Result<GaussianParams, EcoError> {
    niw_draw(rng, prior.nu0, prior.tau0, &prior.mu0, &prior.s0)
}

fn niw_draw(
    rng: &mut StdRng,
    nu: f64,
    tau: f64,
    mu: &[f64],
    scale: &Mat<f64>,
) -> Result<GaussianParams, EcoError> {
    let (sigma, _) = sample_inverse_wishart(rng, nu, scale)?;
    let mean_cov = Mat::from_fn(sigma.nrows(), sigma.ncols(), |r, c| sigma[(r, c)] / tau);
    let lower = cholesky_lower(&mean_cov).ok_or(EcoError::SolveFailed)?;
    let draw = sample_multivariate_normal_with_factor(rng, mu, &lower);
    GaussianParams::new(draw, sigma)
}

/// Multivariate Student-t density, used as the prior predictive of a single
/// observation under the NIW base measure.
#[derive(Debug, Clone)]
pub struct PredictiveT {
    df: f64,
    location: Vec<f64>,
    inv_scale: Mat<f64>,
    log_normalizer: f64,
}

impl PredictiveT {
    /// Prior predictive: df `nu0 - d + 1`, location `mu0`, scale
    /// `s0 (tau0 + 1) / (tau0 df)`.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if the scale is not positive definite.
    pub fn from_prior(prior: &NiwPrior) -> Result<Self, EcoError> {
        let dim = usize_to_f64(prior.dimension());
        let df = prior.nu0 - dim + 1.0;
        let factor = (prior.tau0 + 1.0) / (prior.tau0 * df);
        let scale = Mat::from_fn(prior.s0.nrows(), prior.s0.ncols(), |r, c| {
            prior.s0[(r, c)] * factor
        });
        Self::new(df, prior.mu0.clone(), &scale)
    }

    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if `scale` is not positive definite or
    /// `df` is not positive.
    pub fn new(df: f64, location: Vec<f64>, scale: &Mat<f64>) -> Result<Self, EcoError> {
        if df <= 0.0 {
            return Err(EcoError::SolveFailed);
        }
        let dim = usize_to_f64(location.len());
        let log_det = log_determinant_spd(scale).ok_or(EcoError::SolveFailed)?;
        let inv_scale = matrix_inverse(scale)?;
        let log_normalizer = 0.5f64.mul_add(
            -dim * (df * std::f64::consts::PI).ln(),
            ln_gamma(0.5 * (df + dim)) - ln_gamma(0.5 * df),
        ) - 0.5 * log_det;
        Ok(Self {
            df,
            location,
            inv_scale,
            log_normalizer,
        })
    }

    #[must_use]
    pub fn log_density(&self, x: &[f64]) -> f64 {
        let dim = usize_to_f64(self.location.len());
        let quadratic = centered_quadratic_form(x, &self.location, &self.inv_scale);
        self.log_normalizer - 0.5 * (self.df + dim) * (quadratic / self.df).ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn bivariate() -> GaussianParams {
        let sigma = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.5 });
        GaussianParams::new(vec![0.5, -1.0], sigma).expect("spd covariance")
    }

    #[test]
    fn log_density_at_mean_matches_closed_form() {
        let params = bivariate();
        let expected = -LN_2PI - 0.5 * 0.75_f64.ln();
        assert_relative_eq!(params.log_density(&[0.5, -1.0]), expected, epsilon = 1.0e-12);
    }

    #[test]
    fn conditional_of_bivariate_matches_regression() {
        let params = bivariate();
        let cond = params.conditional(&[0], &[1.5]).expect("invertible block");
        assert_eq!(cond.dimension(), 1);
        assert_relative_eq!(cond.mean()[0], -1.0 + 0.5 * 1.0, epsilon = 1.0e-12);
        assert_relative_eq!(cond.covariance()[(0, 0)], 0.75, epsilon = 1.0e-12);
    }

    #[test]
    fn conditional_keeps_free_coordinate_order() {
        let sigma = Mat::from_fn(3, 3, |i, j| if i == j { 2.0 } else { 0.0 });
        let params = GaussianParams::new(vec![1.0, 2.0, 3.0], sigma).expect("spd");
        let cond = params.conditional(&[2], &[0.0]).expect("invertible");
        assert_eq!(cond.mean(), &[1.0, 2.0]);
    }

    #[test]
    fn posterior_update_matches_hand_computation() {
        let prior = NiwPrior::default();
        let data = Mat::from_fn(2, 2, |i, j| if i == 0 { [1.0, 2.0][j] } else { [3.0, 4.0][j] });
        let posterior = NiwPosterior::from_rows(&prior, &data, &[0, 1]);
        assert_relative_eq!(posterior.nu, prior.nu0 + 2.0);
        assert_relative_eq!(posterior.tau, 4.0);
        // (2 * 0 + 2 * [2, 3]) / 4
        assert_relative_eq!(posterior.mu[0], 1.0, epsilon = 1.0e-12);
        assert_relative_eq!(posterior.mu[1], 1.5, epsilon = 1.0e-12);
        // s0 + scatter + tau0 n / (tau0 + n) (xbar - mu0)(xbar - mu0)'
        assert_relative_eq!(posterior.scale[(0, 0)], 10.0 + 2.0 + 4.0, epsilon = 1.0e-12);
        assert_relative_eq!(posterior.scale[(0, 1)], 2.0 + 6.0, epsilon = 1.0e-12);
    }

    #[test]
    fn empty_member_set_returns_prior() {
        let prior = NiwPrior::default();
        let data = Mat::<f64>::zeros(3, 2);
        let posterior = NiwPosterior::from_rows(&prior, &data, &[]);
        assert_relative_eq!(posterior.tau, prior.tau0);
        assert_relative_eq!(posterior.scale[(1, 1)], prior.s0[(1, 1)]);
    }

    #[test]
    fn posterior_draw_concentrates_around_data_mean() {
        let mut rng = StdRng::seed_from_u64(17);
        let prior = NiwPrior::default();
        let data = Mat::from_fn(400, 2, |i, j| if j == 0 { 0.8 + 0.001 * (i % 5) as f64 } else { -0.4 });
        let members: Vec<usize> = (0..400).collect();
        let posterior = NiwPosterior::from_rows(&prior, &data, &members);
        let draw = posterior.draw(&mut rng).expect("spd posterior");
        assert_relative_eq!(draw.mean()[0], 0.8, epsilon = 0.1);
        assert_relative_eq!(draw.mean()[1], -0.4, epsilon = 0.1);
    }

    #[test]
    fn predictive_t_integrates_like_a_density_in_one_dimension() {
        let t = PredictiveT::new(4.0, vec![0.0], &Mat::from_fn(1, 1, |_, _| 1.0)).expect("valid");
        let step = 0.01;
        let total = (-4_000..4_000)
            .map(|k| t.log_density(&[f64::from(k) * step]).exp() * step)
            .sum::<f64>();
        assert_relative_eq!(total, 1.0, epsilon = 2.0e-3);
    }

    #[test]
    fn predictive_t_peaks_at_location() {
        let prior = NiwPrior::default();
        let t = PredictiveT::from_prior(&prior).expect("valid prior");
        assert!(t.log_density(&[0.0, 0.0]) > t.log_density(&[1.0, -1.0]));
    }
}
