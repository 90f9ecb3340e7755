//! Random variate generation with an explicit generator handle.
//!
//! Every routine takes `&mut StdRng` so a run is fully determined by its seed.

use faer::Mat;
use rand::RngExt;
use rand::rngs::StdRng;

use crate::utils::{cholesky_lower, matrix_inverse, symmetrize, usize_to_f64};

use super::types::EcoError;

/// Box–Muller standard normal draw.
pub fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Uniform draw on the open interval `(0, 1)`.
pub fn sample_open_unit(rng: &mut StdRng) -> f64 {
    loop {
        let u = rng.random::<f64>();
        if u > 0.0 {
            return u;
        }
    }
}

/// Gamma draw with `shape` and `scale` (Marsaglia–Tsang).
pub fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }

    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let shape_minus_third = shape - (1.0 / 3.0);
    let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
    loop {
        let standard_normal = sample_standard_normal(rng);
        let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
        if one_plus_coeff_noise <= 0.0 {
            continue;
        }
        let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
        let uniform = rng.random::<f64>();
        if uniform
            < (0.0331 * standard_normal * standard_normal * standard_normal)
                .mul_add(-standard_normal, 1.0)
        {
            return scale * shape_minus_third * cubic_term;
        }
        if uniform.ln()
            < (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            )
        {
            return scale * shape_minus_third * cubic_term;
        }
    }
}

pub fn sample_chi_square(rng: &mut StdRng, dof: f64) -> f64 {
    sample_gamma(rng, 0.5 * dof, 2.0)
}

/// Beta draw as a ratio of gamma variates.
pub fn sample_beta(rng: &mut StdRng, a: f64, b: f64) -> f64 {
    let x = sample_gamma(rng, a, 1.0);
    let y = sample_gamma(rng, b, 1.0);
    let total = x + y;
    if total > 0.0 { x / total } else { 0.5 }
}

/// Dirichlet draw by normalized unit-scale gammas.
pub fn sample_dirichlet(rng: &mut StdRng, concentration: &[f64]) -> Vec<f64> {
    let mut draws: Vec<f64> = concentration
        .iter()
        .map(|alpha| sample_gamma(rng, *alpha, 1.0))
        .collect();
    let total = draws.iter().sum::<f64>();
    if total > 0.0 {
        for value in &mut draws {
            *value /= total;
        }
    }
    draws
}

/// Wishart draw via the Bartlett decomposition.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if `scale` is not positive definite or `df`
/// is too small for the dimension.
pub fn sample_wishart(rng: &mut StdRng, df: f64, scale: &Mat<f64>) -> Result<Mat<f64>, EcoError> {
    let dim = scale.ncols();
    if dim == 0 || df <= usize_to_f64(dim.saturating_sub(1)) {
        return Err(EcoError::SolveFailed);
    }
    let chol = cholesky_lower(scale).ok_or(EcoError::SolveFailed)?;
    let mut bartlett = Mat::<f64>::zeros(dim, dim);
    for row in 0..dim {
        let dof = df - usize_to_f64(row);
        if dof <= 0.0 {
            return Err(EcoError::SolveFailed);
        }
        bartlett[(row, row)] = sample_chi_square(rng, dof).sqrt();
        for col in 0..row {
            bartlett[(row, col)] = sample_standard_normal(rng);
        }
    }
    let product = &chol * &bartlett;
    Ok(symmetrize(&(&product * product.transpose())))
}

/// Inverse-Wishart draw `IW(df, scale)`, returned together with its inverse.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if any inversion fails.
pub fn sample_inverse_wishart(
    rng: &mut StdRng,
    df: f64,
    scale: &Mat<f64>,
) -> Result<(Mat<f64>, Mat<f64>), EcoError> {
    let inv_scale = matrix_inverse(scale)?;
    let precision = sample_wishart(rng, df, &inv_scale)?;
    let covariance = matrix_inverse(&precision)?;
    Ok((covariance, precision))
}

/// Multivariate normal draw `mu + L z` from a lower Cholesky factor.
pub fn sample_multivariate_normal_with_factor(
    rng: &mut StdRng,
    mu: &[f64],
    lower: &Mat<f64>,
) -> Vec<f64> {
    let dim = mu.len();
    let noise: Vec<f64> = (0..dim).map(|_| sample_standard_normal(rng)).collect();
    (0..dim)
        .map(|row| mu[row] + (0..=row).map(|col| lower[(row, col)] * noise[col]).sum::<f64>())
        .collect()
}

/// Multivariate normal draw.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if `covariance` is not positive definite.
pub fn sample_multivariate_normal(
    rng: &mut StdRng,
    mu: &[f64],
    covariance: &Mat<f64>,
) -> Result<Vec<f64>, EcoError> {
    let lower = cholesky_lower(covariance).ok_or(EcoError::SolveFailed)?;
    Ok(sample_multivariate_normal_with_factor(rng, mu, &lower))
}

/// First index whose normalized cumulative weight exceeds `u`.
///
/// `cumulative` holds running sums of non-negative weights, so zero-weight
/// entries are never selected; the last index absorbs any rounding shortfall.
#[must_use]
pub fn inverse_cdf_index(cumulative: &[f64], u: f64) -> usize {
    let Some(total) = cumulative.last().copied() else {
        return 0;
    };
    let target = u * total;
    let last = cumulative.len() - 1;
    cumulative
        .iter()
        .position(|value| *value > target)
        .unwrap_or(last)
        .min(last)
}

/// Categorical draw from unnormalized log weights.
///
/// Weights are max-shifted before exponentiation; entries equal to
/// `f64::NEG_INFINITY` can never be selected unless all entries are.
pub fn sample_from_log_weights(
    rng: &mut StdRng,
    log_weights: &[f64],
    cumulative: &mut Vec<f64>,
) -> usize {
    let max = log_weights
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    cumulative.clear();
    let mut running = 0.0;
    for log_weight in log_weights {
        if max.is_finite() && log_weight.is_finite() {
            running += (log_weight - max).exp();
        }
        cumulative.push(running);
    }
    if running <= 0.0 {
        return log_weights.len().saturating_sub(1);
    }
    inverse_cdf_index(cumulative, rng.random::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    #[test]
    fn gamma_draws_match_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mean = (0..n).map(|_| sample_gamma(&mut rng, 3.0, 0.5)).sum::<f64>() / 20_000.0;
        assert_relative_eq!(mean, 1.5, epsilon = 0.05);
    }

    #[test]
    fn beta_draws_are_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1_000 {
            let value = sample_beta(&mut rng, 0.7, 40.0);
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn dirichlet_draws_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let draw = sample_dirichlet(&mut rng, &[1.0, 1.0, 1.0]);
        assert_relative_eq!(draw.iter().sum::<f64>(), 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn inverse_wishart_mean_matches_scale() {
        let mut rng = StdRng::seed_from_u64(5);
        let scale = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.3 });
        let df = 10.0;
        let draws = 4_000;
        let mut mean = Mat::<f64>::zeros(2, 2);
        for _ in 0..draws {
            let (sigma, _) = sample_inverse_wishart(&mut rng, df, &scale).expect("spd scale");
            for i in 0..2 {
                for j in 0..2 {
                    mean[(i, j)] += sigma[(i, j)] / 4_000.0;
                }
            }
        }
        // E[IW(df, S)] = S / (df - d - 1)
        assert_relative_eq!(mean[(0, 0)], 1.0 / 7.0, epsilon = 0.02);
        assert_relative_eq!(mean[(0, 1)], 0.3 / 7.0, epsilon = 0.02);
    }

    #[test]
    fn wishart_rejects_degrees_of_freedom_below_dimension() {
        let mut rng = StdRng::seed_from_u64(5);
        let scale = Mat::from_fn(3, 3, |i, j| if i == j { 1.0 } else { 0.0 });
        assert!(matches!(sample_wishart(&mut rng, 2.0, &scale), Err(EcoError::SolveFailed)));
        assert!(matches!(sample_wishart(&mut rng, 0.0, &scale), Err(EcoError::SolveFailed)));
        let draw = sample_wishart(&mut rng, 2.5, &scale).expect("df above d - 1");
        assert!((0..3).all(|idx| draw[(idx, idx)] > 0.0));
    }

    #[test]
    fn inverse_cdf_index_breaks_ties_by_order() {
        let cumulative = [0.0, 0.5, 0.5, 1.0];
        assert_eq!(inverse_cdf_index(&cumulative, 0.25), 1);
        assert_eq!(inverse_cdf_index(&cumulative, 0.0), 1);
        assert_eq!(inverse_cdf_index(&cumulative, 0.5), 3);
        assert_eq!(inverse_cdf_index(&cumulative, 1.0), 3);
    }

    #[test]
    fn log_weight_draw_skips_impossible_outcomes() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut buffer = Vec::new();
        for _ in 0..200 {
            let index =
                sample_from_log_weights(&mut rng, &[f64::NEG_INFINITY, -1_000.0, f64::NEG_INFINITY], &mut buffer);
            assert_eq!(index, 1);
        }
    }
}
