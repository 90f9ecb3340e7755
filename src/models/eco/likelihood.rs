//! Tomography-line likelihood of mixed units.
//!
//! The line of unit `i` is parametrized by `t` as
//! `W1(t) = lb1 + (ub1 - lb1) t` and `W2(t) = ub2 + (lb2 - ub2) t`. The
//! likelihood is the line integral of the Normal density of the transformed
//! pair, `int phi(W*(t); mu, Sigma) |dW*/dt| dt`, over `[1e-5, 1 - 1e-5]`.

use super::bounds::{Unit, UnitBounds, UnitKind};
use super::integrate::{IntegrationStatus, QuadratureOptions, QuadratureResult, integrate};
use super::latent::{LatentState, pair_density};
use super::link::LinkFunction;
use super::niw::GaussianParams;
use super::population::PopulationUpdater;
use super::types::EcoError;

const LINE_LOWER: f64 = 1.0e-5;
const LINE_UPPER: f64 = 1.0 - 1.0e-5;

/// Line integral of the transformed-pair density for one mixed unit.
#[must_use]
pub fn unit_line_integral(
    bounds: &UnitBounds,
    density: &GaussianParams,
    link: LinkFunction,
    options: QuadratureOptions,
) -> QuadratureResult {
    let slope1 = bounds.w1_max - bounds.w1_min;
    let slope2 = bounds.w2_min - bounds.w2_max;
    let integrand = |t: f64| {
        let w1 = slope1.mul_add(t, bounds.w1_min);
        let w2 = slope2.mul_add(t, bounds.w2_max);
        let d1 = slope1 * link.log_derivative(w1).exp();
        let d2 = slope2 * link.log_derivative(w2).exp();
        let log_density = density.log_density(&[link.forward(w1), link.forward(w2)]);
        log_density.exp() * d1.hypot(d2)
    };
    integrate(integrand, LINE_LOWER, LINE_UPPER, options)
}

/// Log-likelihood of one mixed unit; the error bound is propagated to the
/// log scale.
#[must_use]
pub fn unit_log_likelihood(
    bounds: &UnitBounds,
    density: &GaussianParams,
    link: LinkFunction,
    options: QuadratureOptions,
) -> QuadratureResult {
    let integral = unit_line_integral(bounds, density, link, options);
    let value = integral.value.ln();
    let status = if value.is_finite() {
        integral.status
    } else {
        IntegrationStatus::NonFinite
    };
    QuadratureResult {
        value,
        abs_error: integral.abs_error / integral.value.abs(),
        status,
    }
}

/// Total over all mixed units, with the number of units whose quadrature did
/// not converge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineLikelihood {
    pub total: QuadratureResult,
    pub non_converged: usize,
}

/// Sum of `unit_log_likelihood` over the mixed units under the current
/// population.
///
/// Non-converged units contribute their best estimate; `total.status` is the
/// first non-converged status encountered.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if a conditional covariance breaks down.
pub fn total_log_likelihood<P: PopulationUpdater + ?Sized>(
    units: &[Unit],
    state: &LatentState,
    population: &P,
    link: LinkFunction,
    options: QuadratureOptions,
) -> Result<LineLikelihood, EcoError> {
    let mut value = 0.0;
    let mut abs_error = 0.0;
    let mut status = IntegrationStatus::Converged;
    let mut non_converged = 0;
    for (idx, unit) in units.iter().enumerate() {
        let (UnitKind::Mixed, Some(bounds)) = (unit.kind, unit.bounds) else {
            continue;
        };
        let density = pair_density(population.unit_params(idx), state.x_star(idx))?;
        let result = unit_log_likelihood(&bounds, &density, link, options);
        value += result.value;
        abs_error += result.abs_error;
        if !result.is_converged() {
            non_converged += 1;
            if status == IntegrationStatus::Converged {
                status = result.status;
            }
        }
    }
    Ok(LineLikelihood {
        total: QuadratureResult {
            value,
            abs_error,
            status,
        },
        non_converged,
    })
}
