//! Link functions between bounded proportions and the real line.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;

/// Proportions are kept this far away from exact 0 and 1.
pub const EPS_PROPORTION: f64 = 1.0e-6;

/// Bijection `(0, 1) -> R` used to model latent proportions on a Normal scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkFunction {
    /// `ln(p / (1 - p))`.
    #[default]
    Logit,
    /// Standard normal quantile.
    Probit,
    /// `ln(-ln(1 - p))`.
    ComplementaryLogLog,
}

impl LinkFunction {
    /// Bound a proportion away from exact 0 and 1.
    #[must_use]
    pub fn clamp(p: f64) -> f64 {
        p.clamp(EPS_PROPORTION, 1.0 - EPS_PROPORTION)
    }

    /// Map a proportion to the unconstrained scale.
    #[must_use]
    pub fn forward(self, p: f64) -> f64 {
        let p = Self::clamp(p);
        match self {
            Self::Logit => p.ln() - (-p).ln_1p(),
            Self::Probit => Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| normal.inverse_cdf(p)),
            Self::ComplementaryLogLog => (-(-p).ln_1p()).ln(),
        }
    }

    /// Map an unconstrained value back to a proportion.
    #[must_use]
    pub fn inverse(self, z: f64) -> f64 {
        match self {
            Self::Logit => logistic_stable(z),
            Self::Probit => 0.5 * erfc(-z / std::f64::consts::SQRT_2),
            Self::ComplementaryLogLog => -(-z.exp()).exp_m1(),
        }
    }

    /// `ln |d forward / dp|` at `p`.
    #[must_use]
    pub fn log_derivative(self, p: f64) -> f64 {
        let p = Self::clamp(p);
        match self {
            Self::Logit => -p.ln() - (-p).ln_1p(),
            Self::Probit => {
                let z = self.forward(p);
                0.5 * z.mul_add(z, std::f64::consts::TAU.ln())
            }
            Self::ComplementaryLogLog => {
                let log_survival = (-p).ln_1p();
                -log_survival - (-log_survival).ln()
            }
        }
    }

    /// Transform a proportion and clamp the back-transformed value into `(0, 1)`.
    #[must_use]
    pub fn inverse_clamped(self, z: f64) -> f64 {
        Self::clamp(self.inverse(z))
    }
}

/// Stable logistic transform.
#[must_use]
pub fn logistic_stable(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const LINKS: [LinkFunction; 3] = [
        LinkFunction::Logit,
        LinkFunction::Probit,
        LinkFunction::ComplementaryLogLog,
    ];

    #[test]
    fn round_trip_recovers_proportion() {
        for link in LINKS {
            for p in [2.0e-6, 0.01, 0.2, 0.5, 0.77, 0.99, 1.0 - 2.0e-6] {
                let back = link.inverse(link.forward(p));
                assert_relative_eq!(back, p, epsilon = 1.0e-9);
            }
        }
    }

    #[test]
    fn forward_is_finite_at_boundaries() {
        for link in LINKS {
            assert!(link.forward(0.0).is_finite());
            assert!(link.forward(1.0).is_finite());
        }
    }

    #[test]
    fn log_derivative_matches_finite_difference() {
        let h = 1.0e-6;
        for link in LINKS {
            for p in [0.1, 0.4, 0.85] {
                let numeric = (link.forward(p + h) - link.forward(p - h)) / (2.0 * h);
                assert_relative_eq!(link.log_derivative(p), numeric.ln(), epsilon = 1.0e-5);
            }
        }
    }

    #[test]
    fn logistic_is_bounded() {
        assert!(logistic_stable(-1_000.0) >= 0.0);
        assert!(logistic_stable(1_000.0) <= 1.0);
    }
}
