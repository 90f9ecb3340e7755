//! Adaptive Gauss–Kronrod (7/15) quadrature on a finite interval.
//!
//! Failures are reported through `IntegrationStatus` alongside the best
//! available estimate instead of aborting the caller.

const KRONROD_NODES: [f64; 8] = [
    0.991_455_371_120_812_6,
    0.949_107_912_342_758_5,
    0.864_864_423_359_769_1,
    0.741_531_185_599_394_4,
    0.586_087_235_467_691_1,
    0.405_845_151_377_397_2,
    0.207_784_955_007_898_5,
    0.0,
];

const KRONROD_WEIGHTS: [f64; 8] = [
    0.022_935_322_010_529_22,
    0.063_092_092_629_978_55,
    0.104_790_010_322_250_18,
    0.140_653_259_715_525_92,
    0.169_004_726_639_267_9,
    0.190_350_578_064_785_4,
    0.204_432_940_075_298_9,
    0.209_482_141_084_727_83,
];

/// Gauss weights for the odd-indexed Kronrod nodes.
const GAUSS_WEIGHTS: [f64; 4] = [
    0.129_484_966_168_869_7,
    0.279_705_391_489_276_7,
    0.381_830_050_505_118_9,
    0.417_959_183_673_469_4,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStatus {
    Converged,
    /// The subdivision limit was reached before the tolerance was met.
    SubdivisionLimit,
    /// Further bisection stopped improving the error estimate.
    Roundoff,
    /// The integrand returned a non-finite value.
    NonFinite,
}

/// Estimate with its absolute error bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureResult {
    pub value: f64,
    pub abs_error: f64,
    pub status: IntegrationStatus,
}

impl QuadratureResult {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status == IntegrationStatus::Converged
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuadratureOptions {
    pub abs_tol: f64,
    pub rel_tol: f64,
    pub max_subdivisions: usize,
}

impl Default for QuadratureOptions {
    fn default() -> Self {
        Self {
            abs_tol: 1.0e-9,
            rel_tol: 1.0e-9,
            max_subdivisions: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    lower: f64,
    upper: f64,
    value: f64,
    error: f64,
}

fn kronrod_segment<F: FnMut(f64) -> f64>(f: &mut F, lower: f64, upper: f64) -> Segment {
    let center = 0.5 * (lower + upper);
    let half = 0.5 * (upper - lower);
    let f_center = f(center);

    let mut kronrod = f_center * KRONROD_WEIGHTS[7];
    let mut gauss = f_center * GAUSS_WEIGHTS[3];
    let mut abs_sum = f_center.abs() * KRONROD_WEIGHTS[7];
    let mut values = [(0.0, 0.0); 7];
    for (idx, node) in KRONROD_NODES.iter().take(7).enumerate() {
        let offset = half * node;
        let left = f(center - offset);
        let right = f(center + offset);
        values[idx] = (left, right);
        kronrod += KRONROD_WEIGHTS[idx] * (left + right);
        abs_sum += KRONROD_WEIGHTS[idx] * (left.abs() + right.abs());
        if idx % 2 == 1 {
            gauss += GAUSS_WEIGHTS[idx / 2] * (left + right);
        }
    }

    let mean = 0.5 * kronrod;
    let mut asc = KRONROD_WEIGHTS[7] * (f_center - mean).abs();
    for (idx, (left, right)) in values.iter().enumerate() {
        asc += KRONROD_WEIGHTS[idx] * ((left - mean).abs() + (right - mean).abs());
    }

    let value = kronrod * half;
    let abs_scale = abs_sum * half.abs();
    let asc_scale = asc * half.abs();
    let mut error = ((kronrod - gauss) * half).abs();
    if asc_scale != 0.0 && error != 0.0 {
        error = asc_scale * (200.0 * error / asc_scale).powf(1.5).min(1.0);
    }
    let roundoff = 50.0 * f64::EPSILON * abs_scale;
    if abs_scale > f64::MIN_POSITIVE / (50.0 * f64::EPSILON) {
        error = error.max(roundoff);
    }
    Segment {
        lower,
        upper,
        value,
        error,
    }
}

/// Integrate `f` over `[lower, upper]`, bisecting the segment with the largest
/// error estimate until the tolerance is met.
pub fn integrate<F: FnMut(f64) -> f64>(
    mut f: F,
    lower: f64,
    upper: f64,
    options: QuadratureOptions,
) -> QuadratureResult {
    let first = kronrod_segment(&mut f, lower, upper);
    let mut segments = vec![first];
    let mut roundoff_events = 0_usize;

    loop {
        let value = segments.iter().map(|segment| segment.value).sum::<f64>();
        let abs_error = segments.iter().map(|segment| segment.error).sum::<f64>();
        let tolerance = options.abs_tol.max(options.rel_tol * value.abs());

        let status = if !value.is_finite() || !abs_error.is_finite() {
            Some(IntegrationStatus::NonFinite)
        } else if abs_error <= tolerance {
            Some(IntegrationStatus::Converged)
        } else if segments.len() >= options.max_subdivisions {
            Some(IntegrationStatus::SubdivisionLimit)
        } else if roundoff_events >= 10 {
            Some(IntegrationStatus::Roundoff)
        } else {
            None
        };
        if let Some(status) = status {
            return QuadratureResult {
                value,
                abs_error,
                status,
            };
        }

        let worst = segments
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.error.total_cmp(&b.error))
            .map_or(0, |(idx, _)| idx);
        let parent = segments.swap_remove(worst);
        let mid = 0.5 * (parent.lower + parent.upper);
        let left = kronrod_segment(&mut f, parent.lower, mid);
        let right = kronrod_segment(&mut f, mid, parent.upper);
        if left.error + right.error >= parent.error
            && ((left.value + right.value) - parent.value).abs() <= 1.0e-5 * parent.value.abs()
        {
            roundoff_events += 1;
        }
        segments.push(left);
        segments.push(right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn polynomial_is_exact() {
        let result = integrate(|x| 3.0 * x * x, 0.0, 2.0, QuadratureOptions::default());
        assert!(result.is_converged());
        assert_relative_eq!(result.value, 8.0, epsilon = 1.0e-12);
    }

    #[test]
    fn gaussian_bump_converges() {
        let result = integrate(
            |x| (-0.5 * x * x).exp(),
            -10.0,
            10.0,
            QuadratureOptions::default(),
        );
        assert!(result.is_converged());
        assert_relative_eq!(result.value, std::f64::consts::TAU.sqrt(), epsilon = 1.0e-9);
    }

    #[test]
    fn endpoint_singularity_is_handled() {
        let result = integrate(|x| 1.0 / x.sqrt(), 1.0e-10, 1.0, QuadratureOptions::default());
        assert_relative_eq!(result.value, 2.0, epsilon = 1.0e-4);
    }

    #[test]
    fn tight_limit_reports_non_convergence_with_estimate() {
        let options = QuadratureOptions {
            max_subdivisions: 2,
            ..QuadratureOptions::default()
        };
        let result = integrate(|x| (50.0 * x).sin().abs(), 0.0, 3.0, options);
        assert_eq!(result.status, IntegrationStatus::SubdivisionLimit);
        assert!(result.value.is_finite());
        assert!(result.abs_error > 0.0);
    }

    #[test]
    fn non_finite_integrand_is_flagged() {
        let result = integrate(|_| f64::NAN, 0.0, 1.0, QuadratureOptions::default());
        assert_eq!(result.status, IntegrationStatus::NonFinite);
    }
}
