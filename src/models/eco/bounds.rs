//! Deterministic bounds, unit classification and tomography-line grids.

use num_traits::ToPrimitive;

use crate::input::EcoInput;
use crate::utils::usize_to_f64;

use super::link::LinkFunction;
use super::types::EcoError;

/// How much of a unit's latent pair is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// `0 < X < 1`: the pair lies on the tomography line.
    Mixed,
    /// `X = 1`: `W1` equals the margin, `W2` is unobserved.
    KnownW1,
    /// `X = 0`: `W2` equals the margin, `W1` is unobserved.
    KnownW2,
    /// Both coordinates observed (survey units or `Y` in `{0, 1}`).
    Known,
}

/// Feasible interval of `W1` and the implied interval of `W2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitBounds {
    pub w1_min: f64,
    pub w1_max: f64,
    pub w2_min: f64,
    pub w2_max: f64,
}

impl UnitBounds {
    /// Bounds for a unit with `0 < x < 1`.
    #[must_use]
    pub fn from_margins(x: f64, y: f64) -> Self {
        let w1_min = ((x + y - 1.0) / x).max(0.0);
        let w1_max = (y / x).min(1.0);
        Self {
            w1_min,
            w1_max,
            w2_min: w2_on_line(x, y, w1_max),
            w2_max: w2_on_line(x, y, w1_min),
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.w1_max - self.w1_min
    }

    #[must_use]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.w1_min + self.w1_max)
    }
}

/// `W2` implied by `W1` through `Y = X W1 + (1 - X) W2`.
#[must_use]
pub fn w2_on_line(x: f64, y: f64, w1: f64) -> f64 {
    (y - x * w1) / (1.0 - x)
}

/// One candidate point on a unit's tomography line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub w: [f64; 2],
    pub w_star: [f64; 2],
    /// `ln|dW1*/dW1| + ln|dW2*/dW2|`.
    pub log_jacobian: f64,
}

impl GridPoint {
    #[must_use]
    pub fn new(x: f64, y: f64, w1: f64, link: LinkFunction) -> Self {
        let w2 = w2_on_line(x, y, w1);
        Self {
            w: [w1, w2],
            w_star: [link.forward(w1), link.forward(w2)],
            log_jacobian: link.log_derivative(w1) + link.log_derivative(w2),
        }
    }
}

/// Candidate points for a mixed unit with grid step `1 / n_step`.
///
/// Wide intervals get `floor(width * n_step)` points centered in the
/// interval; intervals no wider than two steps get two points at one and two
/// thirds of the width.
#[must_use]
pub fn build_grid(x: f64, y: f64, bounds: &UnitBounds, n_step: usize, link: LinkFunction) -> Vec<GridPoint> {
    let steps = usize_to_f64(n_step);
    let step = 1.0 / steps;
    let width = bounds.width();
    if width > 2.0 * step {
        let Some(n_points) = (width * steps).floor().to_usize() else {
            return Vec::new();
        };
        let resid = width - usize_to_f64(n_points) * step;
        (0..n_points)
            .map(|j| {
                let mut w1 = usize_to_f64(j + 1)
                    .mul_add(step, bounds.w1_min)
                    - 0.5 * (step + resid);
                if w1 - bounds.w1_min < 0.5 * resid {
                    w1 += 0.5 * resid;
                }
                if bounds.w1_max - w1 < 0.5 * resid {
                    w1 -= 0.5 * resid;
                }
                GridPoint::new(x, y, w1, link)
            })
            .collect()
    } else {
        [1.0_f64 / 3.0, 2.0 / 3.0]
            .into_iter()
            .map(|fraction| GridPoint::new(x, y, fraction.mul_add(width, bounds.w1_min), link))
            .collect()
    }
}

/// A unit as seen by the sampler.
#[derive(Debug, Clone)]
pub struct Unit {
    pub kind: UnitKind,
    /// `None` only for survey units supplied without `X`.
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Present for mixed units.
    pub bounds: Option<UnitBounds>,
    /// Starting pair; observed coordinates never change.
    pub w: [f64; 2],
}

impl Unit {
    fn known_w1(x: f64, y: f64) -> Self {
        Self {
            kind: UnitKind::KnownW1,
            x: Some(x),
            y: Some(y),
            bounds: None,
            w: [LinkFunction::clamp(y), 0.5],
        }
    }

    fn known_w2(x: f64, y: f64) -> Self {
        Self {
            kind: UnitKind::KnownW2,
            x: Some(x),
            y: Some(y),
            bounds: None,
            w: [0.5, LinkFunction::clamp(y)],
        }
    }

    fn known(x: Option<f64>, y: Option<f64>, w1: f64, w2: f64) -> Self {
        Self {
            kind: UnitKind::Known,
            x,
            y,
            bounds: None,
            w: [LinkFunction::clamp(w1), LinkFunction::clamp(w2)],
        }
    }

    /// Classify a main-input unit from its margins.
    #[must_use]
    pub fn from_margins(x: f64, y: f64) -> Self {
        if x >= 1.0 {
            Self::known_w1(x, y)
        } else if x <= 0.0 {
            Self::known_w2(x, y)
        } else if y <= 0.0 || y >= 1.0 {
            Self::known(Some(x), Some(y), y, y)
        } else {
            let bounds = UnitBounds::from_margins(x, y);
            let w1 = bounds.midpoint();
            Self {
                kind: UnitKind::Mixed,
                x: Some(x),
                y: Some(y),
                bounds: Some(bounds),
                w: [w1, w2_on_line(x, y, w1)],
            }
        }
    }
}

/// Units in sampler order: main input, supplemental `X = 1`, supplemental
/// `X = 0`, then survey.
///
/// # Errors
///
/// Returns `EcoError::MissingSurveyCovariate` when `contextual` is set and
/// survey units carry no `X`.
pub fn build_units(input: &EcoInput, contextual: bool) -> Result<Vec<Unit>, EcoError> {
    let mut units = Vec::with_capacity(input.n_units());
    units.extend(input.x.iter().zip(&input.y).map(|(x, y)| Unit::from_margins(*x, *y)));
    units.extend(input.known_w1.iter().map(|w1| Unit::known_w1(1.0, *w1)));
    units.extend(input.known_w2.iter().map(|w2| Unit::known_w2(0.0, *w2)));

    if let Some(survey) = &input.survey {
        if contextual && survey.nrows() > 0 && input.survey_x.is_none() {
            return Err(EcoError::MissingSurveyCovariate);
        }
        for row in 0..survey.nrows() {
            let (w1, w2) = (survey[(row, 0)], survey[(row, 1)]);
            let x = input.survey_x.as_ref().map(|values| values[row]);
            let y = x.map(|x| x * w1 + (1.0 - x) * w2);
            units.push(Unit::known(x, y, w1, w2));
        }
    }
    Ok(units)
}
