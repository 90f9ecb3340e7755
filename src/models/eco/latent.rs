//! Per-unit imputation of the latent proportions.

use std::borrow::Cow;

use faer::Mat;
use rand::RngExt;
use rand::rngs::StdRng;

use crate::inference::ProposalStats;

use super::bounds::{GridPoint, Unit, UnitBounds, UnitKind, build_grid, w2_on_line};
use super::link::LinkFunction;
use super::niw::GaussianParams;
use super::population::PopulationUpdater;
use super::random::{sample_from_log_weights, sample_open_unit, sample_standard_normal};
use super::types::{EcoError, LatentMethod};

/// Column of the contextual covariate in the transformed latent matrix.
const X_STAR_COLUMN: usize = 2;

/// Current latent proportions and their transforms.
#[derive(Debug, Clone)]
pub struct LatentState {
    /// `t x 2` matrix of `(W1, W2)`.
    pub w: Mat<f64>,
    /// `t x d` matrix of `(W1*, W2*)`, plus `X*` under the contextual model.
    pub w_star: Mat<f64>,
}

impl LatentState {
    /// Start from each unit's initial pair.
    ///
    /// Under the contextual model every unit must carry `X`; units without one
    /// get `X* = 0`, which callers prevent through unit construction.
    #[must_use]
    pub fn initialize(units: &[Unit], link: LinkFunction, contextual: bool) -> Self {
        let dim = if contextual { 3 } else { 2 };
        let w = Mat::from_fn(units.len(), 2, |row, col| units[row].w[col]);
        let w_star = Mat::from_fn(units.len(), dim, |row, col| {
            if col == X_STAR_COLUMN {
                units[row].x.map_or(0.0, |x| link.forward(x))
            } else {
                link.forward(units[row].w[col])
            }
        });
        Self { w, w_star }
    }

    #[must_use]
    pub fn n_units(&self) -> usize {
        self.w.nrows()
    }

    #[must_use]
    pub fn is_contextual(&self) -> bool {
        self.w_star.ncols() > X_STAR_COLUMN
    }

    /// Transformed covariate of `unit` under the contextual model.
    #[must_use]
    pub fn x_star(&self, unit: usize) -> Option<f64> {
        self.is_contextual().then(|| self.w_star[(unit, X_STAR_COLUMN)])
    }

    fn set_pair(&mut self, unit: usize, w: [f64; 2], w_star: [f64; 2]) {
        for col in 0..2 {
            self.w[(unit, col)] = w[col];
            self.w_star[(unit, col)] = w_star[col];
        }
    }
}

/// Density of `(W1*, W2*)` for one unit, conditioned on `X*` when present.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if the covariance block cannot be inverted.
pub fn pair_density(
    params: &GaussianParams,
    x_star: Option<f64>,
) -> Result<Cow<'_, GaussianParams>, EcoError> {
    match x_star {
        Some(value) => Ok(Cow::Owned(params.conditional(&[X_STAR_COLUMN], &[value])?)),
        None => Ok(Cow::Borrowed(params)),
    }
}

/// Log density of a point on the tomography line, including the Jacobian of
/// the link transform.
#[must_use]
pub fn line_log_density(density: &GaussianParams, link: LinkFunction, w1: f64, w2: f64) -> f64 {
    density.log_density(&[link.forward(w1), link.forward(w2)])
        + link.log_derivative(w1)
        + link.log_derivative(w2)
}

/// Imputes the unobserved proportions of every unit, one sweep at a time.
#[derive(Debug, Clone)]
pub struct LatentSampler {
    link: LinkFunction,
    method: LatentMethod,
    grids: Vec<Vec<GridPoint>>,
    max_grid: usize,
    stats: ProposalStats,
}

impl LatentSampler {
    /// Build grids for mixed units when the grid method is selected.
    #[must_use]
    pub fn new(units: &[Unit], link: LinkFunction, method: LatentMethod, grid_steps: usize) -> Self {
        let grids: Vec<Vec<GridPoint>> = units
            .iter()
            .map(|unit| match (method, unit.kind, unit.x, unit.y, unit.bounds) {
                (LatentMethod::Grid, UnitKind::Mixed, Some(x), Some(y), Some(bounds)) => {
                    build_grid(x, y, &bounds, grid_steps, link)
                }
                _ => Vec::new(),
            })
            .collect();
        let max_grid = grids.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            link,
            method,
            grids,
            max_grid,
            stats: ProposalStats::default(),
        }
    }

    /// Candidate points of `unit` (empty unless it is mixed and sampled on a grid).
    #[must_use]
    pub fn grid(&self, unit: usize) -> &[GridPoint] {
        self.grids.get(unit).map_or(&[], Vec::as_slice)
    }

    /// Metropolis counters accumulated so far.
    #[must_use]
    pub const fn proposal_stats(&self) -> ProposalStats {
        self.stats
    }

    /// Resample the latents of every non-survey unit given the population.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if a conditional covariance breaks down.
    pub fn sweep<P: PopulationUpdater + ?Sized>(
        &mut self,
        rng: &mut StdRng,
        units: &[Unit],
        state: &mut LatentState,
        population: &P,
    ) -> Result<(), EcoError> {
        let mut log_weights = Vec::with_capacity(self.max_grid);
        let mut cumulative = Vec::with_capacity(self.max_grid);

        for (idx, unit) in units.iter().enumerate() {
            let params = population.unit_params(idx);
            match unit.kind {
                UnitKind::Known => {}
                UnitKind::Mixed => {
                    let (Some(x), Some(y), Some(bounds)) = (unit.x, unit.y, unit.bounds) else {
                        continue;
                    };
                    let density = pair_density(params, state.x_star(idx))?;
                    match self.method {
                        LatentMethod::Grid => {
                            let grid = &self.grids[idx];
                            log_weights.clear();
                            log_weights.extend(
                                grid.iter()
                                    .map(|point| density.log_density(&point.w_star) + point.log_jacobian),
                            );
                            let pick = sample_from_log_weights(rng, &log_weights, &mut cumulative);
                            if let Some(point) = grid.get(pick) {
                                state.set_pair(idx, point.w, point.w_star);
                            }
                        }
                        LatentMethod::Metropolis => {
                            let current = [state.w[(idx, 0)], state.w[(idx, 1)]];
                            let next = self.metropolis_step(rng, x, y, &bounds, current, &density);
                            state.set_pair(
                                idx,
                                next,
                                [self.link.forward(next[0]), self.link.forward(next[1])],
                            );
                        }
                    }
                }
                UnitKind::KnownW1 | UnitKind::KnownW2 => {
                    let free = usize::from(unit.kind == UnitKind::KnownW1);
                    let value = self.homogeneous_draw(rng, idx, free, state, params)?;
                    state.w[(idx, free)] = value;
                    state.w_star[(idx, free)] = self.link.forward(value);
                }
            }
        }
        Ok(())
    }

    /// Independence Metropolis with a uniform proposal on the open interval
    /// `(w1_min, w1_max)`.
    fn metropolis_step(
        &mut self,
        rng: &mut StdRng,
        x: f64,
        y: f64,
        bounds: &UnitBounds,
        current: [f64; 2],
        density: &GaussianParams,
    ) -> [f64; 2] {
        let w1 = sample_open_unit(rng).mul_add(bounds.width(), bounds.w1_min);
        let w2 = w2_on_line(x, y, w1);
        let proposed = line_log_density(density, self.link, w1, w2);
        let existing = line_log_density(density, self.link, current[0], current[1]);
        let log_ratio = proposed - existing;
        let accepted = log_ratio.is_finite() && (log_ratio >= 0.0 || rng.random::<f64>().ln() < log_ratio);
        self.stats.record(accepted);
        if accepted { [w1, w2] } else { current }
    }

    /// Exact conditional draw of the unobserved coordinate `free` given the
    /// observed one (and `X*` under the contextual model).
    fn homogeneous_draw(
        &self,
        rng: &mut StdRng,
        unit: usize,
        free: usize,
        state: &LatentState,
        params: &GaussianParams,
    ) -> Result<f64, EcoError> {
        let observed = 1 - free;
        let conditional = match state.x_star(unit) {
            Some(x_star) => params.conditional(
                &[observed, X_STAR_COLUMN],
                &[state.w_star[(unit, observed)], x_star],
            )?,
            None => params.conditional(&[observed], &[state.w_star[(unit, observed)]])?,
        };
        let sd = conditional.covariance()[(0, 0)].max(0.0).sqrt();
        let z = sd.mul_add(sample_standard_normal(rng), conditional.mean()[0]);
        Ok(self.link.inverse_clamped(z))
    }
}
