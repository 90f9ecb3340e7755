//! 2xC ecological inference under a single Normal/Inverse-Wishart population.
//!
//! Each unit carries `C` latent proportions `W_j` with `Y = sum_j X_j W_j`.
//! Sampling works on the shares `U_j = W_j X_j / Y`, which lie on the simplex,
//! so a Dirichlet(1, ..., 1) draw always satisfies the margin. The
//! deterministic bounds on `W` become bounds on `U`.

use faer::Mat;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::inference::{CancellationToken, ProposalStats};
use crate::input::MultiColumnInput;

use super::link::LinkFunction;
use super::niw::GaussianParams;
use super::parametric::ParametricPopulation;
use super::population::PopulationUpdater;
use super::posterior::{EcoPosteriorDraw, EcoPosteriorSamples, summarize_posterior};
use super::random::{sample_dirichlet, sample_open_unit};
use super::recorder::DrawRecorder;
use super::sampler::Progress;
use super::types::{
    EcoError, EcoModel, EcoReport, EcoSamplerDiagnostics, MultiColumnConfig, PopulationModel,
};

/// Dirichlet draws tried before a unit's bounds are declared infeasible.
pub const MAX_REJECTION_ATTEMPTS: usize = 100_000;

const LINK: LinkFunction = LinkFunction::Logit;

/// Per-unit margins and share bounds.
#[derive(Debug, Clone)]
struct ShareUnit {
    x: Vec<f64>,
    y: f64,
    u_min: Vec<f64>,
    u_max: Vec<f64>,
    /// `Y` is 0 or 1, so every `W_j` equals `Y` and nothing is sampled.
    degenerate: bool,
}

impl ShareUnit {
    fn from_row(input: &MultiColumnInput, row: usize) -> Self {
        let columns = input.n_columns();
        let y = input.y[row];
        let x: Vec<f64> = (0..columns).map(|col| input.x[(row, col)]).collect();
        let degenerate = y <= 0.0 || y >= 1.0;
        let (u_min, u_max) = if degenerate {
            (vec![0.0; columns], vec![1.0; columns])
        } else {
            (0..columns)
                .map(|col| {
                    let scale = x[col] / y;
                    (
                        (input.w_min[(row, col)] * scale).max(0.0),
                        (input.w_max[(row, col)] * scale).min(1.0),
                    )
                })
                .unzip()
        };
        Self {
            x,
            y,
            u_min,
            u_max,
            degenerate,
        }
    }

    fn contains(&self, shares: &[f64]) -> bool {
        shares
            .iter()
            .zip(self.u_min.iter().zip(&self.u_max))
            .all(|(u, (lo, hi))| (*lo..=*hi).contains(u))
    }

    fn proportions(&self, shares: &[f64]) -> Vec<f64> {
        shares
            .iter()
            .zip(&self.x)
            .map(|(u, x)| u * self.y / x)
            .collect()
    }

    /// Up to `attempts` Dirichlet(1) draws; the first one inside the bounds.
    fn draw_shares(&self, rng: &mut StdRng, attempts: usize) -> Option<Vec<f64>> {
        let ones = vec![1.0; self.x.len()];
        (0..attempts)
            .map(|_| sample_dirichlet(rng, &ones))
            .find(|shares| self.contains(shares))
    }
}

/// Log target of one unit's proportions: the Normal density of `logit(W)`
/// plus the log-Jacobian of the transform.
fn log_target(params: &GaussianParams, w: &[f64]) -> f64 {
    if w.iter().any(|value| *value <= 0.0 || *value >= 1.0) {
        return f64::NEG_INFINITY;
    }
    let w_star: Vec<f64> = w.iter().map(|value| LINK.forward(*value)).collect();
    params.log_density(&w_star) + w.iter().map(|value| LINK.log_derivative(*value)).sum::<f64>()
}

/// Latent proportions of every unit and their logits.
#[derive(Debug, Clone)]
struct ShareState {
    w: Mat<f64>,
    w_star: Mat<f64>,
}

impl ShareState {
    fn initialize(rng: &mut StdRng, units: &[ShareUnit]) -> Result<Self, EcoError> {
        let columns = units.first().map_or(0, |unit| unit.x.len());
        let mut state = Self {
            w: Mat::zeros(units.len(), columns),
            w_star: Mat::zeros(units.len(), columns),
        };
        for (idx, unit) in units.iter().enumerate() {
            if unit.degenerate {
                state.set_row(idx, &vec![LinkFunction::clamp(unit.y); columns]);
                continue;
            }
            let shares = unit
                .draw_shares(rng, MAX_REJECTION_ATTEMPTS)
                .ok_or(EcoError::InfeasibleBounds {
                    unit: idx,
                    attempts: MAX_REJECTION_ATTEMPTS,
                })?;
            state.set_row(idx, &unit.proportions(&shares));
        }
        Ok(state)
    }

    fn row(&self, unit: usize) -> Vec<f64> {
        (0..self.w.ncols()).map(|col| self.w[(unit, col)]).collect()
    }

    fn set_row(&mut self, unit: usize, w: &[f64]) {
        for (col, value) in w.iter().enumerate() {
            self.w[(unit, col)] = *value;
            self.w_star[(unit, col)] = LINK.forward(*value);
        }
    }
}

/// Independence Metropolis-Hastings update of every non-degenerate unit.
///
/// The Dirichlet(1) proposal density is flat on the simplex, so the
/// acceptance ratio reduces to the ratio of targets.
fn sweep_units(
    rng: &mut StdRng,
    units: &[ShareUnit],
    state: &mut ShareState,
    params: &GaussianParams,
    rejection: bool,
    stats: &mut ProposalStats,
) {
    let attempts = if rejection { MAX_REJECTION_ATTEMPTS } else { 1 };
    for (idx, unit) in units.iter().enumerate() {
        if unit.degenerate {
            continue;
        }
        let Some(shares) = unit.draw_shares(rng, attempts) else {
            stats.record(false);
            continue;
        };
        let proposal = unit.proportions(&shares);
        let log_ratio = log_target(params, &proposal) - log_target(params, &state.row(idx));
        let accepted = sample_open_unit(rng).ln() < log_ratio;
        if accepted {
            state.set_row(idx, &proposal);
        }
        stats.record(accepted);
    }
}

/// Fit the 2xC model and return posterior draws.
///
/// # Errors
///
/// Returns `EcoError` if input or configuration is invalid, if a unit's
/// bounds admit no starting point within `MAX_REJECTION_ATTEMPTS` draws, or
/// if a conjugate draw breaks down numerically.
pub fn fit_multi_column_input(
    input: &MultiColumnInput,
    config: &MultiColumnConfig,
) -> Result<(EcoModel, EcoReport, EcoPosteriorSamples), EcoError> {
    fit_multi_column_input_with_cancellation(input, config, &CancellationToken::new())
}

/// Like `fit_multi_column_input`, stopping before the next sweep once
/// `token` is cancelled.
///
/// # Errors
///
/// Same as `fit_multi_column_input`.
pub fn fit_multi_column_input_with_cancellation(
    input: &MultiColumnInput,
    config: &MultiColumnConfig,
    token: &CancellationToken,
) -> Result<(EcoModel, EcoReport, EcoPosteriorSamples), EcoError> {
    input.validate()?;
    let columns = input.n_columns();
    config.validate(columns)?;

    let units: Vec<ShareUnit> = (0..input.n_units())
        .map(|row| ShareUnit::from_row(input, row))
        .collect();
    let degenerate = units.iter().filter(|unit| unit.degenerate).count();
    let model = EcoModel {
        n_units: units.len(),
        n_mixed: units.len() - degenerate,
        n_homogeneous: 0,
        n_known: degenerate,
        dimension: columns,
        link: LINK,
        model: PopulationModel::Parametric,
    };
    debug!(
        units = model.n_units,
        columns,
        rejection = config.rejection,
        retained = config.schedule.retained_draws(),
        "starting 2xC sampler"
    );

    let schedule = config.schedule;
    let mut rng = StdRng::seed_from_u64(schedule.seed);
    let prior = config.resolved_prior(columns);
    let start = GaussianParams::new(prior.mu0.clone(), prior.s0.clone())?;
    let mut population = ParametricPopulation::new(prior, start, units.len());
    let mut state = ShareState::initialize(&mut rng, &units)?;

    let progress = Progress::new(schedule);
    let mut recorder = DrawRecorder::new(schedule);
    let mut stats = ProposalStats::default();
    let mut diagnostics = EcoSamplerDiagnostics::default();

    for sweep in 0..schedule.n_draws {
        if token.is_cancelled() {
            info!(sweep, retained = recorder.len(), "sampler cancelled");
            diagnostics.cancelled = true;
            break;
        }

        sweep_units(
            &mut rng,
            &units,
            &mut state,
            population.params(),
            config.rejection,
            &mut stats,
        );
        population.update(&mut rng, &state.w_star)?;

        if recorder.should_record(sweep) {
            recorder.push(EcoPosteriorDraw {
                population: population.snapshot(),
                w: state.w.clone(),
                predictive: None,
                log_likelihood: None,
            });
        }

        diagnostics.sweeps_completed += 1;
        progress.tick(sweep);
    }

    let samples = recorder.finish();
    diagnostics.retained_draws = samples.len();
    if stats.proposed > 0 {
        diagnostics.metropolis_acceptance = Some(stats.acceptance_rate());
    }
    let report = EcoReport {
        diagnostics,
        posterior_summary: Some(summarize_posterior(&samples)),
    };
    Ok((model, report, samples))
}
