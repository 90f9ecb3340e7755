//! Sampler entrypoints for 2x2 ecological inference.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::inference::{CancellationToken, McmcConfig};
use crate::input::EcoInput;

use super::bounds::{Unit, UnitKind, build_units};
use super::dirichlet::DirichletMixture;
use super::integrate::QuadratureOptions;
use super::latent::{LatentSampler, LatentState};
use super::likelihood::total_log_likelihood;
use super::parametric::ParametricPopulation;
use super::population::PopulationUpdater;
use super::posterior::{EcoPosteriorDraw, EcoPosteriorSamples, summarize_posterior};
use super::recorder::{DrawRecorder, predictive_draw};
use super::types::{
    EcoError, EcoModel, EcoReport, EcoSamplerConfig, EcoSamplerDiagnostics, LatentMethod,
    PopulationModel,
};

/// Logs progress in tenths of the run when enabled.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Progress {
    n_draws: usize,
    step: usize,
    enabled: bool,
}

impl Progress {
    pub(crate) fn new(schedule: McmcConfig) -> Self {
        Self {
            n_draws: schedule.n_draws,
            step: (schedule.n_draws / 10).max(1),
            enabled: schedule.verbose,
        }
    }

    pub(crate) fn tick(self, sweep: usize) {
        let done = sweep + 1;
        if self.enabled && (done.is_multiple_of(self.step) || done == self.n_draws) {
            info!(sweep = done, percent = done * 100 / self.n_draws, "sampler progress");
        }
    }
}

/// Everything the sweep loop reports back besides the population itself.
struct ChainOutcome {
    samples: EcoPosteriorSamples,
    sweeps_completed: usize,
    cancelled: bool,
    integration_warnings: usize,
}

/// Fit a 2x2 ecological inference model and return posterior draws.
///
/// # Errors
///
/// Returns `EcoError` if input or configuration is invalid, or if a conjugate
/// draw breaks down numerically.
pub fn fit_eco_input(
    input: &EcoInput,
    config: &EcoSamplerConfig,
) -> Result<(EcoModel, EcoReport, EcoPosteriorSamples), EcoError> {
    fit_eco_input_with_cancellation(input, config, &CancellationToken::new())
}

/// Like `fit_eco_input`, stopping before the next sweep once `token` is
/// cancelled. Draws recorded up to that point are returned and the report
/// is flagged as cancelled.
///
/// # Errors
///
/// Returns `EcoError` if input or configuration is invalid, or if a conjugate
/// draw breaks down numerically.
pub fn fit_eco_input_with_cancellation(
    input: &EcoInput,
    config: &EcoSamplerConfig,
    token: &CancellationToken,
) -> Result<(EcoModel, EcoReport, EcoPosteriorSamples), EcoError> {
    input.validate()?;
    config.validate()?;

    let units = build_units(input, config.contextual)?;
    let model = describe_model(&units, config);
    debug!(
        units = model.n_units,
        mixed = model.n_mixed,
        homogeneous = model.n_homogeneous,
        known = model.n_known,
        dimension = model.dimension,
        retained = config.schedule.retained_draws(),
        "starting ecological inference sampler"
    );

    let mut rng = StdRng::seed_from_u64(config.schedule.seed);
    let prior = config.resolved_prior();
    let mut state = LatentState::initialize(&units, config.link, config.contextual);
    let mut latent = LatentSampler::new(&units, config.link, config.latent_method, config.grid_steps);

    let mut diagnostics = EcoSamplerDiagnostics::default();
    let outcome = match config.model {
        PopulationModel::Parametric => {
            let mut population =
                ParametricPopulation::initialize(&mut rng, prior, config.start.as_ref(), units.len())?;
            run_chain(&mut rng, &units, &mut state, &mut latent, &mut population, config, token)?
        }
        PopulationModel::DirichletProcess => {
            let mut population =
                DirichletMixture::initialize(&mut rng, prior, config.dirichlet_prior, units.len())?;
            let outcome =
                run_chain(&mut rng, &units, &mut state, &mut latent, &mut population, config, token)?;
            diagnostics.final_concentration = Some(population.concentration());
            diagnostics.final_cluster_count = Some(population.cluster_count());
            outcome
        }
    };

    diagnostics.sweeps_completed = outcome.sweeps_completed;
    diagnostics.retained_draws = outcome.samples.len();
    diagnostics.cancelled = outcome.cancelled;
    diagnostics.integration_warnings = outcome.integration_warnings;
    if config.latent_method == LatentMethod::Metropolis && model.n_mixed > 0 {
        diagnostics.metropolis_acceptance = Some(latent.proposal_stats().acceptance_rate());
    }

    let report = EcoReport {
        diagnostics,
        posterior_summary: Some(summarize_posterior(&outcome.samples)),
    };
    Ok((model, report, outcome.samples))
}

fn run_chain<P: PopulationUpdater>(
    rng: &mut StdRng,
    units: &[Unit],
    state: &mut LatentState,
    latent: &mut LatentSampler,
    population: &mut P,
    config: &EcoSamplerConfig,
    token: &CancellationToken,
) -> Result<ChainOutcome, EcoError> {
    let schedule = config.schedule;
    let progress = Progress::new(schedule);
    let mut recorder = DrawRecorder::new(schedule);
    let mut sweeps_completed = 0;
    let mut cancelled = false;
    let mut integration_warnings = 0;

    for sweep in 0..schedule.n_draws {
        if token.is_cancelled() {
            info!(sweep, retained = recorder.len(), "sampler cancelled");
            cancelled = true;
            break;
        }

        latent.sweep(rng, units, state, &*population)?;
        population.update(rng, &state.w_star)?;

        if recorder.should_record(sweep) {
            let predictive = if config.predictive {
                Some(predictive_draw(rng, units, state, &*population, config.link)?)
            } else {
                None
            };
            let log_likelihood = if config.track_log_likelihood {
                let likelihood = total_log_likelihood(
                    units,
                    state,
                    &*population,
                    config.link,
                    QuadratureOptions::default(),
                )?;
                if likelihood.non_converged > 0 {
                    warn!(
                        sweep,
                        units = likelihood.non_converged,
                        status = ?likelihood.total.status,
                        "line integral did not converge; keeping best estimate"
                    );
                    integration_warnings += likelihood.non_converged;
                }
                Some(likelihood.total.value)
            } else {
                None
            };
            recorder.push(EcoPosteriorDraw {
                population: population.snapshot(),
                w: state.w.clone(),
                predictive,
                log_likelihood,
            });
        }

        sweeps_completed += 1;
        progress.tick(sweep);
    }

    Ok(ChainOutcome {
        samples: recorder.finish(),
        sweeps_completed,
        cancelled,
        integration_warnings,
    })
}

fn describe_model(units: &[Unit], config: &EcoSamplerConfig) -> EcoModel {
    let count = |kind: UnitKind| units.iter().filter(|unit| unit.kind == kind).count();
    EcoModel {
        n_units: units.len(),
        n_mixed: count(UnitKind::Mixed),
        n_homogeneous: count(UnitKind::KnownW1) + count(UnitKind::KnownW2),
        n_known: count(UnitKind::Known),
        dimension: config.dimension(),
        link: config.link,
        model: config.model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_input() -> EcoInput {
        EcoInput::new(
            vec![0.2, 0.45, 0.6, 0.8, 1.0, 0.0],
            vec![0.3, 0.5, 0.4, 0.7, 0.6, 0.2],
        )
    }

    fn short_config(model: PopulationModel) -> EcoSamplerConfig {
        EcoSamplerConfig {
            schedule: McmcConfig {
                n_draws: 60,
                burn_in: 10,
                thin: 4,
                seed: 3,
                verbose: true,
            },
            model,
            grid_steps: 200,
            ..EcoSamplerConfig::default()
        }
    }

    #[test]
    fn model_metadata_counts_unit_kinds() {
        let (model, report, samples) =
            fit_eco_input(&small_input(), &short_config(PopulationModel::Parametric)).expect("fit");
        assert_eq!(model.n_units, 6);
        assert_eq!(model.n_mixed, 4);
        assert_eq!(model.n_homogeneous, 2);
        assert_eq!(samples.len(), 10);
        assert_eq!(report.diagnostics.retained_draws, 10);
        assert_eq!(report.diagnostics.sweeps_completed, 60);
        assert!(!report.diagnostics.cancelled);
        assert!(report.diagnostics.final_concentration.is_none());
    }

    #[test]
    fn same_seed_reproduces_draws() {
        let config = short_config(PopulationModel::DirichletProcess);
        let (_, _, first) = fit_eco_input(&small_input(), &config).expect("fit");
        let (_, _, second) = fit_eco_input(&small_input(), &config).expect("fit");
        assert_eq!(first.w_trace(1, 0), second.w_trace(1, 0));
        assert_eq!(first.cluster_count_trace(), second.cluster_count_trace());
    }

    #[test]
    fn pre_cancelled_token_returns_no_draws() {
        let token = CancellationToken::new();
        token.cancel();
        let (_, report, samples) = fit_eco_input_with_cancellation(
            &small_input(),
            &short_config(PopulationModel::Parametric),
            &token,
        )
        .expect("cancellation is not an error");
        assert!(samples.is_empty());
        assert!(report.diagnostics.cancelled);
        assert_eq!(report.diagnostics.sweeps_completed, 0);
    }

    #[test]
    fn invalid_input_is_rejected_before_sampling() {
        let input = EcoInput::new(vec![0.2, 0.5], vec![0.1]);
        let err = fit_eco_input(&input, &EcoSamplerConfig::default()).expect_err("length mismatch");
        assert!(matches!(err, EcoError::InvalidInput(_)));
    }
}
