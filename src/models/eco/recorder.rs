//! Burn-in and thinning of sweeps, plus packing of retained draws.

use faer::Mat;
use rand::rngs::StdRng;

use crate::inference::McmcConfig;

use super::bounds::Unit;
use super::latent::{LatentState, pair_density};
use super::link::LinkFunction;
use super::population::PopulationUpdater;
use super::posterior::{EcoPosteriorDraw, EcoPosteriorSamples, PredictiveDraw};
use super::types::EcoError;

/// Counter-based retention: after `burn_in` sweeps, every
/// `(thin + 1)`-th sweep is kept.
#[derive(Debug, Clone)]
pub struct DrawRecorder {
    burn_in: usize,
    keep_interval: usize,
    counter: usize,
    samples: EcoPosteriorSamples,
}

impl DrawRecorder {
    #[must_use]
    pub fn new(schedule: McmcConfig) -> Self {
        Self {
            burn_in: schedule.burn_in,
            keep_interval: schedule.keep_interval(),
            counter: 0,
            samples: EcoPosteriorSamples::with_capacity(schedule.retained_draws()),
        }
    }

    /// Advance the counter for the zero-based `sweep` and report whether its
    /// state should be stored.
    pub fn should_record(&mut self, sweep: usize) -> bool {
        if sweep < self.burn_in {
            return false;
        }
        self.counter += 1;
        if self.counter == self.keep_interval {
            self.counter = 0;
            true
        } else {
            false
        }
    }

    pub fn push(&mut self, draw: EcoPosteriorDraw) {
        self.samples.draws.push(draw);
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn finish(self) -> EcoPosteriorSamples {
        self.samples
    }
}

/// Posterior-predictive `(W1, W2)` and `Y` for every unit.
///
/// Each unit draws from its own `(mu, Sigma)`, conditioned on `X*` under the
/// contextual model.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if a conditional covariance breaks down.
pub fn predictive_draw<P: PopulationUpdater + ?Sized>(
    rng: &mut StdRng,
    units: &[Unit],
    state: &LatentState,
    population: &P,
    link: LinkFunction,
) -> Result<PredictiveDraw, EcoError> {
    let mut w = Mat::<f64>::zeros(units.len(), 2);
    let mut y = Vec::with_capacity(units.len());
    for (idx, unit) in units.iter().enumerate() {
        let density = pair_density(population.unit_params(idx), state.x_star(idx))?;
        let draw = density.sample(rng);
        let w1 = link.inverse_clamped(draw[0]);
        let w2 = link.inverse_clamped(draw[1]);
        w[(idx, 0)] = w1;
        w[(idx, 1)] = w2;
        y.push(unit.x.map_or(f64::NAN, |x| x.mul_add(w1, (1.0 - x) * w2)));
    }
    Ok(PredictiveDraw { w, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(n_draws: usize, burn_in: usize, thin: usize) -> Vec<usize> {
        let mut recorder = DrawRecorder::new(McmcConfig {
            n_draws,
            burn_in,
            thin,
            ..McmcConfig::default()
        });
        (0..n_draws).filter(|sweep| recorder.should_record(*sweep)).collect()
    }

    #[test]
    fn every_sweep_is_kept_without_burn_in_or_thinning() {
        assert_eq!(recorded(5_000, 0, 0).len(), 5_000);
    }

    #[test]
    fn thinning_keeps_every_interval_after_burn_in() {
        let kept = recorded(1_000, 100, 9);
        assert_eq!(kept.len(), 90);
        assert_eq!(kept[0], 109);
        assert_eq!(kept[1], 119);
    }

    #[test]
    fn count_matches_schedule_formula() {
        for (n, b, t) in [(10, 3, 2), (7, 0, 6), (50, 49, 0), (101, 1, 4)] {
            let config = McmcConfig {
                n_draws: n,
                burn_in: b,
                thin: t,
                ..McmcConfig::default()
            };
            assert_eq!(recorded(n, b, t).len(), config.retained_draws());
        }
    }
}
