//! Reusable inference and MCMC utility types.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Errors for generic MCMC configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("n_draws must be positive")]
    InvalidIterations,
    #[error("burn_in ({burn_in}) must be smaller than n_draws ({n_draws})")]
    InvalidBurnIn { burn_in: usize, n_draws: usize },
}

/// Generic MCMC schedule.
///
/// After `burn_in` sweeps, every `(thin + 1)`-th sweep is retained.
#[derive(Debug, Clone, Copy)]
pub struct McmcConfig {
    pub n_draws: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub seed: u64,
    /// Log progress in tenths of the run.
    pub verbose: bool,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            n_draws: 5_000,
            burn_in: 0,
            thin: 0,
            seed: 42,
            verbose: false,
        }
    }
}

impl McmcConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.n_draws == 0 {
            return Err(InferenceError::InvalidIterations);
        }
        if self.burn_in >= self.n_draws {
            return Err(InferenceError::InvalidBurnIn {
                burn_in: self.burn_in,
                n_draws: self.n_draws,
            });
        }
        Ok(())
    }

    /// Distance between retained sweeps.
    #[must_use]
    pub const fn keep_interval(self) -> usize {
        self.thin + 1
    }

    /// Number of retained draws implied by this configuration.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        self.n_draws.saturating_sub(self.burn_in) / self.keep_interval()
    }
}

/// Proposal counters for a single Metropolis-Hastings block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl ProposalStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Acceptance rate in `[0, 1]`, or `0` if no proposals were made.
    #[must_use]
    pub fn acceptance_rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            usize_to_f64(self.accepted) / usize_to_f64(self.proposed)
        }
    }
}

/// Cooperative cancellation flag, checked once at the top of every sweep.
///
/// Clones share the same flag, so a handle can be moved to another thread
/// and cancelled while the sampler runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the run stops before its next sweep.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_rejects_zero_draws() {
        let config = McmcConfig {
            n_draws: 0,
            ..McmcConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidIterations));
    }

    #[test]
    fn config_validation_rejects_long_burn_in() {
        let config = McmcConfig {
            n_draws: 100,
            burn_in: 100,
            ..McmcConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(InferenceError::InvalidBurnIn {
                burn_in: 100,
                n_draws: 100
            })
        );
    }

    #[test]
    fn retained_draws_follow_keep_interval() {
        let all = McmcConfig {
            n_draws: 5_000,
            burn_in: 0,
            thin: 0,
            ..McmcConfig::default()
        };
        assert_eq!(all.retained_draws(), 5_000);

        let thinned = McmcConfig {
            n_draws: 1_000,
            burn_in: 100,
            thin: 9,
            ..McmcConfig::default()
        };
        assert_eq!(thinned.retained_draws(), 90);
    }

    #[test]
    fn proposal_stats_tracks_acceptance() {
        let mut stats = ProposalStats::default();
        stats.record(true);
        stats.record(false);
        assert!((stats.acceptance_rate() - 0.5).abs() < 1.0e-12);
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }
}
