//! Dirichlet-process mixture of Normals with an NIW base measure.
//!
//! Distinct `(mu, Sigma)` values live in an arena indexed by cluster id and
//! every unit stores the id of its cluster. A sweep runs three steps:
//!
//! 1. Polya-urn reassignment, one unit at a time in index order. Unit `i`
//!    joins cluster `k` with weight `n_k^(-i) N(x_i; mu_k, Sigma_k)` or opens a
//!    new cluster with weight `alpha t(x_i)`, where `t` is the prior
//!    predictive. New clusters are drawn from the NIW posterior given `x_i`
//!    and are visible to later units of the same scan.
//! 2. Remixing: every non-empty cluster is redrawn from the NIW posterior of
//!    its members and ids are compacted to `[0, n*)` in ascending old-id order.
//! 3. Optionally, the Escobar–West auxiliary update of `alpha`.

use faer::Mat;
use rand::RngExt;
use rand::rngs::StdRng;

use crate::utils::usize_to_f64;

use super::niw::{GaussianParams, NiwPosterior, PredictiveT, niw_prior_draw};
use super::population::PopulationUpdater;
use super::posterior::{NormalDraw, PopulationDraw};
use super::priors::{DirichletPrior, NiwPrior};
use super::random::{sample_beta, sample_from_log_weights, sample_gamma};
use super::types::EcoError;

#[derive(Debug, Clone)]
pub struct DirichletMixture {
    prior: NiwPrior,
    concentration_prior: DirichletPrior,
    predictive: PredictiveT,
    clusters: Vec<GaussianParams>,
    counts: Vec<usize>,
    assignments: Vec<usize>,
    alpha: f64,
}

impl DirichletMixture {
    /// Every unit starts in its own cluster with an independent prior draw.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if the prior scale is not positive
    /// definite.
    pub fn initialize(
        rng: &mut StdRng,
        prior: NiwPrior,
        concentration_prior: DirichletPrior,
        n_units: usize,
    ) -> Result<Self, EcoError> {
        let predictive = PredictiveT::from_prior(&prior)?;
        let clusters = (0..n_units)
            .map(|_| niw_prior_draw(rng, &prior))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            prior,
            concentration_prior,
            predictive,
            clusters,
            counts: vec![1; n_units],
            assignments: (0..n_units).collect(),
            alpha: concentration_prior.initial_concentration,
        })
    }

    #[must_use]
    pub const fn concentration(&self) -> f64 {
        self.alpha
    }

    /// Number of non-empty clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.counts.iter().filter(|count| **count > 0).count()
    }

    #[must_use]
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// Polya-urn scan over all units in index order.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if a new-cluster draw breaks down.
    pub fn reassign(&mut self, rng: &mut StdRng, latents: &Mat<f64>) -> Result<(), EcoError> {
        let dim = latents.ncols();
        let mut point = vec![0.0; dim];
        let mut log_weights = Vec::with_capacity(self.clusters.len() + 1);
        let mut cumulative = Vec::with_capacity(self.clusters.len() + 1);
        let log_alpha = self.alpha.ln();

        for unit in 0..self.assignments.len() {
            for (col, value) in point.iter_mut().enumerate() {
                *value = latents[(unit, col)];
            }
            let current = self.assignments[unit];
            self.counts[current] -= 1;

            log_weights.clear();
            log_weights.extend(self.clusters.iter().zip(&self.counts).map(|(params, count)| {
                if *count == 0 {
                    f64::NEG_INFINITY
                } else {
                    usize_to_f64(*count).ln() + params.log_density(&point)
                }
            }));
            log_weights.push(log_alpha + self.predictive.log_density(&point));

            let pick = sample_from_log_weights(rng, &log_weights, &mut cumulative);
            let chosen = if pick == self.clusters.len() {
                let fresh = NiwPosterior::from_rows(&self.prior, latents, &[unit]).draw(rng)?;
                self.clusters.push(fresh);
                self.counts.push(0);
                self.clusters.len() - 1
            } else {
                pick
            };
            self.assignments[unit] = chosen;
            self.counts[chosen] += 1;
        }
        Ok(())
    }

    /// Redraw every non-empty cluster from its members and compact ids.
    ///
    /// # Errors
    ///
    /// Returns `EcoError::SolveFailed` if a posterior draw breaks down.
    pub fn remix(&mut self, rng: &mut StdRng, latents: &Mat<f64>) -> Result<(), EcoError> {
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); self.clusters.len()];
        for (unit, id) in self.assignments.iter().enumerate() {
            members[*id].push(unit);
        }

        let mut clusters = Vec::with_capacity(members.len());
        let mut counts = Vec::with_capacity(members.len());
        for group in members.iter().filter(|group| !group.is_empty()) {
            let new_id = clusters.len();
            clusters.push(NiwPosterior::from_rows(&self.prior, latents, group).draw(rng)?);
            counts.push(group.len());
            for unit in group {
                self.assignments[*unit] = new_id;
            }
        }
        self.clusters = clusters;
        self.counts = counts;
        Ok(())
    }

    /// Escobar–West auxiliary-variable update of `alpha`.
    pub fn update_concentration(&mut self, rng: &mut StdRng) {
        let n = usize_to_f64(self.assignments.len());
        let n_star = usize_to_f64(self.cluster_count());
        let a0 = self.concentration_prior.a0;
        let eta = sample_beta(rng, self.alpha + 1.0, n);
        let rate = self.concentration_prior.b0 - eta.max(f64::MIN_POSITIVE).ln();
        let threshold = ((a0 + n_star - 1.0) / (n * rate)).min(1.0);
        let shape = if rng.random::<f64>() < threshold {
            a0 + n_star
        } else {
            a0 + n_star - 1.0
        };
        let draw = sample_gamma(rng, shape, 1.0 / rate);
        if draw.is_finite() && draw > 0.0 {
            self.alpha = draw;
        }
    }
}

impl PopulationUpdater for DirichletMixture {
    fn unit_params(&self, unit: usize) -> &GaussianParams {
        &self.clusters[self.assignments[unit]]
    }

    fn update(&mut self, rng: &mut StdRng, latents: &Mat<f64>) -> Result<(), EcoError> {
        self.reassign(rng, latents)?;
        self.remix(rng, latents)?;
        if self.concentration_prior.update_concentration {
            self.update_concentration(rng);
        }
        Ok(())
    }

    fn snapshot(&self) -> PopulationDraw {
        PopulationDraw::DirichletProcess {
            clusters: self.clusters.iter().map(NormalDraw::from).collect(),
            assignments: self.assignments.clone(),
            concentration: self
                .concentration_prior
                .update_concentration
                .then_some(self.alpha),
        }
    }
}
