use eco_inference::{
    EcoInput, EcoSamplerConfig, LinkFunction, McmcConfig, fit_eco_input, summarize_scalar,
};
use tracing_subscriber::EnvFilter;

fn logistic(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

/// Deterministic toy precincts: the first group turns out more often in
/// precincts where it is a minority.
fn build_precincts(n_units: usize) -> EcoInput {
    let mut x = Vec::with_capacity(n_units);
    let mut y = Vec::with_capacity(n_units);
    for unit in 0..n_units {
        let position = f64::from(u32::try_from(unit).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(n_units).unwrap_or(u32::MAX));
        let share = 0.1 + 0.8 * position;
        let w1 = logistic(0.9 - 1.2 * position);
        let w2 = logistic(-0.3 + 0.4 * (6.0 * position).sin());
        x.push(share);
        y.push(share * w1 + (1.0 - share) * w2);
    }
    EcoInput::new(x, y)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eco_inference=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let input = build_precincts(60);
    let config = EcoSamplerConfig {
        schedule: McmcConfig {
            n_draws: 3_000,
            burn_in: 500,
            thin: 4,
            seed: 2_026,
            verbose: true,
        },
        link: LinkFunction::Logit,
        predictive: true,
        track_log_likelihood: true,
        ..EcoSamplerConfig::default()
    };

    let (model, report, posterior) = fit_eco_input(&input, &config)?;
    println!(
        "Parametric fit: units={}, mixed={}, homogeneous={}",
        model.n_units, model.n_mixed, model.n_homogeneous
    );
    println!(
        "Sampler: sweeps={}, retained draws={}, integration warnings={}",
        report.diagnostics.sweeps_completed,
        report.diagnostics.retained_draws,
        report.diagnostics.integration_warnings
    );

    if let Some(summary) = &report.posterior_summary {
        for (component, mu) in summary.mu.iter().enumerate() {
            println!(
                "mu[{component}] mean={:.3}, 95% CrI [{:.3}, {:.3}]",
                mu.mean, mu.q025, mu.q975
            );
        }
        if let Some(log_likelihood) = summary.log_likelihood {
            println!("log-likelihood mean={:.2}", log_likelihood.mean);
        }
    }

    let aggregates = posterior.aggregate_proportions(&input)?;
    let w1: Vec<f64> = aggregates.iter().map(|pair| pair[0]).collect();
    let w2: Vec<f64> = aggregates.iter().map(|pair| pair[1]).collect();
    let (b1, b2) = (summarize_scalar(&w1), summarize_scalar(&w2));
    println!(
        "Aggregate W1 mean={:.3} [{:.3}, {:.3}], W2 mean={:.3} [{:.3}, {:.3}]",
        b1.mean, b1.q025, b1.q975, b2.mean, b2.q025, b2.q975
    );

    Ok(())
}
