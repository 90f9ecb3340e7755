use eco_inference::{
    DirichletPrior, EcoInput, EcoSamplerConfig, McmcConfig, PopulationModel, fit_eco_input,
};
use faer::Mat;
use tracing_subscriber::EnvFilter;

/// Two latent regimes plus a handful of surveyed precincts.
fn build_input() -> EcoInput {
    let shares = [0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85];
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (idx, share) in shares.iter().cycle().take(40).enumerate() {
        let (w1, w2) = if idx % 2 == 0 { (0.85, 0.7) } else { (0.2, 0.35) };
        x.push(*share);
        y.push(share * w1 + (1.0 - share) * w2);
    }
    let survey = Mat::from_fn(4, 2, |row, col| [[0.82, 0.71], [0.22, 0.3], [0.88, 0.66], [0.18, 0.4]][row][col]);
    EcoInput::new(x, y).with_survey(survey)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eco_inference=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let input = build_input();
    let config = EcoSamplerConfig {
        schedule: McmcConfig {
            n_draws: 2_000,
            burn_in: 400,
            thin: 3,
            seed: 7,
            verbose: true,
        },
        model: PopulationModel::DirichletProcess,
        dirichlet_prior: DirichletPrior {
            a0: 1.0,
            b0: 0.5,
            update_concentration: true,
            initial_concentration: 1.0,
        },
        ..EcoSamplerConfig::default()
    };

    let (model, report, posterior) = fit_eco_input(&input, &config)?;
    println!("Dirichlet-process fit: units={}, known={}", model.n_units, model.n_known);

    if let Some(summary) = &report.posterior_summary {
        if let Some(alpha) = summary.concentration {
            println!(
                "alpha mean={:.3}, 95% CrI [{:.3}, {:.3}]",
                alpha.mean, alpha.q025, alpha.q975
            );
        }
        if let Some(clusters) = summary.cluster_count {
            println!("clusters mean={:.2}, median={:.0}", clusters.mean, clusters.q50);
        }
        for unit in [0, 1] {
            let w = &summary.w[unit];
            println!(
                "unit {unit}: W1 mean={:.3}, W2 mean={:.3}",
                w[0].mean, w[1].mean
            );
        }
    }

    let unit_mu = posterior.unit_mu_trace(0, 0);
    if let Some(last) = unit_mu.last() {
        println!("last draw of mu[0] for unit 0: {last:.3}");
    }

    Ok(())
}
