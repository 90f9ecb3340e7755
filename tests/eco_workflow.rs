use eco_inference::{
    EcoInput, EcoSamplerConfig, LatentMethod, LinkFunction, McmcConfig, PopulationModel,
    fit_eco_input,
};
use faer::Mat;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

fn logistic(value: f64) -> f64 {
    if value >= 0.0 {
        1.0 / (1.0 + (-value).exp())
    } else {
        let exp_value = value.exp();
        exp_value / (1.0 + exp_value)
    }
}

fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

struct SimulatedTable {
    input: EcoInput,
    w1: Vec<f64>,
    w2: Vec<f64>,
}

/// Latent pairs with independent logit-normal margins around `mu`.
fn simulate_table(n_units: usize, mu: [f64; 2], sd: f64, seed: u64) -> SimulatedTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Vec::with_capacity(n_units);
    let mut y = Vec::with_capacity(n_units);
    let mut w1 = Vec::with_capacity(n_units);
    let mut w2 = Vec::with_capacity(n_units);
    for unit in 0..n_units {
        let share = 0.8f64.mul_add(usize_to_f64(unit) / usize_to_f64(n_units - 1), 0.1);
        let first = logistic(sd.mul_add(sample_standard_normal(&mut rng), mu[0]));
        let second = logistic(sd.mul_add(sample_standard_normal(&mut rng), mu[1]));
        x.push(share);
        y.push(share.mul_add(first, (1.0 - share) * second));
        w1.push(first);
        w2.push(second);
    }
    SimulatedTable {
        input: EcoInput::new(x, y),
        w1,
        w2,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / usize_to_f64(values.len())
}

fn schedule(n_draws: usize, burn_in: usize, thin: usize, seed: u64) -> McmcConfig {
    McmcConfig {
        n_draws,
        burn_in,
        thin,
        seed,
        verbose: false,
    }
}

#[test]
fn parametric_fit_recovers_population_and_respects_margins() {
    let table = simulate_table(50, [0.8, -0.8], 0.4, 17);
    let config = EcoSamplerConfig {
        schedule: schedule(2_000, 200, 1, 5),
        grid_steps: 300,
        ..EcoSamplerConfig::default()
    };

    let (model, report, samples) = fit_eco_input(&table.input, &config).expect("fit should succeed");
    assert_eq!(model.n_mixed, 50);
    assert_eq!(samples.len(), 900);
    assert_eq!(report.diagnostics.retained_draws, 900);

    for draw in &samples.draws {
        for unit in 0..50 {
            let (w1, w2) = (draw.w[(unit, 0)], draw.w[(unit, 1)]);
            assert!(w1 > 0.0 && w1 < 1.0);
            assert!(w2 > 0.0 && w2 < 1.0);
            let implied = table.input.x[unit].mul_add(w1, (1.0 - table.input.x[unit]) * w2);
            assert!((implied - table.input.y[unit]).abs() < 1.0e-9);
        }
    }

    let summary = report.posterior_summary.expect("summary");
    for (component, truth) in summary.mu.iter().zip([0.8, -0.8]) {
        assert!((component.mean - truth).abs() < 0.3, "mean {} vs {truth}", component.mean);
        assert!(component.q025 <= truth && truth <= component.q975);
    }

    let aggregates = samples
        .aggregate_proportions(&table.input)
        .expect("aggregates");
    let true_w1 = table
        .w1
        .iter()
        .zip(&table.input.x)
        .map(|(w, x)| w * x)
        .sum::<f64>()
        / table.input.x.iter().sum::<f64>();
    let true_w2 = table
        .w2
        .iter()
        .zip(&table.input.x)
        .map(|(w, x)| w * (1.0 - x))
        .sum::<f64>()
        / table.input.x.iter().map(|x| 1.0 - x).sum::<f64>();
    let posterior_w1 = mean(&aggregates.iter().map(|pair| pair[0]).collect::<Vec<_>>());
    let posterior_w2 = mean(&aggregates.iter().map(|pair| pair[1]).collect::<Vec<_>>());
    assert!((posterior_w1 - true_w1).abs() < 0.1);
    assert!((posterior_w2 - true_w2).abs() < 0.1);
}

#[test]
fn homogeneous_and_survey_units_keep_known_values() {
    let table = simulate_table(20, [0.0, 0.5], 0.5, 29);
    let survey = Mat::from_fn(3, 2, |row, col| [[0.2, 0.7], [0.45, 0.55], [0.9, 0.1]][row][col]);
    let mut x = table.input.x.clone();
    let mut y = table.input.y.clone();
    x.extend([1.0, 0.0]);
    y.extend([0.35, 0.8]);
    let input = EcoInput::new(x, y)
        .with_survey(survey)
        .with_known_w1(vec![0.4])
        .with_known_w2(vec![0.65]);

    let config = EcoSamplerConfig {
        schedule: schedule(300, 50, 0, 8),
        grid_steps: 200,
        link: LinkFunction::Probit,
        ..EcoSamplerConfig::default()
    };
    let (model, _, samples) = fit_eco_input(&input, &config).expect("fit should succeed");
    // 22 main units, one supplemental X = 1, one supplemental X = 0, 3 survey rows.
    assert_eq!(model.n_units, 27);
    assert_eq!(model.n_mixed, 20);
    assert_eq!(model.n_homogeneous, 4);
    assert_eq!(model.n_known, 3);

    let first_draw = samples.draws.first().expect("draws");
    for draw in &samples.draws {
        // X = 1 main unit: W1 is the margin, W2 is free.
        assert!((draw.w[(20, 0)] - 0.35).abs() < 1.0e-12);
        // X = 0 main unit: W2 is the margin.
        assert!((draw.w[(21, 1)] - 0.8).abs() < 1.0e-12);
        assert!((draw.w[(22, 0)] - 0.4).abs() < 1.0e-12);
        assert!((draw.w[(23, 1)] - 0.65).abs() < 1.0e-12);
        for row in 24..27 {
            assert_eq!(draw.w[(row, 0)], first_draw.w[(row, 0)]);
            assert_eq!(draw.w[(row, 1)], first_draw.w[(row, 1)]);
        }
    }
    assert!((first_draw.w[(24, 0)] - 0.2).abs() < 1.0e-12);
    assert!((first_draw.w[(26, 1)] - 0.1).abs() < 1.0e-12);

    let free_w2 = samples.w_trace(20, 1);
    assert!(free_w2.iter().any(|value| (value - free_w2[0]).abs() > 1.0e-9));
}

#[test]
fn metropolis_and_grid_agree_on_margins() {
    let table = simulate_table(15, [0.3, -0.2], 0.5, 41);
    for method in [LatentMethod::Grid, LatentMethod::Metropolis] {
        let config = EcoSamplerConfig {
            schedule: schedule(400, 100, 2, 13),
            latent_method: method,
            grid_steps: 200,
            link: LinkFunction::ComplementaryLogLog,
            ..EcoSamplerConfig::default()
        };
        let (_, report, samples) = fit_eco_input(&table.input, &config).expect("fit should succeed");
        assert_eq!(samples.len(), 100);
        match method {
            LatentMethod::Grid => assert!(report.diagnostics.metropolis_acceptance.is_none()),
            LatentMethod::Metropolis => {
                let rate = report
                    .diagnostics
                    .metropolis_acceptance
                    .expect("acceptance is tracked");
                assert!(rate > 0.0 && rate <= 1.0);
            }
        }
        for draw in &samples.draws {
            for unit in 0..15 {
                let implied = table.input.x[unit]
                    .mul_add(draw.w[(unit, 0)], (1.0 - table.input.x[unit]) * draw.w[(unit, 1)]);
                assert!((implied - table.input.y[unit]).abs() < 1.0e-9);
            }
        }
    }
}

#[test]
fn predictive_and_log_likelihood_are_recorded_when_requested() {
    let table = simulate_table(12, [0.0, 0.0], 0.6, 3);
    let input = table
        .input
        .with_survey(Mat::from_fn(2, 2, |_, col| if col == 0 { 0.3 } else { 0.6 }));
    for model in [PopulationModel::Parametric, PopulationModel::DirichletProcess] {
        let config = EcoSamplerConfig {
            schedule: schedule(120, 20, 4, 21),
            model,
            grid_steps: 150,
            predictive: true,
            track_log_likelihood: true,
            ..EcoSamplerConfig::default()
        };
        let (_, report, samples) = fit_eco_input(&input, &config).expect("fit should succeed");
        assert_eq!(samples.len(), 20);

        let log_likelihood = samples.log_likelihood_trace();
        assert_eq!(log_likelihood.len(), 20);
        assert!(log_likelihood.iter().all(|value| value.is_finite()));
        assert!(report.posterior_summary.expect("summary").log_likelihood.is_some());

        for draw in &samples.draws {
            let predictive = draw.predictive.as_ref().expect("predictive draw");
            for unit in 0..12 {
                let (w1, w2) = (predictive.w[(unit, 0)], predictive.w[(unit, 1)]);
                let expected = input.x[unit].mul_add(w1, (1.0 - input.x[unit]) * w2);
                assert!((predictive.y[unit] - expected).abs() < 1.0e-12);
            }
            // Survey rows were supplied without X.
            assert!(predictive.y[12].is_nan());
            assert!(predictive.y[13].is_nan());
        }
    }
}

#[test]
fn contextual_model_runs_with_survey_covariates() {
    let table = simulate_table(16, [0.2, -0.4], 0.5, 61);
    let input = table
        .input
        .with_survey(Mat::from_fn(2, 2, |row, col| [[0.3, 0.5], [0.6, 0.2]][row][col]))
        .with_survey_x(vec![0.25, 0.75]);
    let config = EcoSamplerConfig {
        schedule: schedule(150, 50, 0, 9),
        contextual: true,
        grid_steps: 150,
        ..EcoSamplerConfig::default()
    };
    let (model, report, samples) = fit_eco_input(&input, &config).expect("fit should succeed");
    assert_eq!(model.dimension, 3);
    assert_eq!(samples.len(), 100);
    let summary = report.posterior_summary.expect("summary");
    assert_eq!(summary.mu.len(), 3);
    assert!(summary.mu.iter().all(|component| component.mean.is_finite()));
}

#[test]
fn unit_sizes_weight_the_aggregates() {
    let table = simulate_table(10, [0.5, -0.5], 0.5, 77);
    let sizes: Vec<f64> = (0..10).map(|unit| usize_to_f64(unit + 1) * 100.0).collect();
    let input = table.input.clone().with_unit_sizes(sizes.clone());
    let config = EcoSamplerConfig {
        schedule: schedule(60, 10, 0, 4),
        grid_steps: 100,
        ..EcoSamplerConfig::default()
    };
    let (_, _, samples) = fit_eco_input(&input, &config).expect("fit should succeed");
    let aggregates = samples.aggregate_proportions(&input).expect("aggregates");
    let draw = &samples.draws[0];
    let numerator = (0..10)
        .map(|unit| sizes[unit] * input.x[unit] * draw.w[(unit, 0)])
        .sum::<f64>();
    let denominator = (0..10).map(|unit| sizes[unit] * input.x[unit]).sum::<f64>();
    assert!((aggregates[0][0] - numerator / denominator).abs() < 1.0e-12);
}
