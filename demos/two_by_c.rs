use eco_inference::{McmcConfig, MultiColumnConfig, MultiColumnInput, fit_multi_column_input};
use faer::Mat;
use tracing_subscriber::EnvFilter;

/// Three groups per precinct with deterministic Duncan-Davis style bounds.
fn build_input(n_units: usize) -> MultiColumnInput {
    let rates = [0.75, 0.45, 0.2];
    let x = Mat::from_fn(n_units, 3, |row, col| {
        let tilt = f64::from(u32::try_from(row % 7).unwrap_or(0)) / 7.0;
        let raw = [0.2 + tilt, 0.5, 0.3 + (1.0 - tilt) * 0.5];
        raw[col] / raw.iter().sum::<f64>()
    });
    let y: Vec<f64> = (0..n_units)
        .map(|row| (0..3).map(|col| x[(row, col)] * rates[col]).sum())
        .collect();
    let w_min = Mat::from_fn(n_units, 3, |row, col| {
        let others = (0..3).filter(|other| *other != col).map(|other| x[(row, other)]).sum::<f64>();
        ((y[row] - others) / x[(row, col)]).max(0.0)
    });
    let w_max = Mat::from_fn(n_units, 3, |row, col| (y[row] / x[(row, col)]).min(1.0));
    MultiColumnInput::new(x, y, w_min, w_max)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("eco_inference=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let input = build_input(30);
    let config = MultiColumnConfig {
        schedule: McmcConfig {
            n_draws: 4_000,
            burn_in: 1_000,
            thin: 2,
            seed: 31,
            verbose: true,
        },
        rejection: true,
        ..MultiColumnConfig::default()
    };

    let (model, report, _posterior) = fit_multi_column_input(&input, &config)?;
    println!("2xC fit: units={}, columns={}", model.n_units, model.dimension);
    if let Some(rate) = report.diagnostics.metropolis_acceptance {
        println!("Metropolis acceptance={rate:.3}");
    }
    if let Some(summary) = &report.posterior_summary {
        for (column, mu) in summary.mu.iter().enumerate() {
            println!(
                "logit W[{column}] population mean={:.3}, 95% CrI [{:.3}, {:.3}]",
                mu.mean, mu.q025, mu.q975
            );
        }
    }

    Ok(())
}
