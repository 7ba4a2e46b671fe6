//! Fits `WindowedPCA` on a clean signal and flags an injected spike.
//!
//! Run with `RUST_LOG=anofox_operators=debug cargo run --example windowed_pca`
//! to see the operator logs.

use anofox_operators::prelude::*;
use tracing_subscriber::EnvFilter;

fn signal(rows: usize, offset: usize) -> Vec<Vec<f64>> {
    (offset..offset + rows)
        .map(|i| {
            let t = i as f64 * 0.1;
            vec![t.sin(), (0.7 * t).cos(), 0.5 * (1.3 * t).sin()]
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let train = Table::from_rows(signal(300, 0))?;

    let mut test_rows = signal(60, 300);
    for value in test_rows[40].iter_mut() {
        *value += 4.0;
    }
    let test = Table::from_rows(test_rows)?;

    let method: ScoringMethod = "std_label"
        .parse()
        .map_err(|reason: String| OperatorError::config("scoring_method", reason))?;
    let config = WindowedConfig::default()
        .with_lookback(20)
        .with_scoring(method, 3);
    let mut detector = WindowedPCA::new(config)?;
    detector.fit(&train, None)?;

    let scores = detector.decision_function(&test)?;
    let labels = detector.predict(Some(&test))?.into_vec();

    println!("{:>4} {:>12} {:>6}", "row", "score", "label");
    for (row, (score, label)) in scores.iter().zip(&labels).enumerate() {
        let marker = if *label < 0.0 { " <- anomaly" } else { "" };
        println!("{row:>4} {score:>12.5} {label:>6}{marker}");
    }

    let schema = WindowedPCA::schema().to_json();
    println!(
        "\nschema: {}",
        serde_json::to_string_pretty(&schema["properties"]["hyperparams"]).unwrap_or_default()
    );
    Ok(())
}
