//! Trains the ATLAS model on the bundled reference dataset and writes both
//! artifact files.
//!
//! Output paths follow the service configuration (`MODEL_PATH`,
//! `MODEL_COLUMNS_PATH`), so a fresh checkout can train and then serve.

use anyhow::Result;
use atlas_score_api::config::Config;
use atlas_score_api::training::{reference_dataset, train, TrainingConfig};

/// Main entry point for the training job.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let training_config = TrainingConfig {
        model_version: std::env::var("MODEL_VERSION")
            .unwrap_or_else(|_| TrainingConfig::default().model_version),
        ..TrainingConfig::default()
    };

    println!("=== ATLAS Model Training ===\n");

    let dataset = reference_dataset();
    let trained = train(&dataset, &training_config)?;

    // Make sure the service will accept what we are about to write
    let artifact = trained.to_model_artifact()?;
    println!(
        "✓ Trained {} {} on {} applicants ({} columns)",
        training_config.model_name,
        training_config.model_version,
        dataset.len(),
        artifact.columns().len()
    );

    let digest = trained.write(&config.model_path, &config.model_columns_path)?;

    println!("✓ Model written to {}", config.model_path.display());
    println!("✓ Columns written to {}", config.model_columns_path.display());
    println!("  sha256: {}", digest);

    Ok(())
}
