//! Offline artifact production.
//!
//! This is the other half of the encoding contract: the vocabulary and the
//! canonical column order written here are exactly what inference reads back.
//!
//! - Payment rate is `payment_count / claim_count`, or `1.0` with no claims.
//! - Each categorical vocabulary is its sorted distinct values; the first is dropped.
//! - Columns are the numeric fields in record order, then category columns
//!   field by field.
//!
//! The classifier is a deterministic logistic regression fitted by batch
//! gradient descent on standardized features. Class `0` is "not delayed".

use crate::artifact::{
    sha256_hex, ColumnsFile, ModelArtifact, ModelFile, COLUMNS_SCHEMA_VERSION,
    DEFAULT_NOT_DELAYED_CLASS, MODEL_FORMAT_VERSION,
};
use crate::classifier::{ClassifierSpec, LogisticRegression};
use crate::encoder::{align_to_columns, CategoricalVocabulary, EncodingSchema};
use crate::errors::EngineError;
use crate::models::{ApplicantRecord, CATEGORICAL_FIELDS, DEFAULT_PAYMENT_RATE, NUMERIC_FIELDS};
use anyhow::{bail, Context};
use chrono::Utc;
use serde_json::Map;
use std::collections::BTreeMap;
use std::path::Path;

/// Label of applicants who delayed payment.
pub const DELAYED_CLASS: i64 = 1;

/// One historical applicant with its repayment outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingApplicant {
    pub application_id: u32,
    pub age: f64,
    pub residence_type: String,
    pub years_at_work: f64,
    pub annual_income: f64,
    pub other_debt: f64,
    pub guarantor: String,
    pub medical_history: String,
    pub claim_count: u32,
    pub payment_count: u32,
    pub delayed: bool,
}

/// Share of claimed payments that were paid; `1.0` when nothing was claimed.
pub fn payment_rate(payment_count: u32, claim_count: u32) -> f64 {
    if claim_count == 0 {
        return DEFAULT_PAYMENT_RATE;
    }
    f64::from(payment_count) / f64::from(claim_count)
}

impl TrainingApplicant {
    /// The applicant as the scoring engine would see it.
    pub fn to_record(&self) -> ApplicantRecord {
        ApplicantRecord {
            age: self.age,
            residence_type: self.residence_type.clone(),
            years_at_work: self.years_at_work,
            annual_income: self.annual_income,
            other_debt: self.other_debt,
            guarantor: self.guarantor.clone(),
            medical_history: self.medical_history.clone(),
            payment_rate: payment_rate(self.payment_count, self.claim_count),
            extra: Map::new(),
            wire_numbers: BTreeMap::new(),
        }
    }

    fn label(&self) -> f64 {
        if self.delayed {
            1.0
        } else {
            0.0
        }
    }
}

/// Gradient descent settings. Defaults are fixed so reruns are reproducible.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub model_name: String,
    pub model_version: String,
    pub iterations: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "atlas".to_string(),
            model_version: "v2".to_string(),
            iterations: 2_000,
            learning_rate: 0.1,
            l2_penalty: 0.01,
        }
    }
}

/// Fits the categorical vocabulary and numeric field list from training records.
pub fn fit_encoding(records: &[ApplicantRecord]) -> EncodingSchema {
    let categorical_fields = CATEGORICAL_FIELDS
        .iter()
        .filter_map(|field| {
            CategoricalVocabulary::fit(field, records.iter().filter_map(|r| r.categorical(field)))
        })
        .collect();

    EncodingSchema {
        numeric_fields: NUMERIC_FIELDS.iter().map(|f| f.to_string()).collect(),
        categorical_fields,
    }
}

/// Fits an L2-regularised logistic regression for `P(label = 1)`.
pub fn fit_logistic(rows: &[Vec<f64>], labels: &[f64], config: &TrainingConfig) -> LogisticRegression {
    let n_features = rows.first().map_or(0, Vec::len);
    let n = rows.len().max(1) as f64;

    let mut means = vec![0.0; n_features];
    for row in rows {
        for (mean, x) in means.iter_mut().zip(row) {
            *mean += x / n;
        }
    }
    let mut scales = vec![0.0; n_features];
    for row in rows {
        for ((scale, mean), x) in scales.iter_mut().zip(&means).zip(row) {
            *scale += (x - mean).powi(2) / n;
        }
    }
    // Constant columns keep scale 1 so they standardize to zero.
    for scale in scales.iter_mut() {
        *scale = if *scale > 0.0 { scale.sqrt() } else { 1.0 };
    }

    let standardized: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(means.iter().zip(&scales))
                .map(|(x, (mean, scale))| (x - mean) / scale)
                .collect()
        })
        .collect();

    let mut weights = vec![0.0; n_features];
    let mut intercept = 0.0;
    for _ in 0..config.iterations {
        let mut grad_w = vec![0.0; n_features];
        let mut grad_b = 0.0;
        for (z_row, y) in standardized.iter().zip(labels) {
            let z = z_row
                .iter()
                .zip(&weights)
                .fold(intercept, |acc, (x, w)| acc + x * w);
            let error = 1.0 / (1.0 + (-z).exp()) - y;
            for (g, x) in grad_w.iter_mut().zip(z_row) {
                *g += error * x / n;
            }
            grad_b += error / n;
        }
        for (w, g) in weights.iter_mut().zip(&grad_w) {
            *w -= config.learning_rate * (g + config.l2_penalty * *w);
        }
        intercept -= config.learning_rate * grad_b;
    }

    LogisticRegression {
        coefficients: weights,
        intercept,
        feature_means: means,
        feature_scales: scales,
    }
}

/// The two files a training run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifact {
    pub model: ModelFile,
    pub columns: ColumnsFile,
}

/// Trains an artifact from historical applicants.
pub fn train(
    applicants: &[TrainingApplicant],
    config: &TrainingConfig,
) -> anyhow::Result<TrainedArtifact> {
    if applicants.is_empty() {
        bail!("training set is empty");
    }

    let records: Vec<ApplicantRecord> = applicants.iter().map(TrainingApplicant::to_record).collect();
    let encoding = fit_encoding(&records);
    let columns = encoding.training_columns();

    let rows: Vec<Vec<f64>> = records
        .iter()
        .map(|r| align_to_columns(&encoding.encode(r), &columns))
        .collect();
    let labels: Vec<f64> = applicants.iter().map(TrainingApplicant::label).collect();

    let delayed = applicants.iter().filter(|a| a.delayed).count();
    tracing::info!(
        "Training on {} applicants ({} delayed) with {} columns",
        applicants.len(),
        delayed,
        columns.len()
    );

    let classifier = fit_logistic(&rows, &labels, config);

    Ok(TrainedArtifact {
        model: ModelFile {
            format_version: MODEL_FORMAT_VERSION,
            model_name: config.model_name.clone(),
            model_version: config.model_version.clone(),
            trained_at: Utc::now(),
            classes: vec![DEFAULT_NOT_DELAYED_CLASS, DELAYED_CLASS],
            not_delayed_class: DEFAULT_NOT_DELAYED_CLASS,
            classifier: ClassifierSpec::LogisticRegression(classifier),
        },
        columns: ColumnsFile {
            schema_version: COLUMNS_SCHEMA_VERSION,
            encoding,
            columns,
            classifier_sha256: None,
        },
    })
}

impl TrainedArtifact {
    fn model_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.model).context("Failed to serialize model file")
    }

    /// Writes both files; the column file records the model file's SHA-256.
    ///
    /// Returns that SHA-256.
    pub fn write(&self, model_path: &Path, columns_path: &Path) -> anyhow::Result<String> {
        let model_bytes = self.model_bytes()?;
        let digest = sha256_hex(&model_bytes);

        let mut columns = self.columns.clone();
        columns.classifier_sha256 = Some(digest.clone());
        let columns_bytes =
            serde_json::to_vec_pretty(&columns).context("Failed to serialize column file")?;

        for path in [model_path, columns_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        std::fs::write(model_path, &model_bytes)
            .with_context(|| format!("Failed to write {}", model_path.display()))?;
        std::fs::write(columns_path, &columns_bytes)
            .with_context(|| format!("Failed to write {}", columns_path.display()))?;

        tracing::info!(
            "Wrote {} and {} (sha256 {})",
            model_path.display(),
            columns_path.display(),
            digest
        );
        Ok(digest)
    }

    /// Loads this artifact in memory, as the service would after `write`.
    pub fn to_model_artifact(&self) -> Result<ModelArtifact, EngineError> {
        let digest = self
            .model_bytes()
            .map(|bytes| sha256_hex(&bytes))
            .map_err(|e| EngineError::ArtifactLoad(e.to_string()))?;
        ModelArtifact::from_files(self.model.clone(), self.columns.clone(), digest)
    }
}

/// The historical applicants the first ATLAS model was trained on.
pub fn reference_dataset() -> Vec<TrainingApplicant> {
    // (id, age, residence, years at work, income, other debt, guarantor, medical, claims, payments)
    const ROWS: [(u32, f64, &str, f64, f64, f64, &str, &str, u32, u32); 14] = [
        (3, 46.0, "Own_House", 10.0, 600.0, 0.0, "No", "なし", 24, 24),
        (4, 48.0, "Own_House", 25.0, 600.0, 0.0, "No", "高血圧", 12, 12),
        (5, 51.0, "Own_House", 15.0, 800.0, 0.0, "Yes", "なし", 36, 36),
        (6, 34.0, "Rental", 1.0, 400.0, 100.0, "No", "なし", 12, 12),
        (7, 54.0, "Own_House", 30.0, 1000.0, 100.0, "No", "糖尿病", 24, 20),
        (28, 30.0, "Rental", 5.0, 450.0, 200.0, "Yes", "高血圧", 48, 40),
        (35, 40.0, "Family_House", 12.0, 700.0, 50.0, "No", "なし", 12, 12),
        (41, 25.0, "Rental", 2.0, 300.0, 150.0, "Yes", "なし", 6, 5),
        (48, 50.0, "Company_House", 20.0, 900.0, 0.0, "No", "高血圧", 24, 22),
        (51, 60.0, "Own_House", 35.0, 1200.0, 30.0, "No", "糖尿病", 36, 30),
        (55, 28.0, "Rental", 3.0, 350.0, 80.0, "No", "なし", 12, 10),
        (60, 39.0, "Own_House", 15.0, 800.0, 20.0, "Yes", "なし", 12, 12),
        (65, 45.0, "Rental", 8.0, 550.0, 120.0, "No", "高血圧", 48, 42),
        (70, 58.0, "Family_House", 25.0, 950.0, 0.0, "No", "なし", 24, 24),
    ];
    const DELAYED_IDS: [u32; 7] = [7, 28, 41, 48, 51, 55, 65];

    ROWS.iter()
        .map(
            |&(id, age, residence, years, income, debt, guarantor, medical, claims, payments)| {
                TrainingApplicant {
                    application_id: id,
                    age,
                    residence_type: residence.to_string(),
                    years_at_work: years,
                    annual_income: income,
                    other_debt: debt,
                    guarantor: guarantor.to_string(),
                    medical_history: medical.to_string(),
                    claim_count: claims,
                    payment_count: payments,
                    delayed: DELAYED_IDS.contains(&id),
                }
            },
        )
        .collect()
}
