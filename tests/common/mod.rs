//! Shared helpers for integration tests.
#![allow(dead_code)]

use atlas_score_api::artifact::{ArtifactMetadata, ModelArtifact};
use atlas_score_api::classifier::Classifier;
use atlas_score_api::encoder::EncodingSchema;
use atlas_score_api::errors::EngineError;
use atlas_score_api::models::ApplicantRecord;
use atlas_score_api::training::{fit_encoding, reference_dataset, TrainingApplicant};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Applicant without a guarantor and with outstanding debt (both scenarios fire).
pub fn sample_record() -> ApplicantRecord {
    serde_json::from_value(json!({
        "Age": 34,
        "Residence_Type": "Rental",
        "Years_at_Work": 1,
        "Annual_Income_JPY_10k": 400,
        "Other_Debt_JPY_10k": 150,
        "Guarantor": "No",
        "Medical_History": "なし",
        "Payment_Rate": 1.0
    }))
    .unwrap()
}

pub fn reference_encoding() -> EncodingSchema {
    let records: Vec<ApplicantRecord> = reference_dataset()
        .iter()
        .map(TrainingApplicant::to_record)
        .collect();
    fit_encoding(&records)
}

pub fn reference_columns() -> Vec<String> {
    reference_encoding().training_columns()
}

pub fn column_index(name: &str) -> usize {
    reference_columns()
        .iter()
        .position(|c| c == name)
        .unwrap_or_else(|| panic!("no column {}", name))
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The hand-written two-tree forest under `tests/fixtures`.
pub fn forest_artifact() -> ModelArtifact {
    ModelArtifact::load(
        fixture_path("forest_model.json"),
        fixture_path("forest_columns.json"),
    )
    .unwrap()
}

/// Classifier driven by a closure returning P(class 0).
///
/// Records every feature vector it is asked to score.
pub struct FnClassifier<F> {
    n_features: usize,
    f: F,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<f64>>>,
}

impl<F> FnClassifier<F>
where
    F: Fn(&[f64]) -> Result<f64, EngineError> + Send + Sync,
{
    pub fn new(n_features: usize, f: F) -> Self {
        Self {
            n_features,
            f,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Vec<f64>> {
        self.seen.lock().unwrap().clone()
    }
}

impl<F> Classifier for FnClassifier<F>
where
    F: Fn(&[f64]) -> Result<f64, EngineError> + Send + Sync,
{
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        2
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(features.to_vec());
        if features.len() != self.n_features {
            return Err(EngineError::Scoring("width mismatch".into()));
        }
        let p = (self.f)(features)?;
        Ok(vec![p, 1.0 - p])
    }

    fn kind(&self) -> &str {
        "test_fn"
    }
}

/// Classifier that always reports the same "not delayed" probability.
pub fn fixed_classifier(
    p: f64,
) -> Arc<FnClassifier<impl Fn(&[f64]) -> Result<f64, EngineError> + Send + Sync>> {
    Arc::new(FnClassifier::new(reference_columns().len(), move |_| Ok(p)))
}

/// Binds `classifier` to the reference encoding and columns.
pub fn artifact_with<C: Classifier + 'static>(classifier: Arc<C>) -> ModelArtifact {
    ModelArtifact::new(
        classifier,
        reference_encoding(),
        reference_columns(),
        0,
        ArtifactMetadata::default(),
    )
    .unwrap()
}
