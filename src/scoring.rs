use crate::artifact::ModelArtifact;
use crate::errors::EngineError;
use crate::models::{ApplicantRecord, ScoreResult};
use std::sync::Arc;

/// Highest score; reached when the "not delayed" probability is 1.
pub const MAX_SCORE: u8 = 100;

/// Converts a "not delayed" probability into a score in `[0, 100]`.
///
/// Rounds to the nearest integer and clamps, so numerical noise just outside
/// `[0, 1]` still lands in range. A non-finite probability cannot be scored.
pub fn probability_to_score(probability: f64) -> Result<u8, EngineError> {
    if !probability.is_finite() {
        return Err(EngineError::Scoring(format!(
            "classifier returned a non-finite probability ({})",
            probability
        )));
    }
    let scaled = (probability * f64::from(MAX_SCORE)).round();
    Ok(scaled.clamp(0.0, f64::from(MAX_SCORE)) as u8)
}

/// Scores applicant records against a loaded artifact.
///
/// Holds only the shared, immutable artifact, so one engine can serve
/// concurrent requests without locking.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    artifact: Arc<ModelArtifact>,
}

impl ScoringEngine {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Encodes `record` and aligns it to the canonical column list.
    ///
    /// The result always has one value per canonical column, in order.
    pub fn features(&self, record: &ApplicantRecord) -> Vec<f64> {
        let encoded = self.artifact.encoding().encode(record);
        crate::encoder::align_to_columns(&encoded, self.artifact.columns())
    }

    /// Probability of the "not delayed" class for `record`.
    pub fn probability_not_delayed(&self, record: &ApplicantRecord) -> Result<f64, EngineError> {
        let features = self.features(record);
        let classifier = self.artifact.classifier();

        let probabilities = classifier.predict_proba(&features)?;
        if probabilities.len() != classifier.n_classes() {
            return Err(EngineError::Scoring(format!(
                "classifier returned {} probabilities for {} classes",
                probabilities.len(),
                classifier.n_classes()
            )));
        }

        probabilities
            .get(self.artifact.not_delayed_index())
            .copied()
            .ok_or_else(|| EngineError::Scoring("missing not-delayed probability".into()))
    }

    /// Score in `[0, 100]` for `record`; higher means lower risk of delay.
    pub fn score(&self, record: &ApplicantRecord) -> Result<u8, EngineError> {
        let probability = self.probability_not_delayed(record)?;
        let score = probability_to_score(probability)?;
        tracing::debug!("Scored applicant: p(not delayed)={:.4}, score={}", probability, score);
        Ok(score)
    }

    /// Scores `record` and keeps it alongside the score.
    pub fn score_result(&self, record: ApplicantRecord) -> Result<ScoreResult, EngineError> {
        let score = self.score(&record)?;
        Ok(ScoreResult {
            score,
            data: record,
        })
    }
}
