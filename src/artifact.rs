//! Model artifact loading.
//!
//! An artifact is two JSON files produced by the training job:
//!
//! - the **model file**: identity, class labels and the serialized classifier;
//! - the **column file**: the encoding vocabulary and the canonical column list.
//!
//! Loading happens once at startup. Any problem is an
//! [`EngineError::ArtifactLoad`] and the service must not start without an
//! artifact. After load the artifact is immutable and shared read-only.

use crate::classifier::{Classifier, ClassifierSpec};
use crate::encoder::{EncodingSchema, COLUMN_SEPARATOR};
use crate::errors::EngineError;
use crate::models::{ModelInfo, CATEGORICAL_FIELDS, NUMERIC_FIELDS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Supported `format_version` of the model file.
pub const MODEL_FORMAT_VERSION: u32 = 1;
/// Supported `schema_version` of the column file.
pub const COLUMNS_SCHEMA_VERSION: u32 = 1;
/// Label of the "not delayed" class unless the model file says otherwise.
pub const DEFAULT_NOT_DELAYED_CLASS: i64 = 0;

fn default_not_delayed_class() -> i64 {
    DEFAULT_NOT_DELAYED_CLASS
}

/// Serialized model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub format_version: u32,
    pub model_name: String,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    /// Class labels in the order the classifier reports probabilities.
    pub classes: Vec<i64>,
    #[serde(default = "default_not_delayed_class")]
    pub not_delayed_class: i64,
    pub classifier: ClassifierSpec,
}

/// Serialized column file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnsFile {
    pub schema_version: u32,
    #[serde(flatten)]
    pub encoding: EncodingSchema,
    /// Canonical, ordered feature columns seen at training time.
    pub columns: Vec<String>,
    /// SHA-256 (hex) of the model file these columns were trained with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_sha256: Option<String>,
}

/// Identity of a loaded artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactMetadata {
    pub model_name: String,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    /// SHA-256 (hex) of the model file bytes; empty for artifacts built in memory.
    pub sha256: String,
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A classifier bound to its canonical column list and encoding vocabulary.
#[derive(Clone)]
pub struct ModelArtifact {
    classifier: Arc<dyn Classifier>,
    encoding: EncodingSchema,
    columns: Vec<String>,
    not_delayed_index: usize,
    metadata: ArtifactMetadata,
}

impl fmt::Debug for ModelArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifact")
            .field("classifier", &self.classifier.kind())
            .field("columns", &self.columns)
            .field("not_delayed_index", &self.not_delayed_index)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ModelArtifact {
    /// Binds a classifier to its columns, checking they agree.
    ///
    /// `not_delayed_index` is the position of the "not delayed" class in the
    /// classifier's probability vector.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        encoding: EncodingSchema,
        columns: Vec<String>,
        not_delayed_index: usize,
        metadata: ArtifactMetadata,
    ) -> Result<Self, EngineError> {
        let incompatible = |msg: String| EngineError::ArtifactLoad(msg);

        if columns.is_empty() {
            return Err(incompatible("canonical column list is empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(incompatible(format!("duplicate canonical column '{}'", dup)));
        }
        encoding.validate().map_err(incompatible)?;

        if classifier.n_features() != columns.len() {
            return Err(incompatible(format!(
                "classifier expects {} features but the column list has {}",
                classifier.n_features(),
                columns.len()
            )));
        }
        if classifier.n_classes() < 2 {
            return Err(incompatible(format!(
                "classifier reports {} classes; a binary classifier is required",
                classifier.n_classes()
            )));
        }
        if not_delayed_index >= classifier.n_classes() {
            return Err(incompatible(format!(
                "not-delayed class index {} is out of range for {} classes",
                not_delayed_index,
                classifier.n_classes()
            )));
        }

        // A canonical column that names an applicant field must be producible
        // by the encoding, otherwise it would be zero on every call.
        let encoded_columns = encoding.training_columns();
        let producible: HashSet<&str> = encoded_columns.iter().map(String::as_str).collect();
        if let Some(column) = columns
            .iter()
            .find(|c| names_applicant_field(c) && !producible.contains(c.as_str()))
        {
            return Err(incompatible(format!(
                "canonical column '{}' is never produced by the encoding vocabulary",
                column
            )));
        }

        let canonical: HashSet<&str> = columns.iter().map(String::as_str).collect();
        for column in encoded_columns {
            if !canonical.contains(column.as_str()) {
                tracing::warn!("Encoded column '{}' is not in the canonical list", column);
            }
        }

        Ok(Self {
            classifier,
            encoding,
            columns,
            not_delayed_index,
            metadata,
        })
    }

    /// Loads the artifact from its model file and column file.
    pub fn load(
        model_path: impl AsRef<Path>,
        columns_path: impl AsRef<Path>,
    ) -> Result<Self, EngineError> {
        Self::load_with_checksum(model_path, columns_path, None)
    }

    /// Loads the artifact, also requiring the model file to hash to `expected_sha256`.
    pub fn load_with_checksum(
        model_path: impl AsRef<Path>,
        columns_path: impl AsRef<Path>,
        expected_sha256: Option<&str>,
    ) -> Result<Self, EngineError> {
        let model_path = model_path.as_ref();
        let columns_path = columns_path.as_ref();

        let model_bytes = read_file(model_path)?;
        let columns_bytes = read_file(columns_path)?;
        let digest = sha256_hex(&model_bytes);

        let model: ModelFile = serde_json::from_slice(&model_bytes).map_err(|e| {
            EngineError::ArtifactLoad(format!("{}: invalid model file: {}", model_path.display(), e))
        })?;
        let columns: ColumnsFile = serde_json::from_slice(&columns_bytes).map_err(|e| {
            EngineError::ArtifactLoad(format!(
                "{}: invalid column file: {}",
                columns_path.display(),
                e
            ))
        })?;

        for expected in [expected_sha256, columns.classifier_sha256.as_deref()]
            .into_iter()
            .flatten()
        {
            if !expected.eq_ignore_ascii_case(&digest) {
                return Err(EngineError::ArtifactLoad(format!(
                    "{}: checksum mismatch (expected {}, found {})",
                    model_path.display(),
                    expected,
                    digest
                )));
            }
        }

        let artifact = Self::from_files(model, columns, digest)?;
        tracing::info!(
            "Loaded model artifact {} {} ({}, {} columns, sha256 {})",
            artifact.metadata.model_name,
            artifact.metadata.model_version,
            artifact.classifier.kind(),
            artifact.columns.len(),
            artifact.metadata.sha256
        );
        Ok(artifact)
    }

    /// Builds an artifact from already-parsed files.
    pub fn from_files(
        model: ModelFile,
        columns: ColumnsFile,
        sha256: String,
    ) -> Result<Self, EngineError> {
        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(EngineError::ArtifactLoad(format!(
                "unsupported model format version {}",
                model.format_version
            )));
        }
        if columns.schema_version != COLUMNS_SCHEMA_VERSION {
            return Err(EngineError::ArtifactLoad(format!(
                "unsupported column schema version {}",
                columns.schema_version
            )));
        }

        model
            .classifier
            .validate()
            .map_err(|e| EngineError::ArtifactLoad(format!("malformed classifier: {}", e)))?;

        if model.classes.len() != model.classifier.n_classes() {
            return Err(EngineError::ArtifactLoad(format!(
                "model lists {} classes but the classifier produces {}",
                model.classes.len(),
                model.classifier.n_classes()
            )));
        }
        let not_delayed_index = model
            .classes
            .iter()
            .position(|c| *c == model.not_delayed_class)
            .ok_or_else(|| {
                EngineError::ArtifactLoad(format!(
                    "not-delayed class {} is not among classes {:?}",
                    model.not_delayed_class, model.classes
                ))
            })?;

        let metadata = ArtifactMetadata {
            model_name: model.model_name,
            model_version: model.model_version,
            trained_at: model.trained_at,
            sha256,
        };

        Self::new(
            Arc::new(model.classifier),
            columns.encoding,
            columns.columns,
            not_delayed_index,
            metadata,
        )
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn encoding(&self) -> &EncodingSchema {
        &self.encoding
    }

    /// Canonical, ordered feature columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn not_delayed_index(&self) -> usize {
        self.not_delayed_index
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Summary served by the model info endpoint.
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.metadata.model_name.clone(),
            model_version: self.metadata.model_version.clone(),
            trained_at: self.metadata.trained_at,
            classifier_kind: self.classifier.kind().to_string(),
            column_count: self.columns.len(),
            columns: self.columns.clone(),
            sha256: self.metadata.sha256.clone(),
        }
    }
}

/// Whether `column` is a numeric field or a `{categorical_field}_{value}` column.
fn names_applicant_field(column: &str) -> bool {
    NUMERIC_FIELDS.contains(&column)
        || CATEGORICAL_FIELDS.iter().any(|field| {
            column
                .strip_prefix(*field)
                .is_some_and(|rest| rest.starts_with(COLUMN_SEPARATOR))
        })
}

fn read_file(path: &Path) -> Result<Vec<u8>, EngineError> {
    std::fs::read(path)
        .map_err(|e| EngineError::ArtifactLoad(format!("{}: {}", path.display(), e)))
}
