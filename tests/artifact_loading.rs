/// Artifact file round trips and load-time validation
mod common;

use atlas_score_api::artifact::{sha256_hex, ColumnsFile, ModelArtifact};
use atlas_score_api::errors::EngineError;
use atlas_score_api::training::{reference_dataset, train, TrainedArtifact, TrainingConfig};
use common::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn trained() -> TrainedArtifact {
    train(&reference_dataset(), &TrainingConfig::default()).unwrap()
}

/// Writes a freshly trained artifact into `dir`, returning both paths and the digest.
fn write_trained(dir: &Path) -> (PathBuf, PathBuf, String) {
    let model_path = dir.join("models").join("atlas_model.json");
    let columns_path = dir.join("models").join("model_columns.json");
    let digest = trained().write(&model_path, &columns_path).unwrap();
    (model_path, columns_path, digest)
}

fn assert_load_error(result: Result<ModelArtifact, EngineError>, needle: &str) {
    match result {
        Err(EngineError::ArtifactLoad(msg)) => {
            assert!(msg.contains(needle), "'{}' does not mention '{}'", msg, needle)
        }
        other => panic!("expected artifact load error, got {:?}", other),
    }
}

#[test]
fn test_written_artifact_loads_back() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path, digest) = write_trained(dir.path());

    let artifact = ModelArtifact::load(&model_path, &columns_path).unwrap();

    assert_eq!(artifact.metadata().sha256, digest);
    assert_eq!(artifact.metadata().model_name, "atlas");
    assert_eq!(artifact.columns(), reference_columns().as_slice());
    assert_eq!(artifact.info().classifier_kind, "logistic_regression");

    let bytes = std::fs::read(&model_path).unwrap();
    assert_eq!(sha256_hex(&bytes), digest);
}

#[test]
fn test_column_file_records_model_digest() {
    let dir = TempDir::new().unwrap();
    let (_, columns_path, digest) = write_trained(dir.path());

    let columns: ColumnsFile =
        serde_json::from_slice(&std::fs::read(&columns_path).unwrap()).unwrap();
    assert_eq!(columns.classifier_sha256.as_deref(), Some(digest.as_str()));
}

#[test]
fn test_expected_checksum_is_enforced() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path, digest) = write_trained(dir.path());

    assert!(
        ModelArtifact::load_with_checksum(&model_path, &columns_path, Some(&digest)).is_ok()
    );
    assert!(ModelArtifact::load_with_checksum(
        &model_path,
        &columns_path,
        Some(&digest.to_uppercase())
    )
    .is_ok());

    let wrong = "0".repeat(64);
    assert_load_error(
        ModelArtifact::load_with_checksum(&model_path, &columns_path, Some(&wrong)),
        "checksum mismatch",
    );
}

#[test]
fn test_tampered_model_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path, _) = write_trained(dir.path());

    let text = std::fs::read_to_string(&model_path).unwrap();
    std::fs::write(&model_path, text.replace("\"v2\"", "\"v2-patched\"")).unwrap();

    assert_load_error(
        ModelArtifact::load(&model_path, &columns_path),
        "checksum mismatch",
    );
}

#[test]
fn test_missing_files_are_load_errors() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path, _) = write_trained(dir.path());

    assert_load_error(
        ModelArtifact::load(dir.path().join("absent.json"), &columns_path),
        "absent.json",
    );
    assert_load_error(
        ModelArtifact::load(&model_path, dir.path().join("no_columns.json")),
        "no_columns.json",
    );
}

#[test]
fn test_corrupt_json_is_load_error() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path, _) = write_trained(dir.path());

    std::fs::write(&columns_path, b"{ not json").unwrap();
    assert_load_error(
        ModelArtifact::load(&model_path, &columns_path),
        "invalid column file",
    );

    std::fs::write(&model_path, b"[]").unwrap();
    assert_load_error(
        ModelArtifact::load(&model_path, fixture_path("forest_columns.json")),
        "invalid model file",
    );
}

#[test]
fn test_column_count_mismatch_is_load_error() {
    let dir = TempDir::new().unwrap();
    let mut artifact = trained();
    artifact.columns.columns.pop();
    let model_path = dir.path().join("model.json");
    let columns_path = dir.path().join("columns.json");
    artifact.write(&model_path, &columns_path).unwrap();

    assert_load_error(
        ModelArtifact::load(&model_path, &columns_path),
        "features but the column list has",
    );
}

/// Copies the forest fixture into `dir`, editing its column file first.
fn forest_with_columns(dir: &Path, edit: impl FnOnce(&mut ColumnsFile)) -> (PathBuf, PathBuf) {
    let mut columns: ColumnsFile =
        serde_json::from_slice(&std::fs::read(fixture_path("forest_columns.json")).unwrap())
            .unwrap();
    edit(&mut columns);

    let columns_path = dir.join("columns.json");
    std::fs::write(&columns_path, serde_json::to_vec_pretty(&columns).unwrap()).unwrap();
    (fixture_path("forest_model.json"), columns_path)
}

#[test]
fn test_canonical_numeric_column_missing_from_encoding_is_load_error() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path) = forest_with_columns(dir.path(), |columns| {
        columns.encoding.numeric_fields.retain(|f| f != "Payment_Rate");
    });

    assert_load_error(
        ModelArtifact::load(&model_path, &columns_path),
        "'Payment_Rate' is never produced",
    );
}

#[test]
fn test_canonical_category_column_missing_from_vocabulary_is_load_error() {
    let dir = TempDir::new().unwrap();
    let (model_path, columns_path) = forest_with_columns(dir.path(), |columns| {
        let residence = &mut columns.encoding.categorical_fields[0];
        assert_eq!(residence.field, "Residence_Type");
        residence.categories.retain(|c| c != "Rental");
    });

    assert_load_error(
        ModelArtifact::load(&model_path, &columns_path),
        "'Residence_Type_Rental' is never produced",
    );
}

#[test]
fn test_forest_fixture_loads() {
    let artifact = forest_artifact();
    assert_eq!(artifact.info().classifier_kind, "tree_ensemble");
    assert_eq!(artifact.columns().len(), 11);
    assert_eq!(artifact.not_delayed_index(), 0);
    assert_eq!(artifact.metadata().sha256.len(), 64);
}
