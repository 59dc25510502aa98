use crate::errors::AppError;
use crate::models::{ApplicantRecord, ModelInfo, SimulationResult, REQUIRED_FIELDS};
use crate::simulation::SimulationEngine;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
///
/// The engine wraps the artifact loaded at startup; nothing here is mutated
/// after construction.
#[derive(Clone)]
pub struct AppState {
    pub engine: SimulationEngine,
}

impl AppState {
    pub fn new(engine: SimulationEngine) -> Self {
        Self { engine }
    }
}

/// Routes served by the API. Middleware is layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/model", get(model_info))
        .with_state(state)
}

/// Liveness banner.
pub async fn index() -> &'static str {
    "ATLAS API is running!"
}

/// Health check endpoint.
///
/// Returns the service status, version and the model being served.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let metadata = state.engine.scoring().artifact().metadata();
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "atlas-score-api",
            "version": env!("CARGO_PKG_VERSION"),
            "model_version": metadata.model_version,
        })),
    )
}

/// Rejects payloads that are not objects carrying every required key.
///
/// Presence is checked here; value types are checked when the record is decoded.
pub fn validate_required_keys(payload: &Value) -> Result<(), AppError> {
    let missing: Vec<&str> = match payload.as_object() {
        Some(obj) => REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|key| !obj.contains_key(*key))
            .collect(),
        None => REQUIRED_FIELDS.to_vec(),
    };

    if missing.is_empty() {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Missing required keys. Required: [{}]. Missing: [{}]",
        REQUIRED_FIELDS.join(", "),
        missing.join(", ")
    )))
}

/// POST /predict
///
/// Scores an applicant and runs the what-if scenarios.
///
/// # Returns
///
/// * `Result<Json<SimulationResult>, AppError>` - `base_case` plus one
///   `simulation_<rule>` entry per scenario that applied, or an error.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<SimulationResult>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!("JSON rejection: {}", rejection);
        AppError::BadRequest("Invalid input, JSON required".to_string())
    })?;

    validate_required_keys(&payload)?;
    let record: ApplicantRecord = serde_json::from_value(payload)?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);
    let result = span.in_scope(|| {
        tracing::info!(
            "POST /predict - residence: {}, guarantor: {}, other debt: {}",
            record.residence_type,
            record.guarantor,
            record.other_debt
        );
        state.engine.run_simulations(&record)
    })?;

    Ok(Json(result))
}

/// GET /api/v1/model
///
/// Identity and canonical columns of the loaded artifact.
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    Json(state.engine.scoring().artifact().info())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_keys_present() {
        let payload = json!({
            "Age": 34, "Residence_Type": "Rental", "Years_at_Work": 1,
            "Annual_Income_JPY_10k": 400, "Other_Debt_JPY_10k": 100,
            "Guarantor": "No", "Medical_History": "なし", "Payment_Rate": null
        });
        assert!(validate_required_keys(&payload).is_ok());
    }

    #[test]
    fn test_missing_key_is_named() {
        let payload = json!({"Age": 34});
        match validate_required_keys(&payload) {
            Err(AppError::BadRequest(msg)) => {
                assert!(msg.starts_with("Missing required keys."));
                assert!(msg.contains("Missing: [Residence_Type"));
                assert!(!msg.contains("Missing: [Age"));
            }
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(validate_required_keys(&json!([1, 2, 3])).is_err());
        assert!(validate_required_keys(&json!("Age")).is_err());
    }
}
