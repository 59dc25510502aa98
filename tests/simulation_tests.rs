/// Simulation engine tests: scenario firing, independence and fail-fast behaviour
mod common;

use atlas_score_api::core::simulation::{ScenarioRule, SimulationEngine};
use atlas_score_api::errors::EngineError;
use common::*;
use serde_json::Value;
use std::sync::Arc;

/// Number of top-level record fields whose values differ.
fn changed_fields(a: &impl serde::Serialize, b: &impl serde::Serialize) -> Vec<String> {
    let a = serde_json::to_value(a).unwrap();
    let b = serde_json::to_value(b).unwrap();
    let (Value::Object(a), Value::Object(b)) = (a, b) else {
        panic!("records serialize as objects");
    };
    a.iter()
        .filter(|(k, v)| b.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect()
}

#[test]
fn test_both_rules_fire_with_three_score_calls() {
    let classifier = fixed_classifier(0.62);
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(classifier.clone())));
    let base = sample_record();

    let result = engine.run_simulations(&base).unwrap();

    assert_eq!(result.base_case.score, 62);
    assert_eq!(result.base_case.data, base);
    assert_eq!(classifier.calls(), 3);

    let guarantor = result.scenario("guarantor").expect("guarantor scenario");
    assert_eq!(guarantor.data.guarantor, "Yes");
    assert_eq!(guarantor.data.other_debt, 150.0);

    let no_debt = result.scenario("no_debt").expect("no_debt scenario");
    assert_eq!(no_debt.data.other_debt, 0.0);
    assert_eq!(no_debt.data.guarantor, "No");
}

#[test]
fn test_no_rules_fire_for_guaranteed_debt_free_applicant() {
    let classifier = fixed_classifier(0.9);
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(classifier.clone())));

    let mut record = sample_record();
    record.guarantor = "Yes".into();
    record.other_debt = 0.0;

    let result = engine.run_simulations(&record).unwrap();
    assert!(result.scenarios.is_empty());
    assert_eq!(classifier.calls(), 1);

    let value = serde_json::to_value(&result).unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["base_case"]);
}

#[test]
fn test_only_guarantor_rule_fires_without_debt() {
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(fixed_classifier(0.5))));

    let mut record = sample_record();
    record.other_debt = 0.0;

    let result = engine.run_simulations(&record).unwrap();
    assert!(result.scenario("guarantor").is_some());
    assert!(result.scenario("no_debt").is_none());
}

#[test]
fn test_variants_each_change_exactly_one_field() {
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(fixed_classifier(0.5))));
    let base = sample_record();

    let result = engine.run_simulations(&base).unwrap();

    let guarantor = &result.scenario("guarantor").unwrap().data;
    assert_eq!(changed_fields(&base, guarantor), vec!["Guarantor"]);

    let no_debt = &result.scenario("no_debt").unwrap().data;
    assert_eq!(changed_fields(&base, no_debt), vec!["Other_Debt_JPY_10k"]);
}

#[test]
fn test_scenario_scores_reflect_their_edit() {
    let guarantor_col = column_index("Guarantor_Yes");
    let debt_col = column_index("Other_Debt_JPY_10k");
    let classifier = Arc::new(FnClassifier::new(reference_columns().len(), move |x: &[f64]| {
        Ok(0.5 + 0.3 * x[guarantor_col] - 0.001 * x[debt_col])
    }));
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(classifier)));

    let result = engine.run_simulations(&sample_record()).unwrap();

    // 0.5 - 0.15 = 0.35; guarantor adds 0.3; clearing debt removes the 0.15 penalty.
    assert_eq!(result.base_case.score, 35);
    assert_eq!(result.scenario("guarantor").unwrap().score, 65);
    assert_eq!(result.scenario("no_debt").unwrap().score, 50);
}

#[test]
fn test_failed_scenario_fails_whole_simulation() {
    let guarantor_col = column_index("Guarantor_Yes");
    let classifier = Arc::new(FnClassifier::new(reference_columns().len(), move |x: &[f64]| {
        if x[guarantor_col] > 0.0 {
            Err(EngineError::Scoring("guarantor column rejected".into()))
        } else {
            Ok(0.5)
        }
    }));
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(classifier)));

    let err = engine.run_simulations(&sample_record()).unwrap_err();
    assert!(matches!(err, EngineError::Scoring(_)));
}

#[test]
fn test_failed_base_score_stops_before_scenarios() {
    let classifier = Arc::new(FnClassifier::new(reference_columns().len(), |_: &[f64]| {
        Err(EngineError::Scoring("unavailable".into()))
    }));
    let engine = SimulationEngine::from_artifact(Arc::new(artifact_with(classifier.clone())));

    assert!(engine.run_simulations(&sample_record()).is_err());
    assert_eq!(classifier.calls(), 1);
}

#[test]
fn test_forest_fixture_simulation() {
    let engine = SimulationEngine::from_artifact(Arc::new(forest_artifact()));

    let result = engine.run_simulations(&sample_record()).unwrap();
    assert_eq!(result.base_case.score, 65);
    assert_eq!(result.scenario("guarantor").unwrap().score, 80);
    assert_eq!(result.scenario("no_debt").unwrap().score, 85);

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["simulation_guarantor"]["data"]["Guarantor"], "Yes");
    assert_eq!(value["simulation_no_debt"]["data"]["Other_Debt_JPY_10k"], 0.0);
}

#[test]
fn test_rules_are_evaluated_against_base_record() {
    let base = sample_record();
    for rule in ScenarioRule::ALL {
        assert!(rule.applies(&base), "{} should fire", rule.name());
        let variant = rule.apply(&base);
        assert!(!rule.applies(&variant), "{} should not re-fire", rule.name());
    }
}
