//! What-if simulations over a base applicant.
//!
//! Each [`ScenarioRule`] inspects the base record and, when it fires, derives
//! one variant with a single field changed. Variants are always built from
//! the base record, never from another variant.

use crate::artifact::ModelArtifact;
use crate::errors::EngineError;
use crate::models::{ApplicantRecord, SimulationResult};
use crate::scoring::ScoringEngine;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const GUARANTOR_YES: &str = "Yes";
pub const GUARANTOR_NO: &str = "No";

/// Fixed counterfactual rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioRule {
    /// Applicant without a guarantor: what if they had one?
    Guarantor,
    /// Applicant with other debt: what if it were paid off?
    NoDebt,
}

impl ScenarioRule {
    pub const ALL: [ScenarioRule; 2] = [ScenarioRule::Guarantor, ScenarioRule::NoDebt];

    /// Name used as the `simulation_<name>` key.
    pub fn name(self) -> &'static str {
        match self {
            ScenarioRule::Guarantor => "guarantor",
            ScenarioRule::NoDebt => "no_debt",
        }
    }

    pub fn applies(self, record: &ApplicantRecord) -> bool {
        match self {
            ScenarioRule::Guarantor => record.guarantor == GUARANTOR_NO,
            ScenarioRule::NoDebt => record.other_debt > 0.0,
        }
    }

    /// The variant of `record` this rule describes.
    pub fn apply(self, record: &ApplicantRecord) -> ApplicantRecord {
        let mut variant = record.clone();
        match self {
            ScenarioRule::Guarantor => variant.guarantor = GUARANTOR_YES.to_string(),
            ScenarioRule::NoDebt => variant.other_debt = 0.0,
        }
        variant
    }
}

/// Runs the base score plus every applicable scenario.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    scoring: ScoringEngine,
}

impl SimulationEngine {
    pub fn new(scoring: ScoringEngine) -> Self {
        Self { scoring }
    }

    pub fn from_artifact(artifact: Arc<ModelArtifact>) -> Self {
        Self::new(ScoringEngine::new(artifact))
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    /// Scores `record` and each scenario that fires for it.
    ///
    /// Fails as a whole if any single score fails; no partial result is returned.
    pub fn run_simulations(
        &self,
        record: &ApplicantRecord,
    ) -> Result<SimulationResult, EngineError> {
        let base_case = self.scoring.score_result(record.clone())?;

        let mut scenarios = BTreeMap::new();
        for rule in ScenarioRule::ALL {
            if !rule.applies(record) {
                continue;
            }
            let result = self.scoring.score_result(rule.apply(record))?;
            tracing::debug!(
                "Scenario {}: score {} -> {}",
                rule.name(),
                base_case.score,
                result.score
            );
            scenarios.insert(rule.name().to_string(), result);
        }

        tracing::info!(
            "Simulation complete: base score {}, {} scenario(s)",
            base_case.score,
            scenarios.len()
        );

        Ok(SimulationResult {
            base_case,
            scenarios,
        })
    }
}
