use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

// ============ Applicant Fields ============

pub const FIELD_AGE: &str = "Age";
pub const FIELD_RESIDENCE_TYPE: &str = "Residence_Type";
pub const FIELD_YEARS_AT_WORK: &str = "Years_at_Work";
pub const FIELD_ANNUAL_INCOME: &str = "Annual_Income_JPY_10k";
pub const FIELD_OTHER_DEBT: &str = "Other_Debt_JPY_10k";
pub const FIELD_GUARANTOR: &str = "Guarantor";
pub const FIELD_MEDICAL_HISTORY: &str = "Medical_History";
pub const FIELD_PAYMENT_RATE: &str = "Payment_Rate";

/// Keys the request layer must see before a record is handed to the engine.
pub const REQUIRED_FIELDS: [&str; 8] = [
    FIELD_AGE,
    FIELD_RESIDENCE_TYPE,
    FIELD_YEARS_AT_WORK,
    FIELD_ANNUAL_INCOME,
    FIELD_OTHER_DEBT,
    FIELD_GUARANTOR,
    FIELD_MEDICAL_HISTORY,
    FIELD_PAYMENT_RATE,
];

/// Numeric fields, in the order they appear in a record.
pub const NUMERIC_FIELDS: [&str; 5] = [
    FIELD_AGE,
    FIELD_YEARS_AT_WORK,
    FIELD_ANNUAL_INCOME,
    FIELD_OTHER_DEBT,
    FIELD_PAYMENT_RATE,
];

/// Categorical fields, in the order their one-hot columns are laid out.
pub const CATEGORICAL_FIELDS: [&str; 3] =
    [FIELD_RESIDENCE_TYPE, FIELD_GUARANTOR, FIELD_MEDICAL_HISTORY];

/// Payment rate used when the upstream ratio is undefined.
pub const DEFAULT_PAYMENT_RATE: f64 = 1.0;

// ============ Applicant Record ============

/// A loan applicant as received from the request layer.
///
/// Field names on the wire match the training dataset. Keys outside the
/// fixed schema are kept in `extra` so they can be echoed back, but they
/// never reach the encoder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireApplicant")]
pub struct ApplicantRecord {
    /// Applicant age in years.
    pub age: f64,
    /// Residence type (e.g. `Own_House`, `Rental`, `Family_House`, `Company_House`).
    pub residence_type: String,
    /// Years at the current workplace.
    pub years_at_work: f64,
    /// Annual income, in units of 10,000 JPY.
    pub annual_income: f64,
    /// Outstanding debt elsewhere, in units of 10,000 JPY.
    pub other_debt: f64,
    /// Whether a guarantor is provided (`Yes` / `No`).
    pub guarantor: String,
    /// Medical history label, treated as a category.
    pub medical_history: String,
    /// Ratio of payments made to payments claimed, in `[0, 1]`.
    pub payment_rate: f64,
    /// Caller-supplied keys outside the schema.
    pub extra: Map<String, Value>,
    /// Numbers exactly as the caller wrote them, keyed by wire name.
    ///
    /// While a field still holds the value it was read with, it is echoed
    /// from here, so `34` comes back as `34` and not `34.0`.
    pub wire_numbers: BTreeMap<String, Number>,
}

/// Wire shape of an applicant, before numbers are widened to `f64`.
#[derive(Deserialize)]
struct WireApplicant {
    #[serde(rename = "Age")]
    age: Number,
    #[serde(rename = "Residence_Type")]
    residence_type: String,
    #[serde(rename = "Years_at_Work")]
    years_at_work: Number,
    #[serde(rename = "Annual_Income_JPY_10k")]
    annual_income: Number,
    #[serde(rename = "Other_Debt_JPY_10k")]
    other_debt: Number,
    #[serde(rename = "Guarantor")]
    guarantor: String,
    #[serde(rename = "Medical_History")]
    medical_history: String,
    #[serde(rename = "Payment_Rate", deserialize_with = "required_nullable")]
    payment_rate: Option<Number>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// `Payment_Rate` must be present, but may be `null` when the upstream ratio is undefined.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::deserialize(deserializer)
}

impl TryFrom<WireApplicant> for ApplicantRecord {
    type Error = String;

    fn try_from(wire: WireApplicant) -> Result<Self, Self::Error> {
        let mut wire_numbers = BTreeMap::new();
        let mut read = |field: &str, raw: Number| -> Result<f64, String> {
            let value = raw
                .as_f64()
                .ok_or_else(|| format!("{} is not a representable number", field))?;
            wire_numbers.insert(field.to_string(), raw);
            Ok(value)
        };

        let age = read(FIELD_AGE, wire.age)?;
        let years_at_work = read(FIELD_YEARS_AT_WORK, wire.years_at_work)?;
        let annual_income = read(FIELD_ANNUAL_INCOME, wire.annual_income)?;
        let other_debt = read(FIELD_OTHER_DEBT, wire.other_debt)?;
        let payment_rate = match wire.payment_rate {
            Some(raw) => read(FIELD_PAYMENT_RATE, raw)?,
            None => DEFAULT_PAYMENT_RATE,
        };

        Ok(Self {
            age,
            residence_type: wire.residence_type,
            years_at_work,
            annual_income,
            other_debt,
            guarantor: wire.guarantor,
            medical_history: wire.medical_history,
            payment_rate,
            extra: wire.extra,
            wire_numbers,
        })
    }
}

impl Serialize for ApplicantRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(REQUIRED_FIELDS.len() + self.extra.len()))?;
        map.serialize_entry(FIELD_AGE, &self.wire_number(FIELD_AGE, self.age))?;
        map.serialize_entry(FIELD_RESIDENCE_TYPE, &self.residence_type)?;
        map.serialize_entry(
            FIELD_YEARS_AT_WORK,
            &self.wire_number(FIELD_YEARS_AT_WORK, self.years_at_work),
        )?;
        map.serialize_entry(
            FIELD_ANNUAL_INCOME,
            &self.wire_number(FIELD_ANNUAL_INCOME, self.annual_income),
        )?;
        map.serialize_entry(
            FIELD_OTHER_DEBT,
            &self.wire_number(FIELD_OTHER_DEBT, self.other_debt),
        )?;
        map.serialize_entry(FIELD_GUARANTOR, &self.guarantor)?;
        map.serialize_entry(FIELD_MEDICAL_HISTORY, &self.medical_history)?;
        map.serialize_entry(
            FIELD_PAYMENT_RATE,
            &self.wire_number(FIELD_PAYMENT_RATE, self.payment_rate),
        )?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl ApplicantRecord {
    /// The caller's own number for `field` if `value` is unchanged, else `value`.
    fn wire_number(&self, field: &str, value: f64) -> Value {
        match self.wire_numbers.get(field) {
            Some(raw) if raw.as_f64() == Some(value) => Value::Number(raw.clone()),
            _ => Number::from_f64(value).map_or(Value::Null, Value::Number),
        }
    }

    /// Looks up a numeric field by its wire name.
    pub fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            FIELD_AGE => Some(self.age),
            FIELD_YEARS_AT_WORK => Some(self.years_at_work),
            FIELD_ANNUAL_INCOME => Some(self.annual_income),
            FIELD_OTHER_DEBT => Some(self.other_debt),
            FIELD_PAYMENT_RATE => Some(self.payment_rate),
            _ => None,
        }
    }

    /// Looks up a categorical field by its wire name.
    pub fn categorical(&self, field: &str) -> Option<&str> {
        match field {
            FIELD_RESIDENCE_TYPE => Some(self.residence_type.as_str()),
            FIELD_GUARANTOR => Some(self.guarantor.as_str()),
            FIELD_MEDICAL_HISTORY => Some(self.medical_history.as_str()),
            _ => None,
        }
    }
}

// ============ Results ============

/// A single score together with the record that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    /// Score in `[0, 100]`; higher means lower risk of payment delay.
    pub score: u8,
    /// The applicant data that was scored.
    pub data: ApplicantRecord,
}

/// Base score plus one entry per counterfactual rule that fired.
///
/// Serializes flat: `base_case` followed by `simulation_<rule>` keys.
/// Rules that did not fire have no key at all.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub base_case: ScoreResult,
    pub scenarios: BTreeMap<String, ScoreResult>,
}

/// Key prefix used for scenario entries in the serialized result.
pub const SCENARIO_KEY_PREFIX: &str = "simulation_";

impl SimulationResult {
    pub fn scenario(&self, name: &str) -> Option<&ScoreResult> {
        self.scenarios.get(name)
    }
}

impl Serialize for SimulationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1 + self.scenarios.len()))?;
        map.serialize_entry("base_case", &self.base_case)?;
        for (name, result) in &self.scenarios {
            map.serialize_entry(&format!("{}{}", SCENARIO_KEY_PREFIX, name), result)?;
        }
        map.end()
    }
}

// ============ API Responses ============

/// Identity of the artifact the service is scoring with.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub classifier_kind: String,
    pub column_count: usize,
    pub columns: Vec<String>,
    /// SHA-256 of the classifier file (hex).
    pub sha256: String,
}
