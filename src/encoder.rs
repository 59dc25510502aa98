//! One-hot feature encoding shared by training and inference.
//!
//! Categorical fields use a drop-first scheme: the baseline category of each
//! field gets no column, so a baseline value encodes as all zeros. Values
//! never seen at training time encode the same way. Numeric fields pass
//! through unchanged.
//!
//! The vocabulary (categories and baseline per field) is stored in the column
//! artifact, so inference never re-derives it.

use crate::models::{ApplicantRecord, CATEGORICAL_FIELDS, NUMERIC_FIELDS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Separator between a field name and a category value in column names.
pub const COLUMN_SEPARATOR: char = '_';

/// Builds the one-hot column name for `value` of `field`.
pub fn category_column(field: &str, value: &str) -> String {
    format!("{}{}{}", field, COLUMN_SEPARATOR, value)
}

/// Training-time vocabulary for one categorical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalVocabulary {
    pub field: String,
    /// The dropped category; it has no column.
    pub baseline: String,
    /// All distinct training values, sorted, baseline first.
    pub categories: Vec<String>,
}

impl CategoricalVocabulary {
    /// Fits a vocabulary from observed training values.
    ///
    /// Distinct values are sorted by code point and the first becomes the
    /// baseline. Returns `None` when no values were observed.
    pub fn fit<'a, I>(field: &str, values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut categories: Vec<String> = values.into_iter().map(str::to_string).collect();
        categories.sort();
        categories.dedup();

        let baseline = categories.first()?.clone();
        Some(Self {
            field: field.to_string(),
            baseline,
            categories,
        })
    }

    /// Column emitted for `value`, or `None` for the baseline and for unseen values.
    pub fn column_for(&self, value: &str) -> Option<String> {
        if value == self.baseline || !self.categories.iter().any(|c| c == value) {
            return None;
        }
        Some(category_column(&self.field, value))
    }

    /// Non-baseline columns in vocabulary order.
    pub fn columns(&self) -> impl Iterator<Item = String> + '_ {
        self.categories
            .iter()
            .filter(move |c| **c != self.baseline)
            .map(move |c| category_column(&self.field, c))
    }
}

/// Which fields are encoded and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingSchema {
    pub numeric_fields: Vec<String>,
    pub categorical_fields: Vec<CategoricalVocabulary>,
}

impl EncodingSchema {
    /// Encodes a record. Never fails: unknown categories contribute no column.
    pub fn encode(&self, record: &ApplicantRecord) -> EncodedFeatureVector {
        let mut encoded = EncodedFeatureVector::default();

        for field in &self.numeric_fields {
            if let Some(value) = record.numeric(field) {
                encoded.insert(field.clone(), value);
            }
        }

        for vocabulary in &self.categorical_fields {
            let Some(value) = record.categorical(&vocabulary.field) else {
                continue;
            };
            match vocabulary.column_for(value) {
                Some(column) => encoded.insert(column, 1.0),
                None if value != vocabulary.baseline => {
                    tracing::debug!(
                        "Unseen category {:?} for {}; encoding as baseline",
                        value,
                        vocabulary.field
                    );
                }
                None => {}
            }
        }

        encoded
    }

    /// Column layout training produces: numeric fields, then category columns field by field.
    pub fn training_columns(&self) -> Vec<String> {
        let mut columns = self.numeric_fields.clone();
        for vocabulary in &self.categorical_fields {
            columns.extend(vocabulary.columns());
        }
        columns
    }

    /// Checks that every field is one the record type knows and each vocabulary is well formed.
    pub fn validate(&self) -> Result<(), String> {
        for field in &self.numeric_fields {
            if !NUMERIC_FIELDS.contains(&field.as_str()) {
                return Err(format!("unknown numeric field '{}'", field));
            }
        }

        let mut seen = HashSet::new();
        for vocabulary in &self.categorical_fields {
            if !CATEGORICAL_FIELDS.contains(&vocabulary.field.as_str()) {
                return Err(format!("unknown categorical field '{}'", vocabulary.field));
            }
            if !seen.insert(vocabulary.field.as_str()) {
                return Err(format!("categorical field '{}' listed twice", vocabulary.field));
            }
            if !vocabulary.categories.contains(&vocabulary.baseline) {
                return Err(format!(
                    "baseline '{}' of '{}' is not one of its categories",
                    vocabulary.baseline, vocabulary.field
                ));
            }
        }

        Ok(())
    }
}

/// Sparse encoded record: column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedFeatureVector {
    values: BTreeMap<String, f64>,
}

impl EncodedFeatureVector {
    pub fn insert(&mut self, column: String, value: f64) {
        self.values.insert(column, value);
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Reindexes an encoded record onto the canonical column list.
///
/// The output has exactly `columns.len()` entries in `columns` order.
/// Missing columns become `0.0`; encoded columns outside the list are dropped.
pub fn align_to_columns(encoded: &EncodedFeatureVector, columns: &[String]) -> Vec<f64> {
    columns
        .iter()
        .map(|column| encoded.get(column).unwrap_or(0.0))
        .collect()
}
