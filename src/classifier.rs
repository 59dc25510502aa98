//! Binary classifiers that can be loaded from a JSON artifact.
//!
//! The engine only talks to the [`Classifier`] trait; the serialized kinds
//! below are what the training job (or an external exporter) writes.

use crate::errors::EngineError;
use serde::{Deserialize, Serialize};

/// A trained classifier returning one probability per class.
pub trait Classifier: Send + Sync {
    /// Number of input features expected by `predict_proba`.
    fn n_features(&self) -> usize;

    /// Number of classes in the returned probability vector.
    fn n_classes(&self) -> usize;

    /// Class probabilities for a single aligned feature vector.
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, EngineError>;

    /// Short identifier for logs and the model info endpoint.
    fn kind(&self) -> &str;
}

fn check_input(features: &[f64], expected: usize) -> Result<(), EngineError> {
    if features.len() != expected {
        return Err(EngineError::Scoring(format!(
            "expected {} features, got {}",
            expected,
            features.len()
        )));
    }
    if let Some(i) = features.iter().position(|x| !x.is_finite()) {
        return Err(EngineError::Scoring(format!(
            "feature {} is not a finite number",
            i
        )));
    }
    Ok(())
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

// ============ Logistic Regression ============

/// Logistic regression over standardized features.
///
/// `P(class 1) = sigmoid(intercept + Σ coefficient_i * (x_i - mean_i) / scale_i)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_means: Vec<f64>,
    pub feature_scales: Vec<f64>,
}

impl LogisticRegression {
    fn validate(&self) -> Result<(), String> {
        let n = self.coefficients.len();
        if n == 0 {
            return Err("logistic regression has no coefficients".into());
        }
        if self.feature_means.len() != n || self.feature_scales.len() != n {
            return Err(format!(
                "logistic regression has {} coefficients but {} means and {} scales",
                n,
                self.feature_means.len(),
                self.feature_scales.len()
            ));
        }
        let mut params = self
            .coefficients
            .iter()
            .chain(&self.feature_means)
            .chain(std::iter::once(&self.intercept));
        if params.any(|p| !p.is_finite()) {
            return Err("logistic regression has non-finite parameters".into());
        }
        if self.feature_scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("feature scales must be finite and positive".into());
        }
        Ok(())
    }
}

impl Classifier for LogisticRegression {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn n_classes(&self) -> usize {
        2
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, EngineError> {
        check_input(features, self.n_features())?;

        let z = features
            .iter()
            .zip(&self.coefficients)
            .zip(self.feature_means.iter().zip(&self.feature_scales))
            .fold(self.intercept, |acc, ((x, w), (mean, scale))| {
                acc + w * (x - mean) / scale
            });
        let positive = sigmoid(z);

        Ok(vec![1.0 - positive, positive])
    }

    fn kind(&self) -> &str {
        "logistic_regression"
    }
}

// ============ Tree Ensemble ============

/// A node of a binary decision tree.
///
/// Splits send `x[feature] <= threshold` left. Child indices always point
/// forward in the node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        probabilities: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn leaf_for(&self, features: &[f64]) -> Result<&[f64], EngineError> {
        let mut index = 0;
        // Forward-only children bound the walk by the node count.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { probabilities }) => return Ok(probabilities.as_slice()),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = features.get(*feature).ok_or_else(|| {
                        EngineError::Scoring(format!("split on missing feature {}", feature))
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(EngineError::Scoring(format!(
                        "tree node {} does not exist",
                        index
                    )))
                }
            }
        }
        Err(EngineError::Scoring("tree walk did not reach a leaf".into()))
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {} splits on feature {} but the model has {}",
                            i, feature, n_features
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", i));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", i, child));
                        }
                    }
                }
                TreeNode::Leaf { probabilities } => {
                    if probabilities.len() != n_classes {
                        return Err(format!(
                            "leaf {} has {} probabilities, expected {}",
                            i,
                            probabilities.len(),
                            n_classes
                        ));
                    }
                    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
                        return Err(format!("leaf {} has invalid probabilities", i));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Random-forest style ensemble: class probabilities are averaged over trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
}

impl TreeEnsemble {
    fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("tree ensemble has no trees".into());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes)
                .map_err(|e| format!("tree {}: {}", t, e))?;
        }
        Ok(())
    }
}

impl Classifier for TreeEnsemble {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, EngineError> {
        check_input(features, self.n_features)?;
        if self.trees.is_empty() {
            return Err(EngineError::Scoring("tree ensemble has no trees".into()));
        }

        let mut totals = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let leaf = tree.leaf_for(features)?;
            if leaf.len() != self.n_classes {
                return Err(EngineError::Scoring(format!(
                    "leaf has {} probabilities, expected {}",
                    leaf.len(),
                    self.n_classes
                )));
            }
            for (total, p) in totals.iter_mut().zip(leaf) {
                *total += p;
            }
        }

        let n_trees = self.trees.len() as f64;
        Ok(totals.into_iter().map(|t| t / n_trees).collect())
    }

    fn kind(&self) -> &str {
        "tree_ensemble"
    }
}

// ============ Serialized Form ============

/// Classifier as stored in the model artifact, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    LogisticRegression(LogisticRegression),
    TreeEnsemble(TreeEnsemble),
}

impl ClassifierSpec {
    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ClassifierSpec::LogisticRegression(model) => model.validate(),
            ClassifierSpec::TreeEnsemble(model) => model.validate(),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            ClassifierSpec::LogisticRegression(model) => model,
            ClassifierSpec::TreeEnsemble(model) => model,
        }
    }
}

impl Classifier for ClassifierSpec {
    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn n_classes(&self) -> usize {
        self.inner().n_classes()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, EngineError> {
        self.inner().predict_proba(features)
    }

    fn kind(&self) -> &str {
        self.inner().kind()
    }
}
