//! Serializable regression models evaluated on the encoded feature vector.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of features the model consumes: product, month, planted area, state.
pub const FEATURE_COUNT: usize = 4;

pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    /// Mean of an ensemble of regression trees.
    RandomForest { trees: Vec<DecisionTree> },
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

/// A tree node. Node 0 is the root; children always sit at higher indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf {
        leaf: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

impl Regressor {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::unavailable(path, e))?;
        let model: Regressor =
            serde_json::from_str(&raw).map_err(|e| Error::unavailable(path, e))?;
        model
            .validate()
            .map_err(|reason| Error::unavailable(path, reason))?;
        Ok(model)
    }

    /// Structural checks that make [`Regressor::predict`] total.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Regressor::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate().map_err(|e| format!("tree {i}: {e}"))?;
                }
                Ok(())
            }
            Regressor::Linear {
                intercept,
                coefficients,
            } => {
                if coefficients.len() != FEATURE_COUNT {
                    return Err(format!(
                        "linear model needs {FEATURE_COUNT} coefficients, got {}",
                        coefficients.len()
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("linear model has non-finite parameters".to_string());
                }
                Ok(())
            }
        }
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        match self {
            Regressor::RandomForest { trees } => {
                let total: f64 = trees.iter().map(|tree| tree.predict(features)).sum();
                total / trees.len() as f64
            }
            Regressor::Linear {
                intercept,
                coefficients,
            } => {
                intercept
                    + coefficients
                        .iter()
                        .zip(features.iter())
                        .map(|(c, x)| c * x)
                        .sum::<f64>()
            }
        }
    }
}

impl DecisionTree {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Leaf { leaf } if !leaf.is_finite() => {
                    return Err(format!("node {i}: non-finite leaf value"));
                }
                Node::Leaf { .. } => {}
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= FEATURE_COUNT {
                        return Err(format!("node {i}: feature index {feature} out of range"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {i}: threshold is NaN"));
                    }
                    for child in [left, right] {
                        if child <= i || child >= len {
                            return Err(format!("node {i}: invalid child index {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Walk from the root, going left when `x[feature] <= threshold`.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { leaf } => return leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}
