//! Harvest-area prediction: label lookup, categorical encoding and model
//! evaluation over a model snapshot loaded once at startup.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::categories::Category;
use crate::encoder::EncoderSet;
use crate::error::{Error, Result};
use crate::regressor::{FeatureVector, Regressor};

pub const MODEL_FILE: &str = "random_forest_model.json";
pub const ENCODERS_FILE: &str = "label_encoders.json";

/// Harvested share of the planted area assumed by the demonstration model.
pub const DEMO_HARVEST_RATIO: f64 = 0.92;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub product: String,
    pub month: String,
    pub state: String,
    pub planted_area: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub estimated_hectares: f64,
    /// Set when the estimate comes from the demonstration model and carries
    /// no meaning.
    pub demo_model: bool,
}

/// Where the loaded model came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Artifacts(PathBuf),
    Demo,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Artifacts(dir) => write!(f, "artifacts in {}", dir.display()),
            ModelSource::Demo => f.write_str("demonstration model"),
        }
    }
}

/// What to do when the artifacts cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FallbackStrategy {
    /// Substitute the demonstration model and flag its predictions.
    #[default]
    Demo,
    /// Report the load error to the caller.
    Fail,
}

/// A fitted model together with the encoders for its categorical inputs.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub encoders: EncoderSet,
    pub model: Regressor,
    pub source: ModelSource,
}

impl ModelBundle {
    /// Load both artifacts from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::unavailable(dir, "artifact directory not found"));
        }
        let model = Regressor::load(&dir.join(MODEL_FILE))?;
        let encoders = EncoderSet::load(&dir.join(ENCODERS_FILE))?;

        let missing = encoders.missing_tokens();
        if !missing.is_empty() {
            warn!(
                ?missing,
                "encoders do not cover every selectable label; those selections will be rejected"
            );
        }
        info!(dir = %dir.display(), "loaded model artifacts");
        Ok(Self {
            encoders,
            model,
            source: ModelSource::Artifacts(dir.to_path_buf()),
        })
    }

    /// Encoders fit on the lookup-table vocabularies and a linear model that
    /// only scales the planted area. Not a meaningful predictor.
    pub fn demo() -> Self {
        Self {
            encoders: EncoderSet::from_lookup_tables(),
            model: Regressor::Linear {
                intercept: 0.0,
                coefficients: vec![0.0, 0.0, DEMO_HARVEST_RATIO, 0.0],
            },
            source: ModelSource::Demo,
        }
    }

    /// Load from `dir`, applying `fallback` when that fails.
    pub fn load_or_fallback(dir: &Path, fallback: FallbackStrategy) -> Result<Self> {
        match Self::load(dir) {
            Ok(bundle) => Ok(bundle),
            Err(e) => match fallback {
                FallbackStrategy::Demo => {
                    warn!(error = %e, "model not found, using demonstration model");
                    Ok(Self::demo())
                }
                FallbackStrategy::Fail => Err(e),
            },
        }
    }

    pub fn is_demo(&self) -> bool {
        self.source == ModelSource::Demo
    }
}

/// Read-only prediction pipeline shared by all requests.
#[derive(Debug, Clone)]
pub struct Predictor {
    bundle: ModelBundle,
}

impl Predictor {
    pub fn new(bundle: ModelBundle) -> Self {
        Self { bundle }
    }

    pub fn is_demo(&self) -> bool {
        self.bundle.is_demo()
    }

    pub fn source(&self) -> &ModelSource {
        &self.bundle.source
    }

    #[instrument(skip(self), fields(source = %self.bundle.source))]
    pub fn predict(
        &self,
        product: &str,
        month: &str,
        state: &str,
        planted_area: f64,
    ) -> Result<Prediction> {
        if !planted_area.is_finite() || planted_area < 0.0 {
            return Err(Error::InvalidPlantedArea(planted_area.to_string()));
        }

        let features: FeatureVector = [
            self.encode(Category::Product, product)?,
            self.encode(Category::Month, month)?,
            planted_area,
            self.encode(Category::State, state)?,
        ];
        debug!(?features, "encoded feature vector");

        let estimated_hectares = self.bundle.model.predict(&features);
        if !estimated_hectares.is_finite() {
            warn!(estimated_hectares, "model output is not a finite number");
            return Err(Error::NonFiniteEstimate(estimated_hectares));
        }
        Ok(Prediction {
            estimated_hectares,
            demo_model: self.is_demo(),
        })
    }

    pub fn predict_request(&self, request: &PredictionRequest) -> Result<Prediction> {
        self.predict(
            &request.product,
            &request.month,
            &request.state,
            request.planted_area,
        )
    }

    fn encode(&self, category: Category, label: &str) -> Result<f64> {
        let token = category.token_for(label)?;
        let code = self.bundle.encoders.encode(category, token)?;
        Ok(code as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Predictor {
        Predictor::new(ModelBundle::demo())
    }

    #[test]
    fn test_demo_predicts_every_label() {
        let predictor = demo();
        for product in Category::Product.labels() {
            for month in Category::Month.labels() {
                for state in Category::State.labels() {
                    let p = predictor.predict(product, month, state, 250.0).unwrap();
                    assert!(p.estimated_hectares.is_finite());
                    assert!(p.demo_model);
                }
            }
        }
    }

    #[test]
    fn test_example_prediction() {
        let p = demo().predict("soja", "Janeiro", "São Paulo", 1000.0).unwrap();
        assert!(p.estimated_hectares >= 0.0);
        assert!((p.estimated_hectares - 920.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_label() {
        let err = demo().predict("Café", "Janeiro", "Bahia", 10.0).unwrap_err();
        assert!(matches!(err, Error::UnknownCategoryValue { category: Category::Product, .. }));

        let err = demo().predict("Soja", "Agosto", "Bahia", 10.0).unwrap_err();
        assert!(matches!(err, Error::UnknownCategoryValue { category: Category::Month, .. }));

        let err = demo().predict("Soja", "Maio", "Texas", 10.0).unwrap_err();
        assert!(matches!(err, Error::UnknownCategoryValue { category: Category::State, .. }));
    }

    #[test]
    fn test_invalid_planted_area() {
        assert!(matches!(
            demo().predict("Soja", "Maio", "Bahia", -1.0),
            Err(Error::InvalidPlantedArea(_))
        ));
        assert!(matches!(
            demo().predict("Soja", "Maio", "Bahia", f64::NAN),
            Err(Error::InvalidPlantedArea(_))
        ));
        assert!(demo().predict("Soja", "Maio", "Bahia", 0.0).is_ok());
    }

    #[test]
    fn test_feature_order() {
        // Coefficients pick out each feature position in turn.
        let mut bundle = ModelBundle::demo();
        let pick = |coefficients: Vec<f64>, bundle: &mut ModelBundle| {
            bundle.model = Regressor::Linear {
                intercept: 0.0,
                coefficients,
            };
            Predictor::new(bundle.clone())
                .predict("Soja", "Março", "Acre", 123.0)
                .unwrap()
                .estimated_hectares
        };
        // soja = 4 among products, marco = 6 among months, acre = 0 among states
        assert_eq!(pick(vec![1.0, 0.0, 0.0, 0.0], &mut bundle), 4.0);
        assert_eq!(pick(vec![0.0, 1.0, 0.0, 0.0], &mut bundle), 6.0);
        assert_eq!(pick(vec![0.0, 0.0, 1.0, 0.0], &mut bundle), 123.0);
        assert_eq!(pick(vec![0.0, 0.0, 0.0, 1.0], &mut bundle), 0.0);
    }

    #[test]
    fn test_overflowing_estimate_is_rejected() {
        let mut bundle = ModelBundle::demo();
        bundle.model = Regressor::Linear {
            intercept: 0.0,
            coefficients: vec![0.0, 0.0, 10.0, 0.0],
        };
        let err = Predictor::new(bundle)
            .predict("Soja", "Maio", "Bahia", f64::MAX)
            .unwrap_err();
        assert!(matches!(err, Error::NonFiniteEstimate(v) if v.is_infinite()));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let err = ModelBundle::load(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable { .. }));

        let fallback =
            ModelBundle::load_or_fallback(Path::new("/definitely/not/here"), FallbackStrategy::Demo)
                .unwrap();
        assert!(fallback.is_demo());

        let failed =
            ModelBundle::load_or_fallback(Path::new("/definitely/not/here"), FallbackStrategy::Fail);
        assert!(matches!(failed, Err(Error::ModelUnavailable { .. })));
    }
}
