//! Crop recommendation over the seven soil and climate features.
//!
//! The shipped engine is a nearest-centroid classifier: each crop is
//! described by the mean of its features, distances are measured after
//! dividing every feature by its typical spread, and a softmax over the
//! negative distances yields a probability per crop.

use std::path::Path;

use serde::Deserialize;

use crate::agronomy::fertilizer::round2;
use crate::agronomy::DataLoadError;
use crate::domain::context::CropRecommendation;
use crate::domain::soil::{SoilData, SoilField};
use crate::errors::DomainError;

const EMBEDDED_CENTROIDS: &str = include_str!("../../data/crop_centroids.toml");

pub const FEATURE_COUNT: usize = 7;

/// Order in which features are handed to the model.
pub const FEATURE_ORDER: [SoilField; FEATURE_COUNT] = [
    SoilField::Nitrogen,
    SoilField::Phosphorus,
    SoilField::Potassium,
    SoilField::Temperature,
    SoilField::Humidity,
    SoilField::Ph,
    SoilField::Rainfall,
];

/// Number of recommendations kept for a caller.
pub const TOP_RECOMMENDATIONS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Result<Self, DomainError> {
        if let Some(position) = values.iter().position(|value| !value.is_finite()) {
            return Err(DomainError::InvalidFeatureVector(format!(
                "feature `{}` is not a finite number",
                FEATURE_ORDER[position].display_name()
            )));
        }
        Ok(Self(values))
    }

    /// Builds the vector from collected soil data. Returns `Ok(None)` when
    /// any feature is still unset; use [`SoilData::missing`] with
    /// [`FEATURE_ORDER`] to name them.
    pub fn from_soil(soil: &SoilData) -> Result<Option<Self>, DomainError> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, field) in values.iter_mut().zip(FEATURE_ORDER) {
            match soil.get(field) {
                Some(value) => *slot = value,
                None => return Ok(None),
            }
        }
        Self::new(values).map(Some)
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

pub trait CropModel: Send + Sync {
    /// Probability per crop label, summing to roughly one. Ordering is not
    /// guaranteed.
    fn predict(&self, features: &FeatureVector) -> Result<Vec<(String, f64)>, DomainError>;

    fn classes(&self) -> usize;
}

#[derive(Clone, Debug, Deserialize)]
struct CentroidFile {
    scales: Vec<f64>,
    #[serde(default = "default_sharpness")]
    sharpness: f64,
    crops: Vec<CentroidEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct CentroidEntry {
    label: String,
    centroid: Vec<f64>,
}

fn default_sharpness() -> f64 {
    1.0
}

#[derive(Clone, Debug)]
pub struct CentroidCropModel {
    scales: [f64; FEATURE_COUNT],
    sharpness: f64,
    centroids: Vec<(String, [f64; FEATURE_COUNT])>,
}

impl CentroidCropModel {
    pub fn embedded() -> Result<Self, DataLoadError> {
        Self::from_toml_str(EMBEDDED_CENTROIDS)
    }

    pub fn from_path(path: &Path) -> Result<Self, DataLoadError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| DataLoadError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, DataLoadError> {
        let file: CentroidFile =
            toml::from_str(raw).map_err(|error| DataLoadError::Parse(error.to_string()))?;

        let scales = fixed_width("scales", &file.scales)?;
        if scales.iter().any(|scale| !scale.is_finite() || *scale <= 0.0) {
            return Err(DataLoadError::Invalid("every scale must be a positive number".into()));
        }
        if !file.sharpness.is_finite() || file.sharpness <= 0.0 {
            return Err(DataLoadError::Invalid("sharpness must be a positive number".into()));
        }

        let centroids = file
            .crops
            .iter()
            .map(|entry| {
                let what = format!("centroid for `{}`", entry.label);
                Ok((entry.label.clone(), fixed_width(&what, &entry.centroid)?))
            })
            .collect::<Result<Vec<_>, DataLoadError>>()?;

        if centroids.is_empty() {
            return Err(DataLoadError::Empty("crop centroid table"));
        }

        Ok(Self { scales, sharpness: file.sharpness, centroids })
    }

    fn distance(&self, features: &FeatureVector, centroid: &[f64; FEATURE_COUNT]) -> f64 {
        features
            .values()
            .iter()
            .zip(centroid)
            .zip(&self.scales)
            .map(|((value, center), scale)| ((value - center) / scale).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

fn fixed_width(what: &str, values: &[f64]) -> Result<[f64; FEATURE_COUNT], DataLoadError> {
    <[f64; FEATURE_COUNT]>::try_from(values).map_err(|_| {
        DataLoadError::Invalid(format!(
            "{what} has {} values, expected {FEATURE_COUNT}",
            values.len()
        ))
    })
}

impl CropModel for CentroidCropModel {
    fn predict(&self, features: &FeatureVector) -> Result<Vec<(String, f64)>, DomainError> {
        let scores: Vec<f64> = self
            .centroids
            .iter()
            .map(|(_, centroid)| -self.sharpness * self.distance(features, centroid))
            .collect();

        // shift by the max score so exp() cannot overflow
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(DomainError::InvariantViolation(
                "crop model produced no usable probabilities".to_string(),
            ));
        }

        Ok(self
            .centroids
            .iter()
            .zip(weights)
            .map(|((label, _), weight)| (label.clone(), weight / total))
            .collect())
    }

    fn classes(&self) -> usize {
        self.centroids.len()
    }
}

/// Highest-probability predictions first, at most [`TOP_RECOMMENDATIONS`].
pub fn top_predictions(mut predictions: Vec<(String, f64)>) -> Vec<(String, f64)> {
    predictions.sort_by(|left, right| right.1.total_cmp(&left.1));
    predictions.truncate(TOP_RECOMMENDATIONS);
    predictions
}

/// Top predictions expressed as percentages rounded to two decimals.
pub fn top_recommendations(predictions: Vec<(String, f64)>) -> Vec<CropRecommendation> {
    top_predictions(predictions)
        .into_iter()
        .map(|(crop, probability)| CropRecommendation {
            crop,
            probability: round2(probability * 100.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::soil::{SoilData, SoilField};
    use crate::errors::DomainError;

    use super::{
        top_recommendations, CentroidCropModel, CropModel, FeatureVector, FEATURE_ORDER,
    };

    fn rice_like() -> FeatureVector {
        FeatureVector::new([80.0, 47.0, 40.0, 23.5, 82.0, 6.4, 236.0]).expect("finite")
    }

    #[test]
    fn embedded_model_loads_all_crops() {
        let model = CentroidCropModel::embedded().expect("embedded centroids parse");
        assert_eq!(model.classes(), 22);
    }

    #[test]
    fn probabilities_sum_to_one_and_favor_nearest_crop() {
        let model = CentroidCropModel::embedded().expect("embedded centroids parse");
        let predictions = model.predict(&rice_like()).expect("predict");

        let total: f64 = predictions.iter().map(|(_, probability)| probability).sum();
        assert!((total - 1.0).abs() < 1e-9);

        let recommendations = top_recommendations(predictions);
        assert_eq!(recommendations[0].crop, "rice");
    }

    #[test]
    fn recommendations_are_capped_and_descending() {
        let recommendations = top_recommendations(vec![
            ("a".into(), 0.1),
            ("b".into(), 0.4),
            ("c".into(), 0.3),
            ("d".into(), 0.2),
        ]);

        assert_eq!(recommendations.len(), 3);
        assert_eq!(recommendations[0].crop, "b");
        assert_eq!(recommendations[0].probability, 40.0);
        assert!(recommendations.windows(2).all(|pair| pair[0].probability >= pair[1].probability));
    }

    #[test]
    fn vector_from_soil_requires_every_feature() {
        let partial = SoilData::from_map(
            json!({"N": 90, "P": 42, "K": 43, "temperature": 20.8, "humidity": 82, "rainfall": 202.9})
                .as_object()
                .expect("object"),
        );
        assert_eq!(FeatureVector::from_soil(&partial).expect("finite"), None);
        assert_eq!(partial.missing(&FEATURE_ORDER), vec![SoilField::Ph]);

        let mut complete = partial.clone();
        complete.ph = Some(6.5);
        let vector = FeatureVector::from_soil(&complete).expect("finite").expect("complete");
        assert_eq!(vector.values(), &[90.0, 42.0, 43.0, 20.8, 82.0, 6.5, 202.9]);
    }

    #[test]
    fn non_finite_features_are_rejected() {
        let error = FeatureVector::new([1.0, 1.0, 1.0, f64::NAN, 1.0, 1.0, 1.0])
            .expect_err("NaN must be rejected");
        assert!(matches!(
            error,
            DomainError::InvalidFeatureVector(message) if message.contains("temperature")
        ));
    }

    #[test]
    fn malformed_centroid_files_are_rejected() {
        let short = "scales = [1.0, 1.0]\n[[crops]]\nlabel = \"x\"\ncentroid = [1.0]\n";
        assert!(CentroidCropModel::from_toml_str(short).is_err());

        let empty = "scales = [1, 1, 1, 1, 1, 1, 1]\ncrops = []\n";
        assert!(CentroidCropModel::from_toml_str(empty).is_err());

        let zero_scale = "scales = [0, 1, 1, 1, 1, 1, 1]\n[[crops]]\nlabel = \"x\"\ncentroid = [1, 1, 1, 1, 1, 1, 1]\n";
        assert!(CentroidCropModel::from_toml_str(zero_scale).is_err());
    }
}
