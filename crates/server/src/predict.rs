//! Direct prediction routes that bypass the conversation.

use agrivision_core::agronomy::crop_model::{top_predictions, FeatureVector, FEATURE_ORDER};
use agrivision_core::agronomy::fertilizer::{recommend, FertilizerAdvice, NutrientLevels};
use agrivision_core::domain::soil::SoilData;
use agrivision_core::errors::DomainError;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::app::{json_body, ApiError, ApiResult, AppState, JsonBody};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CropPrediction {
    pub crop: String,
    /// Raw model probability in `0..=1`.
    pub probability: f64,
}

#[derive(Debug, Serialize)]
pub struct CropPredictionPayload {
    pub success: bool,
    pub predictions: Vec<CropPrediction>,
}

#[derive(Debug, Deserialize)]
pub struct FertilizerRequest {
    pub crop: String,
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "K")]
    pub k: f64,
}

#[derive(Debug, Serialize)]
pub struct FertilizerPayload {
    pub success: bool,
    pub data: FertilizerAdvice,
}

pub async fn predict_crop(
    State(state): State<AppState>,
    payload: JsonBody<Map<String, Value>>,
) -> ApiResult<CropPredictionPayload> {
    let body = json_body(payload)?;
    let soil = SoilData::from_map(&body);
    if let Some(field) = soil.missing(&FEATURE_ORDER).first() {
        let message = format!("Missing feature: {}", field.display_name());
        return Err(ApiError::response(StatusCode::BAD_REQUEST, &message, None));
    }

    let features = match FeatureVector::from_soil(&soil) {
        Ok(Some(features)) => features,
        Ok(None) => {
            return Err(ApiError::response(StatusCode::BAD_REQUEST, "Missing feature", None));
        }
        Err(error) => {
            return Err(ApiError::response(StatusCode::BAD_REQUEST, &error.to_string(), None));
        }
    };

    let predictions = state.crop_model.predict(&features).map_err(|error| {
        error!(event_name = "http.predict.crop_failed", error = %error, "crop model failed");
        ApiError::response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Crop prediction failed",
            Some(error.to_string()),
        )
    })?;

    let predictions: Vec<CropPrediction> = top_predictions(predictions)
        .into_iter()
        .map(|(crop, probability)| CropPrediction { crop, probability })
        .collect();
    info!(
        event_name = "http.predict.crop",
        top = predictions.first().map(|prediction| prediction.crop.as_str()).unwrap_or("none"),
        "crop prediction served"
    );

    Ok(Json(CropPredictionPayload { success: true, predictions }))
}

pub async fn predict_fertilizer(
    State(state): State<AppState>,
    payload: JsonBody<FertilizerRequest>,
) -> ApiResult<FertilizerPayload> {
    let request = json_body(payload)?;
    let current = NutrientLevels::new(request.n, request.p, request.k);
    match recommend(state.fertilizer_table.as_ref(), &request.crop, current) {
        Ok(advice) => {
            info!(
                event_name = "http.predict.fertilizer",
                crop = %request.crop,
                advice = advice.type_label(),
                "fertilizer advice served"
            );
            Ok(Json(FertilizerPayload { success: true, data: advice }))
        }
        Err(error @ DomainError::CropNotInReferenceTable { .. }) => {
            Err(ApiError::response(StatusCode::NOT_FOUND, &error.to_string(), None))
        }
        Err(error) => Err(ApiError::response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Fertilizer recommendation failed",
            Some(error.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use serde_json::json;

    use super::{predict_crop, predict_fertilizer, FertilizerRequest};
    use crate::app::test_support::state_with_weather;
    use crate::app::JsonBody;

    fn body(value: serde_json::Value) -> JsonBody<serde_json::Map<String, serde_json::Value>> {
        Ok(Json(value.as_object().cloned().expect("object body")))
    }

    #[tokio::test]
    async fn crop_prediction_returns_top_three_fractions() {
        let Json(payload) = predict_crop(
            State(state_with_weather(None)),
            body(json!({
                "N": 80, "P": 48, "K": 40, "temperature": 23.7,
                "humidity": 82.3, "ph": 6.4, "rainfall": 236.0
            })),
        )
        .await
        .expect("prediction");

        assert!(payload.success);
        assert_eq!(payload.predictions.len(), 3);
        assert_eq!(payload.predictions[0].crop, "rice");
        assert!(payload
            .predictions
            .windows(2)
            .all(|pair| pair[0].probability >= pair[1].probability));
        assert!(payload.predictions.iter().all(|p| (0.0..=1.0).contains(&p.probability)));
    }

    #[tokio::test]
    async fn missing_features_are_named_in_model_order() {
        let state = state_with_weather(None);

        let (status, Json(error)) = predict_crop(State(state.clone()), body(json!({})))
            .await
            .expect_err("nothing supplied");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "Missing feature: N");

        let (_, Json(error)) = predict_crop(
            State(state),
            body(json!({
                "N": 80, "P": 48, "K": 40, "temperature": 23.7, "humidity": 82.3, "rainfall": 236.0
            })),
        )
        .await
        .expect_err("ph missing");
        assert_eq!(error.error, "Missing feature: ph");
    }

    #[tokio::test]
    async fn fertilizer_prediction_reports_largest_gap() {
        let Json(payload) = predict_fertilizer(
            State(state_with_weather(None)),
            Ok(Json(FertilizerRequest { crop: "rice".to_string(), n: 60.0, p: 40.0, k: 40.0 })),
        )
        .await
        .expect("advice");

        let value = serde_json::to_value(&payload).expect("json");
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["type"], "Nitrogen");
        assert_eq!(value["data"]["deficiency"], 20.0);
        assert_eq!(value["data"]["fertilizer_type"], "Urea or Ammonium Nitrate");
    }

    #[tokio::test]
    async fn unknown_crop_is_not_found() {
        let (status, Json(error)) = predict_fertilizer(
            State(state_with_weather(None)),
            Ok(Json(FertilizerRequest { crop: "Tomato".to_string(), n: 1.0, p: 1.0, k: 1.0 })),
        )
        .await
        .expect_err("unknown crop");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error.error, "crop not in reference table");
        assert!(error.details.is_none());
    }
}
