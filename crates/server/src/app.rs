use std::sync::Arc;

use agrivision_agent::AgentRuntime;
use agrivision_core::agronomy::crop_model::CropModel;
use agrivision_core::agronomy::fertilizer::FertilizerTable;
use agrivision_core::domain::weather::WeatherProvider;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;

use crate::{chat, health, predict, weather};

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub crop_model: Arc<dyn CropModel>,
    pub fertilizer_table: Arc<dyn FertilizerTable>,
    pub weather: Arc<dyn WeatherProvider>,
    pub llm_provider: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn response(
        status: StatusCode,
        error: &str,
        details: Option<String>,
    ) -> (StatusCode, Json<ApiError>) {
        (status, Json(ApiError { success: false, error: error.to_string(), details }))
    }
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

/// JSON body whose extraction failure is still available to the handler.
pub type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Unwraps a JSON body, reporting a wrong content type or malformed payload
/// in the `ApiError` envelope with axum's status code.
pub fn json_body<T>(payload: JsonBody<T>) -> Result<T, (StatusCode, Json<ApiError>)> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        warn!(
            event_name = "http.request.rejected",
            status = rejection.status().as_u16(),
            reason = %rejection.body_text(),
            "request body rejected"
        );
        ApiError::response(rejection.status(), "Invalid request body", Some(rejection.body_text()))
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/chat/context", get(chat::get_context).post(chat::update_context))
        .route("/predict/crop", post(predict::predict_crop))
        .route("/predict/fertilizer", post(predict::predict_fertilizer))
        .route("/weather", post(weather::current_weather))
        .route("/health", get(health::health))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use agrivision_agent::{AgentRuntime, Collaborators, LlmClient, ScriptedLlmClient};
    use agrivision_core::agronomy::crop_model::CentroidCropModel;
    use agrivision_core::agronomy::fertilizer::ReferenceTable;
    use agrivision_core::config::SessionConfig;
    use agrivision_core::domain::weather::{WeatherError, WeatherProvider, WeatherReport};
    use async_trait::async_trait;

    use super::AppState;

    /// Reports `temperature` for any city, or "not found" when `None`.
    pub struct FixedWeather(pub Option<f64>);

    #[async_trait]
    impl WeatherProvider for FixedWeather {
        async fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
            match self.0 {
                Some(temperature) => Ok(WeatherReport {
                    temperature,
                    humidity: 70.0,
                    description: "light rain".to_string(),
                    city: city.to_string(),
                    country: Some("IN".to_string()),
                }),
                None => Err(WeatherError::NotFound { city: city.to_string() }),
            }
        }
    }

    pub fn session_config() -> SessionConfig {
        SessionConfig {
            capacity: 64,
            ttl_secs: 3_600,
            prune_interval_secs: 60,
            max_history_turns: 500,
        }
    }

    pub fn state_with(llm: Arc<dyn LlmClient>, temperature: Option<f64>) -> AppState {
        let crop_model = Arc::new(CentroidCropModel::embedded().expect("embedded model"));
        let fertilizer_table = Arc::new(ReferenceTable::embedded().expect("embedded table"));
        let weather = Arc::new(FixedWeather(temperature));

        let collaborators = Collaborators {
            llm,
            crop_model: crop_model.clone(),
            fertilizer_table: fertilizer_table.clone(),
            weather: weather.clone(),
        };

        AppState {
            runtime: Arc::new(AgentRuntime::new(collaborators, &session_config())),
            crop_model,
            fertilizer_table,
            weather,
            llm_provider: "offline",
        }
    }

    pub fn state_with_weather(temperature: Option<f64>) -> AppState {
        state_with(Arc::new(ScriptedLlmClient::failing()), temperature)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::app::test_support::state_with_weather;

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response =
            router(state_with_weather(Some(30.0))).oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn chat_route_wraps_turn_in_success_envelope() {
        let (status, body) = send(post_json("/chat", json!({"message": "hello"}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["response"].is_string());
        assert!(body["actions"].is_array());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn chat_route_rejects_empty_message() {
        let (status, body) = send(post_json("/chat", json!({"message": ""}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No message provided");
    }

    #[tokio::test]
    async fn body_without_json_content_type_uses_error_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .expect("request");
        let (status, body) = send(request).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid request body");
        assert!(body["details"].is_string());
    }

    #[tokio::test]
    async fn malformed_json_uses_error_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/predict/fertilizer")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"crop\": "))
            .expect("request");
        let (status, body) = send(request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid request body");

        let (status, body) = send(post_json("/weather", json!({"city": 42}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn fertilizer_route_reports_unknown_crop_as_not_found() {
        let (status, body) = send(post_json(
            "/predict/fertilizer",
            json!({"crop": "Tomato", "N": 10, "P": 10, "K": 10}),
        ))
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "error": "crop not in reference table"}));
    }

    #[tokio::test]
    async fn crop_route_names_first_missing_feature() {
        let (status, body) =
            send(post_json("/predict/crop", json!({"N": 90, "P": 42, "K": 43}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing feature: temperature");
    }

    #[tokio::test]
    async fn context_route_reports_unknown_session() {
        let request = Request::builder()
            .uri("/chat/context")
            .header("x-session-id", "nobody")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "No context found"}));
    }

    #[tokio::test]
    async fn health_route_reports_reference_data() {
        let request = Request::builder().uri("/health").body(Body::empty()).expect("request");
        let (status, body) = send(request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["crops_in_reference_table"], 22);
        assert_eq!(body["model_classes"], 22);
    }
}
