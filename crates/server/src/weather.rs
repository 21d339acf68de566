//! OpenWeatherMap current-conditions adapter and the `/weather` route.

use std::time::Duration;

use agrivision_core::config::WeatherConfig;
use agrivision_core::domain::weather::{WeatherError, WeatherProvider, WeatherReport};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, Json};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::{json_body, ApiError, ApiResult, AppState, JsonBody};

#[derive(Clone, Debug)]
pub struct OpenWeatherProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenWeatherProvider {
    pub fn from_config(config: &WeatherConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, base_url: config.base_url.clone(), api_key: config.api_key.clone() })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty()).unwrap_or(false)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        let Some(api_key) =
            self.api_key.as_ref().filter(|key| !key.expose_secret().trim().is_empty())
        else {
            return Err(WeatherError::NotConfigured);
        };

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", city), ("appid", api_key.expose_secret()), ("units", "metric")])
            .send()
            .await
            .map_err(|error| WeatherError::Transport(error.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WeatherError::NotFound { city: city.to_string() });
        }
        if !status.is_success() {
            return Err(WeatherError::Transport(format!("weather provider returned HTTP {status}")));
        }

        let body: CurrentConditions =
            response.json().await.map_err(|error| WeatherError::Transport(error.to_string()))?;
        Ok(body.into_report())
    }
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    name: String,
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    sys: Option<SystemInfo>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct SystemInfo {
    country: Option<String>,
}

impl CurrentConditions {
    fn into_report(self) -> WeatherReport {
        WeatherReport {
            temperature: self.main.temp,
            humidity: self.main.humidity,
            description: self
                .weather
                .into_iter()
                .next()
                .map(|condition| condition.description)
                .unwrap_or_default(),
            city: self.name,
            country: self.sys.and_then(|sys| sys.country),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WeatherRequest {
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Serialize)]
pub struct WeatherPayload {
    pub success: bool,
    pub data: WeatherReport,
}

pub async fn current_weather(
    State(state): State<AppState>,
    payload: JsonBody<WeatherRequest>,
) -> ApiResult<WeatherPayload> {
    let request = json_body(payload)?;
    let city = request.city.trim();
    if city.is_empty() {
        return Err(ApiError::response(StatusCode::BAD_REQUEST, "City name is required", None));
    }

    match state.weather.fetch(city).await {
        Ok(report) => {
            info!(event_name = "http.weather.fetched", city = %city, "weather fetched");
            Ok(Json(WeatherPayload { success: true, data: report }))
        }
        Err(error) => {
            warn!(
                event_name = "http.weather.failed",
                city = %city,
                error = %error,
                "weather fetch failed"
            );
            Err(ApiError::response(StatusCode::BAD_GATEWAY, &error.to_string(), None))
        }
    }
}
