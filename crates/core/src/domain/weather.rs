use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temperature: f64,
    pub humidity: f64,
    pub description: String,
    pub city: String,
    pub country: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WeatherError {
    #[error("weather service is not configured")]
    NotConfigured,
    #[error("weather data not found for {city}")]
    NotFound { city: String },
    #[error("failed to fetch weather data: {0}")]
    Transport(String),
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError>;
}
