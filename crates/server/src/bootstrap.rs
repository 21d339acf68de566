use std::sync::Arc;

use agrivision_agent::{build_llm_client, AgentRuntime, Collaborators};
use agrivision_core::agronomy::crop_model::{CentroidCropModel, CropModel};
use agrivision_core::agronomy::fertilizer::{FertilizerTable, ReferenceTable};
use agrivision_core::agronomy::DataLoadError;
use agrivision_core::config::{AppConfig, ConfigError};
use agrivision_core::domain::weather::WeatherProvider;
use thiserror::Error;
use tracing::{info, warn};

use crate::app::AppState;
use crate::weather::OpenWeatherProvider;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reference data could not be loaded: {0}")]
    Data(#[from] DataLoadError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
    #[error("weather client setup failed: {0}")]
    Weather(#[source] reqwest::Error),
}

pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let fertilizer_table: Arc<dyn FertilizerTable> = match &config.data.fertilizer_table_path {
        Some(path) => Arc::new(ReferenceTable::from_csv_path(path)?),
        None => Arc::new(ReferenceTable::embedded()?),
    };
    let crop_model: Arc<dyn CropModel> = match &config.data.crop_model_path {
        Some(path) => Arc::new(CentroidCropModel::from_path(path)?),
        None => Arc::new(CentroidCropModel::embedded()?),
    };
    info!(
        event_name = "system.bootstrap.reference_data_loaded",
        correlation_id = "bootstrap",
        crops_in_reference_table = fertilizer_table.len(),
        model_classes = crop_model.classes(),
        "reference data loaded"
    );

    let llm = build_llm_client(&config.llm)
        .map_err(|error| BootstrapError::Llm(format!("{error:#}")))?;

    let weather_provider =
        OpenWeatherProvider::from_config(&config.weather).map_err(BootstrapError::Weather)?;
    if !weather_provider.is_configured() {
        warn!(
            event_name = "system.bootstrap.weather_unconfigured",
            correlation_id = "bootstrap",
            "weather.api_key is not set; weather requests will fail"
        );
    }
    let weather: Arc<dyn WeatherProvider> = Arc::new(weather_provider);

    let runtime = AgentRuntime::new(
        Collaborators {
            llm,
            crop_model: Arc::clone(&crop_model),
            fertilizer_table: Arc::clone(&fertilizer_table),
            weather: Arc::clone(&weather),
        },
        &config.session,
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "application bootstrap finished"
    );

    let state = AppState {
        runtime: Arc::new(runtime),
        crop_model,
        fertilizer_table,
        weather,
        llm_provider: config.llm.provider.as_str(),
    };
    Ok(Application { config, state })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use agrivision_core::config::{AppConfig, LlmProvider};

    use super::{bootstrap, BootstrapError};

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Offline;
        config
    }

    #[tokio::test]
    async fn offline_bootstrap_uses_embedded_reference_data() {
        let app = bootstrap(offline_config()).await.expect("bootstrap");

        assert_eq!(app.state.llm_provider, "offline");
        assert_eq!(app.state.fertilizer_table.len(), 22);
        assert_eq!(app.state.crop_model.classes(), 22);
        assert!(app.state.runtime.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn hosted_provider_without_key_fails_fast() {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::OpenAi;
        config.llm.api_key = None;

        let error = bootstrap(config).await.err().expect("config error");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("llm.api_key"));
    }

    #[tokio::test]
    async fn custom_fertilizer_table_is_loaded_from_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("fertilizer.csv");
        fs::write(&path, "Crop,N,P,K\nsorghum,60,30,30\n").expect("write table");

        let mut config = offline_config();
        config.data.fertilizer_table_path = Some(path);
        let app = bootstrap(config).await.expect("bootstrap");

        assert_eq!(app.state.fertilizer_table.len(), 1);
        assert!(app.state.fertilizer_table.lookup("sorghum").is_some());
    }

    #[tokio::test]
    async fn unreadable_crop_model_is_a_data_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("centroids.toml");
        fs::write(&path, "scales = [1.0]\n").expect("write model");

        let mut config = offline_config();
        config.data.crop_model_path = Some(path);
        let error = bootstrap(config).await.err().expect("data error");

        assert!(matches!(error, BootstrapError::Data(_)));
    }
}
