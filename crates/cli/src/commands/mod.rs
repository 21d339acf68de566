pub mod config;
pub mod doctor;
pub mod fertilizer;

use agrivision_core::agronomy::crop_model::CentroidCropModel;
use agrivision_core::agronomy::fertilizer::ReferenceTable;
use agrivision_core::agronomy::DataLoadError;
use agrivision_core::config::AppConfig;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Reference table from `data.fertilizer_table_path`, or the embedded one.
pub(crate) fn load_reference_table(config: &AppConfig) -> Result<ReferenceTable, DataLoadError> {
    match &config.data.fertilizer_table_path {
        Some(path) => ReferenceTable::from_csv_path(path),
        None => ReferenceTable::embedded(),
    }
}

/// Crop model from `data.crop_model_path`, or the embedded centroids.
pub(crate) fn load_crop_model(config: &AppConfig) -> Result<CentroidCropModel, DataLoadError> {
    match &config.data.crop_model_path {
        Some(path) => CentroidCropModel::from_path(path),
        None => CentroidCropModel::embedded(),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
