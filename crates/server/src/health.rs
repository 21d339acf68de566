use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::app::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub llm_provider: &'static str,
    pub crops_in_reference_table: usize,
    pub model_classes: usize,
    pub active_sessions: usize,
    pub checked_at: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let crops_in_reference_table = state.fertilizer_table.len();
    let model_classes = state.crop_model.classes();
    let ready = crops_in_reference_table > 0 && model_classes > 0;

    if !ready {
        warn!(
            event_name = "system.health.degraded",
            crops_in_reference_table,
            model_classes,
            "reference data missing"
        );
    }

    let payload = HealthResponse {
        status: if ready { "ok" } else { "degraded" },
        service: HealthCheck {
            status: if ready { "ready" } else { "degraded" },
            detail: if ready {
                "agrivision-server runtime initialized".to_string()
            } else {
                "reference data is empty".to_string()
            },
        },
        llm_provider: state.llm_provider,
        crops_in_reference_table,
        model_classes,
        active_sessions: state.runtime.sessions().len().await,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
