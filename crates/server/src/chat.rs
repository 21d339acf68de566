//! Chat and chat-context routes.

use agrivision_agent::{TurnError, TurnRequest};
use agrivision_core::domain::context::Role;
use agrivision_core::errors::{ApplicationError, InterfaceError};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::app::{json_body, ApiError, ApiResult, AppState, JsonBody};

pub const SESSION_HEADER: &str = "x-session-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const SESSION_COOKIE: &str = "agrivision_session";
pub const ANONYMOUS_SESSION: &str = "anonymous";

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub soil_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatPayload {
    pub success: bool,
    pub response: String,
    pub actions: Vec<String>,
    pub data: Map<String, Value>,
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContextUpdateRequest {
    #[serde(default)]
    pub soil_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Header first, then cookie, then the shared anonymous session.
pub fn session_id(headers: &HeaderMap) -> String {
    if let Some(id) = header_text(headers, SESSION_HEADER) {
        return id.to_string();
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
        .unwrap_or_else(|| ANONYMOUS_SESSION.to_string())
}

pub fn role(headers: &HeaderMap) -> Role {
    header_text(headers, ROLE_HEADER).map(Role::parse_lenient).unwrap_or_default()
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: JsonBody<ChatRequest>,
) -> ApiResult<ChatPayload> {
    let request = json_body(payload)?;
    let correlation_id = format!("req-{}", Uuid::new_v4());
    let session_id = session_id(&headers);

    let turn = TurnRequest {
        session_id: session_id.clone(),
        role: role(&headers),
        message: request.message,
        soil_data: request.soil_data,
        location: request.location,
        correlation_id: correlation_id.clone(),
    };

    match state.runtime.handle_turn(turn).await {
        Ok(turn) => {
            info!(
                event_name = "http.chat.completed",
                correlation_id = %correlation_id,
                session_id = %session_id,
                intent = %turn.intent,
                "chat turn completed"
            );
            Ok(Json(ChatPayload {
                success: true,
                response: turn.response,
                actions: turn.actions,
                data: turn.data,
                suggestions: turn.suggestions,
                timestamp: turn.timestamp,
            }))
        }
        Err(TurnError::EmptyMessage) => {
            let interface = InterfaceError::BadRequest {
                message: "message must not be empty".to_string(),
                correlation_id,
            };
            Err(ApiError::response(
                StatusCode::BAD_REQUEST,
                &TurnError::EmptyMessage.to_string(),
                Some(interface.detail().to_string()),
            ))
        }
        Err(turn_error) => {
            let interface = ApplicationError::from(turn_error).into_interface(correlation_id);
            error!(
                event_name = "http.chat.failed",
                correlation_id = %interface.correlation_id(),
                session_id = %session_id,
                error = %interface,
                "chat turn failed"
            );
            Err(ApiError::response(
                status_for(&interface),
                interface.user_message(),
                Some(interface.detail().to_string()),
            ))
        }
    }
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn get_context(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let session_id = session_id(&headers);
    match state.runtime.context_snapshot(&session_id).await {
        Some(snapshot) => Json(json!(snapshot)),
        None => Json(json!({ "message": "No context found" })),
    }
}

pub async fn update_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: JsonBody<ContextUpdateRequest>,
) -> ApiResult<Value> {
    let request = json_body(payload)?;
    let session_id = session_id(&headers);
    state
        .runtime
        .update_context(
            &session_id,
            role(&headers),
            request.soil_data.as_ref(),
            request.location.as_deref(),
        )
        .await;
    Ok(Json(json!({ "success": true, "message": "Context updated" })))
}
