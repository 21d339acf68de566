//! Reply envelope assembly.

use agrivision_core::domain::context::{ChatContext, Turn};
use agrivision_core::domain::intent::Intent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Tags telling the client which follow-up UI to offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyAction {
    Greeting,
    RequestSoilData,
    RequestMissingData,
    RetryAnalysis,
    ShowCropDetails,
    GetFertilizerAdvice,
    RequestCropSelection,
    RequestNpkData,
    ShowFertilizerDetails,
    RequestLocation,
    RetryWeather,
    ShowWeatherDetails,
    GeneralAdvice,
}

impl ReplyAction {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::RequestSoilData => "request_soil_data",
            Self::RequestMissingData => "request_missing_data",
            Self::RetryAnalysis => "retry_analysis",
            Self::ShowCropDetails => "show_crop_details",
            Self::GetFertilizerAdvice => "get_fertilizer_advice",
            Self::RequestCropSelection => "request_crop_selection",
            Self::RequestNpkData => "request_npk_data",
            Self::ShowFertilizerDetails => "show_fertilizer_details",
            Self::RequestLocation => "request_location",
            Self::RetryWeather => "retry_weather",
            Self::ShowWeatherDetails => "show_weather_details",
            Self::GeneralAdvice => "general_advice",
        }
    }
}

/// What a domain handler produced for one turn.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerReply {
    pub narrative: String,
    pub actions: Vec<ReplyAction>,
    pub data: Map<String, Value>,
    pub suggestions: Vec<String>,
}

impl HandlerReply {
    pub fn new(narrative: impl Into<String>, actions: &[ReplyAction]) -> Self {
        Self {
            narrative: narrative.into(),
            actions: actions.to_vec(),
            data: Map::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|suggestion| suggestion.to_string()).collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnResponse {
    pub response: String,
    pub actions: Vec<String>,
    pub data: Map<String, Value>,
    pub suggestions: Vec<String>,
    pub intent: Intent,
    pub timestamp: DateTime<Utc>,
}

/// Turns a handler reply into the client envelope and records the turn.
pub fn compose(
    context: &mut ChatContext,
    message: &str,
    intent: Intent,
    reply: HandlerReply,
    max_history_turns: usize,
) -> TurnResponse {
    let timestamp = Utc::now();
    context.record_turn(
        Turn {
            user_text: message.to_string(),
            bot_text: reply.narrative.clone(),
            timestamp,
            intent,
        },
        max_history_turns,
    );

    TurnResponse {
        response: reply.narrative,
        actions: reply.actions.iter().map(|action| action.action_key().to_string()).collect(),
        data: reply.data,
        suggestions: reply.suggestions,
        intent,
        timestamp,
    }
}
