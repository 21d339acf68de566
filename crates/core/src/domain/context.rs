use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agronomy::fertilizer::FertilizerAdvice;
use crate::domain::intent::Intent;
use crate::domain::soil::{SlotPatch, SoilData};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Farmer,
    Officer,
    #[default]
    User,
}

impl Role {
    /// Unknown or empty roles fall back to `User`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "farmer" => Self::Farmer,
            "officer" => Self::Officer,
            _ => Self::User,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
    pub crop: String,
    /// Suitability as a percentage, rounded to two decimals.
    pub probability: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub bot_text: String,
    pub timestamp: DateTime<Utc>,
    pub intent: Intent,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChatContext {
    pub role: Role,
    pub soil_data: SoilData,
    pub location: Option<String>,
    pub last_crop_recommendations: Vec<CropRecommendation>,
    pub last_fertilizer_advice: Option<FertilizerAdvice>,
    pub conversation_history: Vec<Turn>,
}

impl ChatContext {
    pub fn new(role: Role) -> Self {
        Self { role, ..Self::default() }
    }

    /// Shallow merge of extracted slots; the context location follows the
    /// patch whenever the patch sets one.
    pub fn merge_slots(&mut self, patch: &SlotPatch) {
        patch.apply_to(&mut self.soil_data);
        if let Some(location) = patch.location() {
            self.location = Some(location.to_string());
        }
    }

    /// Keeps at most three recommendations, highest probability first.
    pub fn store_recommendations(&mut self, mut recommendations: Vec<CropRecommendation>) {
        recommendations.sort_by(|left, right| right.probability.total_cmp(&left.probability));
        recommendations.truncate(3);
        self.last_crop_recommendations = recommendations;
    }

    /// Appends a turn, evicting the oldest entries once `max_turns` is exceeded.
    pub fn record_turn(&mut self, turn: Turn, max_turns: usize) {
        self.conversation_history.push(turn);
        let overflow = self.conversation_history.len().saturating_sub(max_turns.max(1));
        if overflow > 0 {
            self.conversation_history.drain(..overflow);
        }
    }

    pub fn recent_history(&self, turns: usize) -> &[Turn] {
        let start = self.conversation_history.len().saturating_sub(turns);
        &self.conversation_history[start..]
    }

    /// Location from the context, else the one captured alongside soil data.
    pub fn resolved_location(&self) -> Option<&str> {
        self.location.as_deref().or(self.soil_data.location.as_deref())
    }
}
