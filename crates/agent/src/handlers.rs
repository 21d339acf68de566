//! Per-intent domain handlers.
//!
//! Every handler checks its preconditions deterministically (asking the user
//! for what is missing without calling any provider), runs the deterministic
//! computation, and then makes at most one narration call. A failed narration
//! always degrades to fixed template text built from the computed data.

use std::sync::Arc;

use agrivision_core::agronomy::crop_model::{
    top_recommendations, CropModel, FeatureVector, FEATURE_ORDER,
};
use agrivision_core::agronomy::fertilizer::{
    recommend, FertilizerAdvice, FertilizerTable, NutrientLevels,
};
use agrivision_core::domain::context::{ChatContext, CropRecommendation, Role};
use agrivision_core::domain::intent::Intent;
use agrivision_core::domain::soil::{SoilField, CROP_REQUIRED_FIELDS};
use agrivision_core::domain::weather::{WeatherProvider, WeatherReport};
use agrivision_core::errors::DomainError;
use serde_json::json;
use tracing::{info, warn};

use crate::composer::{HandlerReply, ReplyAction};
use crate::llm::LlmClient;
use crate::prompts;

const GREETING_TAIL: &str = "\n\nWhat would you like to know about today? 🌾";

const SOIL_DATA_REQUEST: &str = "I'd love to recommend the best crops for you! Could you share \
your soil details?\n\nI need:\n• Nitrogen (N) level\n• Phosphorus (P) level\n• Potassium (K) \
level\n• Soil pH\n• Average temperature\n• Humidity level\n• Expected rainfall\n\nExample: 'My \
soil has N-90, P-40, K-50, pH-6.5, temperature 25°C, humidity 80%, rainfall 200mm'";

const RETRY_ANALYSIS: &str =
    "I'm having trouble analyzing your soil data right now. Please check your values and try again.";

const CROP_SELECTION_REQUEST: &str = "Which crop would you like fertilizer advice for? You can \
mention the crop name or I can suggest based on your soil conditions.";

const LOCATION_REQUEST: &str =
    "Which location would you like weather information for? Please mention your city or region.";

const GENERAL_APOLOGY: &str = "I'm sorry, I'm having a little trouble connecting to my knowledge \
base right now. Please check your API key and network connection, then try asking your question \
again in a moment.";

fn greeting_for(role: Role) -> &'static str {
    match role {
        Role::Farmer => {
            "Hello! I'm AgriBot, your farming assistant. I can help you with crop \
             recommendations, fertilizer advice, and weather-based farming guidance."
        }
        Role::Officer => {
            "Greetings! I'm AgriBot, ready to assist with agricultural analysis, crop planning, \
             and technical recommendations."
        }
        Role::User => {
            "Hi there! I'm AgriBot, your agricultural assistant. Ask me about crops, farming, \
             weather, or soil management!"
        }
    }
}

/// External capabilities the handlers depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub crop_model: Arc<dyn CropModel>,
    pub fertilizer_table: Arc<dyn FertilizerTable>,
    pub weather: Arc<dyn WeatherProvider>,
}

#[derive(Clone)]
pub struct DomainHandlers {
    collaborators: Collaborators,
}

impl DomainHandlers {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Routes a classified turn to its handler. Only reference-data misses
    /// surface as errors; provider failures are absorbed into fallbacks.
    pub async fn dispatch(
        &self,
        intent: Intent,
        message: &str,
        context: &mut ChatContext,
    ) -> Result<HandlerReply, DomainError> {
        match intent {
            Intent::Greeting => Ok(self.greeting(context)),
            Intent::CropRecommendation => Ok(self.crop_recommendation(message, context).await),
            Intent::FertilizerAdvice => self.fertilizer_advice(message, context).await,
            Intent::WeatherInquiry => Ok(self.weather_inquiry(message, context).await),
            Intent::SoilManagement | Intent::DiseasePest | Intent::GeneralHelp => {
                Ok(self.general_query(message, context).await)
            }
        }
    }

    fn greeting(&self, context: &ChatContext) -> HandlerReply {
        let text = format!("{}{GREETING_TAIL}", greeting_for(context.role));
        HandlerReply::new(text, &[ReplyAction::Greeting]).with_suggestions(&[
            "Recommend a crop",
            "Weather in my city",
            "How to improve soil?",
        ])
    }

    async fn crop_recommendation(&self, message: &str, context: &mut ChatContext) -> HandlerReply {
        if context.soil_data.is_empty() {
            return HandlerReply::new(SOIL_DATA_REQUEST, &[ReplyAction::RequestSoilData])
                .with_suggestions(&["Get Soil Test", "Enter Soil Data", "Weather Check"]);
        }

        let missing = context.soil_data.missing(&CROP_REQUIRED_FIELDS);
        if !missing.is_empty() {
            let names = display_names(&missing);
            let text = format!(
                "I need a bit more information to give you accurate recommendations.\n\n\
                 Missing: {}\n\nCould you provide these values?",
                names.join(", ")
            );
            return HandlerReply::new(text, &[ReplyAction::RequestMissingData])
                .with_data("missing_params", json!(names));
        }

        let recommendations = match self.run_crop_model(context) {
            Ok(recommendations) if !recommendations.is_empty() => recommendations,
            Ok(_) => {
                let absent = display_names(&context.soil_data.missing(&FEATURE_ORDER));
                return HandlerReply::new(RETRY_ANALYSIS, &[ReplyAction::RetryAnalysis])
                    .with_data("missing_features", json!(absent));
            }
            Err(error) => {
                warn!(
                    event_name = "agent.handler.crop_model_failed",
                    error = %error,
                    "crop model could not score soil data"
                );
                return HandlerReply::new(RETRY_ANALYSIS, &[ReplyAction::RetryAnalysis]);
            }
        };

        context.store_recommendations(recommendations);
        let stored = context.last_crop_recommendations.clone();

        let prompt = prompts::crop_recommendation(message, context, &stored);
        let narrative = self
            .narrate("crop_recommendation", &prompt, || crop_fallback(&stored))
            .await;

        HandlerReply::new(
            narrative,
            &[ReplyAction::ShowCropDetails, ReplyAction::GetFertilizerAdvice],
        )
        .with_data("recommendations", json!(stored))
        .with_suggestions(&["Fertilizer Advice", "Weather Update", "Soil Tips"])
    }

    /// `Ok(empty)` means a model feature is still unset.
    fn run_crop_model(
        &self,
        context: &ChatContext,
    ) -> Result<Vec<CropRecommendation>, DomainError> {
        let Some(features) = FeatureVector::from_soil(&context.soil_data)? else {
            return Ok(Vec::new());
        };
        let predictions = self.collaborators.crop_model.predict(&features)?;
        Ok(top_recommendations(predictions))
    }

    async fn fertilizer_advice(
        &self,
        message: &str,
        context: &mut ChatContext,
    ) -> Result<HandlerReply, DomainError> {
        let crop = context
            .soil_data
            .crop
            .clone()
            .or_else(|| context.last_crop_recommendations.first().map(|rec| rec.crop.clone()));

        let Some(crop) = crop else {
            let reply =
                HandlerReply::new(CROP_SELECTION_REQUEST, &[ReplyAction::RequestCropSelection]);
            return Ok(reply.with_suggestions(&[
                "Recommend Crops First",
                "Rice Fertilizer",
                "Wheat Fertilizer",
            ]));
        };

        let soil = &context.soil_data;
        let (Some(n), Some(p), Some(k)) = (soil.n, soil.p, soil.k) else {
            let text = format!(
                "To give you the best fertilizer advice for {crop}, I need your current soil NPK \
                 levels.\n\nCould you share:\n• Nitrogen (N) level\n• Phosphorus (P) level\n\
                 • Potassium (K) level"
            );
            return Ok(HandlerReply::new(text, &[ReplyAction::RequestNpkData])
                .with_suggestions(&["Get Soil Test", "Skip to General Advice"]));
        };

        let advice = recommend(
            self.collaborators.fertilizer_table.as_ref(),
            &crop,
            NutrientLevels::new(n, p, k),
        )?;
        info!(
            event_name = "agent.handler.fertilizer_advice",
            crop = %crop,
            advice = advice.type_label(),
            "nutrient gap computed"
        );
        context.last_fertilizer_advice = Some(advice.clone());

        let prompt = prompts::fertilizer_advice(message, context, &crop, &advice);
        let narrative = self
            .narrate("fertilizer_advice", &prompt, || fertilizer_fallback(&crop, &advice))
            .await;

        Ok(HandlerReply::new(narrative, &[ReplyAction::ShowFertilizerDetails])
            .with_data("crop", json!(crop))
            .with_data("fertilizer_info", json!(advice))
            .with_suggestions(&["Weather Check", "Soil Improvement", "Crop Care Tips"]))
    }

    async fn weather_inquiry(&self, message: &str, context: &mut ChatContext) -> HandlerReply {
        let Some(location) = context.resolved_location().map(str::to_string) else {
            return HandlerReply::new(LOCATION_REQUEST, &[ReplyAction::RequestLocation])
                .with_suggestions(&["Mumbai Weather", "Delhi Weather", "Bangalore Weather"]);
        };

        let report = match self.collaborators.weather.fetch(&location).await {
            Ok(report) => report,
            Err(error) => {
                warn!(
                    event_name = "agent.handler.weather_failed",
                    location = %location,
                    error = %error,
                    "weather provider failed"
                );
                let text = format!(
                    "I'm having trouble getting weather data for {location} right now. \
                     Please try again in a moment."
                );
                return HandlerReply::new(text, &[ReplyAction::RetryWeather]);
            }
        };

        let prompt = prompts::weather_inquiry(message, context, &location, &report);
        let narrative = self
            .narrate("weather_inquiry", &prompt, || weather_fallback(&location, &report))
            .await;

        HandlerReply::new(narrative, &[ReplyAction::ShowWeatherDetails])
            .with_data("location", json!(location))
            .with_data("weather", json!(report))
            .with_suggestions(&["Irrigation Advice", "Crop Protection", "Harvest Timing"])
    }

    async fn general_query(&self, message: &str, context: &ChatContext) -> HandlerReply {
        let prompt = prompts::general_query(message, context);
        let narrative =
            self.narrate("general_query", &prompt, || GENERAL_APOLOGY.to_string()).await;

        HandlerReply::new(narrative, &[ReplyAction::GeneralAdvice]).with_suggestions(&[
            "Crop Recommendations",
            "Fertilizer Advice",
            "Weather Check",
            "Platform Help",
        ])
    }

    /// One provider call; on failure the fallback text is used instead.
    async fn narrate(
        &self,
        handler: &'static str,
        prompt: &str,
        fallback: impl FnOnce() -> String,
    ) -> String {
        match self.collaborators.llm.complete(prompt).await {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    event_name = "agent.narrator.fallback",
                    handler,
                    error = %error,
                    "narration failed, using template reply"
                );
                fallback()
            }
        }
    }
}

fn display_names(fields: &[SoilField]) -> Vec<&'static str> {
    fields.iter().map(SoilField::display_name).collect()
}

fn crop_fallback(recommendations: &[CropRecommendation]) -> String {
    let lines: Vec<String> = recommendations
        .iter()
        .map(|rec| format!("{} ({}% suitable)", rec.crop, rec.probability))
        .collect();
    format!(
        "Based on your soil analysis, here are my top recommendations:\n\n{}\n\n\
         These crops match well with your soil's NPK levels and environmental conditions!",
        lines.join("\n")
    )
}

fn fertilizer_fallback(crop: &str, advice: &FertilizerAdvice) -> String {
    match advice {
        FertilizerAdvice::Balanced => FertilizerAdvice::BALANCED_MESSAGE.to_string(),
        FertilizerAdvice::Deficiency(deficiency) => format!(
            "For your {crop} crop, you have a {} deficiency of {} units. It is recommended to \
             use {}.",
            deficiency.nutrient.label(),
            deficiency.deficiency,
            deficiency.fertilizer_type
        ),
    }
}

fn weather_fallback(location: &str, report: &WeatherReport) -> String {
    format!(
        "Weather in {location}:\n• Temperature: {}°C\n• Humidity: {}%\n\n\
         This is good weather for most farming activities. Consider irrigation if humidity is low.",
        report.temperature, report.humidity
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agrivision_core::agronomy::crop_model::{CropModel, FeatureVector};
    use agrivision_core::agronomy::fertilizer::{FertilizerAdvice, NutrientLevels, ReferenceTable};
    use agrivision_core::domain::context::{ChatContext, CropRecommendation, Role};
    use agrivision_core::domain::intent::Intent;
    use agrivision_core::domain::soil::SlotPatch;
    use agrivision_core::domain::weather::{WeatherError, WeatherProvider, WeatherReport};
    use agrivision_core::errors::DomainError;
    use async_trait::async_trait;
    use serde_json::json;

    use super::{Collaborators, DomainHandlers, GENERAL_APOLOGY};
    use crate::composer::ReplyAction;
    use crate::llm::{LlmClient, ScriptedLlmClient};

    struct FixedModel;

    impl CropModel for FixedModel {
        fn predict(&self, _: &FeatureVector) -> Result<Vec<(String, f64)>, DomainError> {
            Ok(vec![
                ("maize".into(), 0.2),
                ("rice".into(), 0.6),
                ("jute".into(), 0.15),
                ("cotton".into(), 0.05),
            ])
        }

        fn classes(&self) -> usize {
            4
        }
    }

    struct FixedWeather(Option<WeatherReport>);

    #[async_trait]
    impl WeatherProvider for FixedWeather {
        async fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
            self.0.clone().ok_or_else(|| WeatherError::NotFound { city: city.to_string() })
        }
    }

    fn report() -> WeatherReport {
        WeatherReport {
            temperature: 31.5,
            humidity: 40.0,
            description: "clear sky".into(),
            city: "Pune".into(),
            country: Some("IN".into()),
        }
    }

    fn handlers_with(llm: Arc<dyn LlmClient>, weather: Option<WeatherReport>) -> DomainHandlers {
        DomainHandlers::new(Collaborators {
            llm,
            crop_model: Arc::new(FixedModel),
            fertilizer_table: Arc::new(ReferenceTable::new([(
                "rice".to_string(),
                NutrientLevels::new(80.0, 40.0, 40.0),
            )])),
            weather: Arc::new(FixedWeather(weather)),
        })
    }

    fn context_with(slots: serde_json::Value) -> ChatContext {
        let mut context = ChatContext::new(Role::Farmer);
        context.merge_slots(&SlotPatch::from_value(&slots));
        context
    }

    fn full_soil() -> serde_json::Value {
        json!({
            "N": 90, "P": 42, "K": 43, "ph": 6.5,
            "temperature": 21, "humidity": 82, "rainfall": 203
        })
    }

    #[tokio::test]
    async fn greeting_is_role_specific_and_makes_no_call() {
        let llm = Arc::new(ScriptedLlmClient::failing());
        let handlers = handlers_with(llm.clone(), None);
        let mut context = ChatContext::new(Role::Officer);

        let reply = handlers.dispatch(Intent::Greeting, "hi", &mut context).await.expect("reply");
        assert!(reply.narrative.starts_with("Greetings! I'm AgriBot"));
        assert!(reply.narrative.ends_with("What would you like to know about today? 🌾"));
        assert_eq!(reply.actions, vec![ReplyAction::Greeting]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn crop_request_without_soil_data_asks_for_it() {
        let llm = Arc::new(ScriptedLlmClient::failing());
        let handlers = handlers_with(llm.clone(), None);
        let mut context = ChatContext::default();

        let reply =
            handlers.dispatch(Intent::CropRecommendation, "what to grow", &mut context).await;
        let reply = reply.expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RequestSoilData]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn crop_request_lists_missing_fields() {
        let llm = Arc::new(ScriptedLlmClient::failing());
        let handlers = handlers_with(llm.clone(), None);
        let mut context = context_with(json!({"N": 90, "P": 42, "humidity": 80}));

        let reply = handlers
            .dispatch(Intent::CropRecommendation, "what to grow", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RequestMissingData]);
        assert!(reply.narrative.contains("Missing: K, temperature, rainfall"));
        assert_eq!(reply.data["missing_params"], json!(["K", "temperature", "rainfall"]));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn crop_request_without_ph_reports_retry_analysis() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = context_with(
            json!({"N": 90, "P": 42, "K": 43, "temperature": 21, "humidity": 82, "rainfall": 203}),
        );

        let reply = handlers
            .dispatch(Intent::CropRecommendation, "what to grow", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RetryAnalysis]);
        assert_eq!(reply.data["missing_features"], json!(["ph"]));
        assert!(context.last_crop_recommendations.is_empty());
    }

    #[tokio::test]
    async fn crop_recommendations_are_stored_and_narration_falls_back() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = context_with(full_soil());

        let reply = handlers
            .dispatch(Intent::CropRecommendation, "what to grow", &mut context)
            .await
            .expect("reply");

        let crops: Vec<&str> =
            context.last_crop_recommendations.iter().map(|rec| rec.crop.as_str()).collect();
        assert_eq!(crops, vec!["rice", "maize", "jute"]);
        assert_eq!(context.last_crop_recommendations[0].probability, 60.0);
        assert!(reply.narrative.starts_with("Based on your soil analysis"));
        assert!(reply.narrative.contains("rice (60% suitable)\nmaize (20% suitable)"));
        assert_eq!(
            reply.actions,
            vec![ReplyAction::ShowCropDetails, ReplyAction::GetFertilizerAdvice]
        );
    }

    #[tokio::test]
    async fn narration_is_used_when_provider_answers() {
        let handlers =
            handlers_with(Arc::new(ScriptedLlmClient::constant("Rice suits your field.")), None);
        let mut context = context_with(full_soil());

        let reply = handlers
            .dispatch(Intent::CropRecommendation, "what to grow", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.narrative, "Rice suits your field.");
    }

    #[tokio::test]
    async fn fertilizer_without_crop_asks_for_one() {
        let llm = Arc::new(ScriptedLlmClient::failing());
        let handlers = handlers_with(llm.clone(), None);
        let mut context = context_with(json!({"N": 60, "P": 40, "K": 40}));

        let reply =
            handlers.dispatch(Intent::FertilizerAdvice, "fertilizer?", &mut context).await;
        assert_eq!(reply.expect("reply").actions, vec![ReplyAction::RequestCropSelection]);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn fertilizer_without_npk_asks_for_levels() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = context_with(json!({"crop": "rice", "N": 60}));

        let reply = handlers
            .dispatch(Intent::FertilizerAdvice, "fertilizer?", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RequestNpkData]);
        assert!(reply.narrative.contains("fertilizer advice for rice"));
    }

    #[tokio::test]
    async fn non_finite_nitrogen_is_not_reported_as_balanced() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = context_with(json!({"crop": "rice", "N": "NaN", "P": 40, "K": 40}));

        let reply = handlers
            .dispatch(Intent::FertilizerAdvice, "fertilizer?", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RequestNpkData]);
        assert!(context.last_fertilizer_advice.is_none());
    }

    #[tokio::test]
    async fn fertilizer_uses_top_recommendation_when_no_crop_given() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = context_with(json!({"N": 60, "P": 40, "K": 40}));
        context.store_recommendations(vec![CropRecommendation {
            crop: "rice".into(),
            probability: 70.0,
        }]);

        let reply = handlers
            .dispatch(Intent::FertilizerAdvice, "fertilizer?", &mut context)
            .await
            .expect("reply");

        assert_eq!(
            reply.narrative,
            "For your rice crop, you have a Nitrogen deficiency of 20 units. It is recommended \
             to use Urea or Ammonium Nitrate."
        );
        assert_eq!(reply.data["fertilizer_info"]["type"], "Nitrogen");
        assert!(matches!(context.last_fertilizer_advice, Some(FertilizerAdvice::Deficiency(_))));
    }

    #[tokio::test]
    async fn unknown_crop_is_a_domain_error() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = context_with(json!({"crop": "Tomato", "N": 1, "P": 1, "K": 1}));

        let error = handlers
            .dispatch(Intent::FertilizerAdvice, "fertilizer?", &mut context)
            .await
            .expect_err("tomato is not in the table");
        assert_eq!(error, DomainError::CropNotInReferenceTable { crop: "Tomato".into() });
    }

    #[tokio::test]
    async fn weather_without_location_asks_for_one() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), Some(report()));
        let mut context = ChatContext::default();

        let reply = handlers
            .dispatch(Intent::WeatherInquiry, "weather?", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RequestLocation]);
    }

    #[tokio::test]
    async fn weather_failure_skips_narration() {
        let llm = Arc::new(ScriptedLlmClient::constant("unused"));
        let handlers = handlers_with(llm.clone(), None);
        let mut context = context_with(json!({"location": "Atlantis"}));

        let reply = handlers
            .dispatch(Intent::WeatherInquiry, "weather?", &mut context)
            .await
            .expect("reply");
        assert_eq!(reply.actions, vec![ReplyAction::RetryWeather]);
        assert!(reply.narrative.contains("weather data for Atlantis"));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn weather_fallback_uses_temperature_and_humidity() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), Some(report()));
        let mut context = ChatContext::default();
        context.soil_data.location = Some("Pune".into());

        let reply = handlers
            .dispatch(Intent::WeatherInquiry, "weather?", &mut context)
            .await
            .expect("reply");
        assert!(reply
            .narrative
            .starts_with("Weather in Pune:\n• Temperature: 31.5°C\n• Humidity: 40%"));
        assert_eq!(reply.data["weather"]["description"], "clear sky");
    }

    #[tokio::test]
    async fn general_questions_fall_back_to_apology() {
        let handlers = handlers_with(Arc::new(ScriptedLlmClient::failing()), None);
        let mut context = ChatContext::default();

        for intent in [Intent::SoilManagement, Intent::DiseasePest, Intent::GeneralHelp] {
            let reply = handlers.dispatch(intent, "aphids?", &mut context).await.expect("reply");
            assert_eq!(reply.narrative, GENERAL_APOLOGY);
            assert_eq!(reply.actions, vec![ReplyAction::GeneralAdvice]);
        }
    }
}
