//! Prompt builders for the generative provider.
//!
//! Only the recent conversation tail is rendered into a prompt. Each prompt
//! opens with a fixed task line so logs (and scripted test clients) can tell
//! them apart.

use agrivision_core::agronomy::fertilizer::FertilizerAdvice;
use agrivision_core::domain::context::{ChatContext, CropRecommendation, Turn};
use agrivision_core::domain::weather::WeatherReport;

/// Number of past turns rendered into a prompt.
pub const HISTORY_TURNS: usize = 3;

pub const CLASSIFY_TASK: &str = "Task: classify the intent of the latest message.";
pub const EXTRACT_TASK: &str = "Task: extract agricultural parameters.";
pub const CROP_TASK: &str = "Task: explain crop recommendations.";
pub const FERTILIZER_TASK: &str = "Task: explain fertilizer advice.";
pub const WEATHER_TASK: &str = "Task: give weather-based farming advice.";
pub const GENERAL_TASK: &str = "Task: answer a farming question.";

pub fn render_history(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return "No previous conversation.".to_string();
    }

    let lines: Vec<String> = turns
        .iter()
        .map(|turn| format!("User: {}\nAgriBot: {}", turn.user_text, turn.bot_text))
        .collect();
    format!("This is the recent conversation history:\n{}", lines.join("\n"))
}

fn history(context: &ChatContext) -> String {
    render_history(context.recent_history(HISTORY_TURNS))
}

fn soil_json(context: &ChatContext) -> String {
    serde_json::to_string(&context.soil_data).unwrap_or_default()
}

pub fn classification(message: &str, context: &ChatContext) -> String {
    format!(
        "{CLASSIFY_TASK}\n\
         Based on the conversation history and the latest message, classify the user's \
         intent into ONE category.\n\n\
         {history}\n\n\
         Latest Message: \"{message}\"\n\n\
         Categories: CROP_RECOMMENDATION, FERTILIZER_ADVICE, WEATHER_INQUIRY, SOIL_MANAGEMENT, \
         DISEASE_PEST, GENERAL_HELP, GREETING.\n\
         Respond with only the category name.",
        history = history(context),
    )
}

pub fn extraction(message: &str, context: &ChatContext) -> String {
    format!(
        "{EXTRACT_TASK}\n\
         Extract agricultural parameters from the latest message, using the conversation \
         history for context.\n\n\
         {history}\n\
         Latest Message: \"{message}\"\n\n\
         Extract any of these parameters if present: N, P, K, ph, temperature, humidity, \
         rainfall, location, crop.\n\
         Return only valid JSON with found parameters, or an empty JSON object {{}} if none \
         are found.\n\
         Example: {{\"N\": 90, \"P\": 40, \"location\": \"Mumbai\"}}",
        history = history(context),
    )
}

pub fn crop_recommendation(
    message: &str,
    context: &ChatContext,
    recommendations: &[CropRecommendation],
) -> String {
    let listed: Vec<String> = recommendations
        .iter()
        .map(|rec| format!("{} ({}% suitable)", rec.crop, rec.probability))
        .collect();
    format!(
        "{CROP_TASK}\n\
         Based on the conversation history, write a friendly, detailed response about these \
         crop recommendations.\n\
         {history}\n\
         Soil Data: {soil}\n\
         Recommendations: {recs}\n\
         Latest User Message: \"{message}\"\n\
         Explain why these crops are suitable and suggest next steps such as fertilizer advice.",
        history = history(context),
        soil = soil_json(context),
        recs = listed.join(", "),
    )
}

pub fn fertilizer_advice(
    message: &str,
    context: &ChatContext,
    crop: &str,
    advice: &FertilizerAdvice,
) -> String {
    format!(
        "{FERTILIZER_TASK}\n\
         Based on the conversation history, create a helpful fertilizer recommendation.\n\
         {history}\n\
         Crop: {crop}\n\
         Current Soil NPK: {soil}\n\
         Fertilizer Analysis: {analysis}\n\
         Latest User Message: \"{message}\"\n\
         Explain the nutrient status, the deficiency and the specific fertilizer to apply.",
        history = history(context),
        soil = soil_json(context),
        analysis = serde_json::to_string(advice).unwrap_or_default(),
    )
}

pub fn weather_inquiry(
    message: &str,
    context: &ChatContext,
    location: &str,
    report: &WeatherReport,
) -> String {
    format!(
        "{WEATHER_TASK}\n\
         Based on the conversation history, provide weather-based farming advice.\n\
         {history}\n\
         Location: {location}\n\
         Weather Data: temperature {temperature}°C, humidity {humidity}%, {description}\n\
         Latest User Message: \"{message}\"\n\
         Summarize the current weather, its farming implications, and concrete irrigation, \
         planting or harvesting recommendations.",
        history = history(context),
        temperature = report.temperature,
        humidity = report.humidity,
        description = report.description,
    )
}

pub fn general_query(message: &str, context: &ChatContext) -> String {
    format!(
        "{GENERAL_TASK}\n\
         You are an expert agricultural assistant. Based on the conversation history, answer \
         this farming question.\n\
         {history}\n\
         Latest Question: \"{message}\"\n\
         Provide helpful, practical agricultural advice.",
        history = history(context),
    )
}

#[cfg(test)]
mod tests {
    use agrivision_core::domain::context::{ChatContext, Turn};
    use agrivision_core::domain::intent::Intent;
    use chrono::Utc;

    use super::{classification, render_history, CLASSIFY_TASK};

    fn turn(index: usize) -> Turn {
        Turn {
            user_text: format!("question {index}"),
            bot_text: format!("answer {index}"),
            timestamp: Utc::now(),
            intent: Intent::GeneralHelp,
        }
    }

    #[test]
    fn empty_history_renders_placeholder() {
        assert_eq!(render_history(&[]), "No previous conversation.");
    }

    #[test]
    fn only_last_three_turns_reach_the_prompt() {
        let mut context = ChatContext::default();
        for index in 0..5 {
            context.record_turn(turn(index), 100);
        }

        let prompt = classification("hello", &context);
        assert!(prompt.starts_with(CLASSIFY_TASK));
        assert!(!prompt.contains("question 1"));
        assert!(prompt.contains("User: question 2\nAgriBot: answer 2"));
        assert!(prompt.contains("question 4"));
        assert!(prompt.contains("Latest Message: \"hello\""));
    }
}
