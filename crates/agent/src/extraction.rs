use std::sync::Arc;

use agrivision_core::domain::context::ChatContext;
use agrivision_core::domain::soil::SlotPatch;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::prompts;

/// Pulls soil, climate and place parameters out of a message. Always yields a
/// patch; anything that goes wrong produces an empty one.
#[derive(Clone)]
pub struct SlotExtractor {
    llm: Arc<dyn LlmClient>,
}

impl SlotExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn extract(&self, message: &str, context: &ChatContext) -> SlotPatch {
        let prompt = prompts::extraction(message, context);

        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.extractor.fallback",
                    reason = "provider_error",
                    error = %error,
                    "slot extraction failed"
                );
                return SlotPatch::default();
            }
        };

        let Some(patch) = parse_slots(&reply) else {
            warn!(
                event_name = "agent.extractor.fallback",
                reason = "unparseable_reply",
                "slot extraction reply is not a JSON object"
            );
            return SlotPatch::default();
        };

        if !patch.rejected.is_empty() {
            warn!(
                event_name = "agent.extractor.rejected_slots",
                keys = ?patch.rejected,
                "dropped slot values with unusable shapes"
            );
        }
        debug!(event_name = "agent.extractor.resolved", empty = patch.is_empty(), "extracted");
        patch
    }
}

/// Parses a provider reply into a patch. `None` when the reply is not JSON or
/// not a JSON object.
pub fn parse_slots(reply: &str) -> Option<SlotPatch> {
    match serde_json::from_str::<Value>(strip_code_fences(reply)).ok()? {
        Value::Object(map) => Some(SlotPatch::from_map(&map)),
        _ => None,
    }
}

/// Removes a surrounding markdown code fence (with or without a `json` tag).
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = rest.strip_prefix("json").or_else(|| rest.strip_prefix("JSON")).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}
