use std::sync::Arc;

use agrivision_core::domain::context::ChatContext;
use agrivision_core::domain::intent::Intent;
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::prompts;

/// Maps a message onto one of the fixed intents with a single provider call.
/// Never fails: provider errors and unrecognized replies become `GeneralHelp`.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, message: &str, context: &ChatContext) -> Intent {
        let prompt = prompts::classification(message, context);

        match self.llm.complete(&prompt).await {
            Ok(reply) => match Intent::from_label(&reply) {
                Some(intent) => {
                    debug!(
                        event_name = "agent.classifier.resolved",
                        intent = %intent,
                        "classified"
                    );
                    intent
                }
                None => {
                    warn!(
                        event_name = "agent.classifier.fallback",
                        reason = "unrecognized_label",
                        reply = %reply.trim(),
                        "classifier reply is not a known intent"
                    );
                    Intent::GeneralHelp
                }
            },
            Err(error) => {
                warn!(
                    event_name = "agent.classifier.fallback",
                    reason = "provider_error",
                    error = %error,
                    "intent classification failed"
                );
                Intent::GeneralHelp
            }
        }
    }
}
