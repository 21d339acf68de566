use std::sync::Arc;

use agrivision_core::config::SessionConfig;
use agrivision_core::domain::context::Role;
use agrivision_core::domain::soil::SoilData;
use agrivision_core::errors::{ApplicationError, DomainError};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::IntentClassifier;
use crate::composer::{compose, TurnResponse};
use crate::extraction::SlotExtractor;
use crate::handlers::{Collaborators, DomainHandlers};
use crate::session::SessionStore;

#[derive(Debug, Error, PartialEq)]
pub enum TurnError {
    #[error("No message provided")]
    EmptyMessage,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<TurnError> for ApplicationError {
    fn from(error: TurnError) -> Self {
        match error {
            TurnError::EmptyMessage => ApplicationError::Domain(DomainError::InvariantViolation(
                "message must not be empty".to_string(),
            )),
            TurnError::Domain(error) => ApplicationError::Domain(error),
        }
    }
}

/// One incoming chat message plus optional context overrides.
#[derive(Clone, Debug, Default)]
pub struct TurnRequest {
    pub session_id: String,
    pub role: Role,
    pub message: String,
    /// Replaces the stored soil data before the turn runs.
    pub soil_data: Option<Map<String, Value>>,
    pub location: Option<String>,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub soil_data: SoilData,
    pub location: Option<String>,
    pub conversation_count: usize,
}

pub struct AgentRuntime {
    sessions: Arc<SessionStore>,
    classifier: IntentClassifier,
    extractor: SlotExtractor,
    handlers: DomainHandlers,
    max_history_turns: usize,
}

impl AgentRuntime {
    pub fn new(collaborators: Collaborators, session: &SessionConfig) -> Self {
        Self::with_sessions(
            collaborators,
            Arc::new(SessionStore::from_config(session)),
            session.max_history_turns,
        )
    }

    pub fn with_sessions(
        collaborators: Collaborators,
        sessions: Arc<SessionStore>,
        max_history_turns: usize,
    ) -> Self {
        Self {
            sessions,
            classifier: IntentClassifier::new(Arc::clone(&collaborators.llm)),
            extractor: SlotExtractor::new(Arc::clone(&collaborators.llm)),
            handlers: DomainHandlers::new(collaborators),
            max_history_turns,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Runs one turn: classify, extract, merge, dispatch, compose. The
    /// session's context stays locked for the whole turn.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let shared = self.sessions.acquire(&request.session_id, request.role).await;
        let mut context = shared.lock().await;

        if let Some(soil_data) = &request.soil_data {
            context.soil_data = SoilData::from_map(soil_data);
        }
        if let Some(location) = &request.location {
            context.location = Some(location.clone());
        }

        let intent = self.classifier.classify(message, &context).await;
        let patch = self.extractor.extract(message, &context).await;
        context.merge_slots(&patch);

        let reply = match self.handlers.dispatch(intent, message, &mut context).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.failed",
                    correlation_id = %request.correlation_id,
                    session_id = %request.session_id,
                    intent = %intent,
                    error = %error,
                    "turn aborted by domain error"
                );
                return Err(error.into());
            }
        };

        let response = compose(&mut context, message, intent, reply, self.max_history_turns);
        info!(
            event_name = "agent.turn.completed",
            correlation_id = %request.correlation_id,
            session_id = %request.session_id,
            intent = %intent,
            actions = ?response.actions,
            history_len = context.conversation_history.len(),
            "turn completed"
        );
        Ok(response)
    }

    pub async fn context_snapshot(&self, session_id: &str) -> Option<ContextSnapshot> {
        let shared = self.sessions.get(session_id).await?;
        let context = shared.lock().await;
        Some(ContextSnapshot {
            soil_data: context.soil_data.clone(),
            location: context.location.clone(),
            conversation_count: context.conversation_history.len(),
        })
    }

    /// Creates the session if needed and overwrites the given fields.
    pub async fn update_context(
        &self,
        session_id: &str,
        role: Role,
        soil_data: Option<&Map<String, Value>>,
        location: Option<&str>,
    ) {
        let shared = self.sessions.acquire(session_id, role).await;
        let mut context = shared.lock().await;
        if let Some(soil_data) = soil_data {
            context.soil_data = SoilData::from_map(soil_data);
        }
        if let Some(location) = location {
            context.location = Some(location.to_string());
        }
        info!(event_name = "agent.context.updated", session_id, "context updated");
    }
}
