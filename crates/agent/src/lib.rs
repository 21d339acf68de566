//! Conversational engine for agricultural questions.
//!
//! Each turn follows a fixed pipeline:
//! 1. **Session lookup** (`session`) - bounded LRU of per-session contexts
//! 2. **Intent classification** (`classifier`) - one provider call, `GENERAL_HELP` on failure
//! 3. **Slot extraction** (`extraction`) - one provider call, empty patch on failure
//! 4. **Domain handling** (`handlers`) - deterministic checks and computations, then narration
//! 5. **Composition** (`composer`) - reply envelope plus the history entry
//!
//! The generative provider only classifies, extracts and narrates. Crop
//! scores and fertilizer amounts always come from the deterministic core.

pub mod classifier;
pub mod composer;
pub mod extraction;
pub mod handlers;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod session;

pub use composer::{HandlerReply, ReplyAction, TurnResponse};
pub use handlers::{Collaborators, DomainHandlers};
pub use llm::{build_llm_client, LlmClient, OfflineLlmClient, ScriptedLlmClient};
pub use runtime::{AgentRuntime, ContextSnapshot, TurnError, TurnRequest};
pub use session::SessionStore;
