//! Generative text providers.
//!
//! Every provider exposes the same one-shot `complete(prompt)` call. Wire
//! types for each HTTP protocol stay private to this module.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agrivision_core::config::{LlmConfig, LlmProvider};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Builds the client selected by `llm.provider`.
pub fn build_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider {
        LlmProvider::Offline => Ok(Arc::new(OfflineLlmClient)),
        _ => Ok(Arc::new(HttpLlmClient::from_config(config)?)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Protocol {
    ChatCompletions,
    OllamaGenerate,
    GeminiGenerateContent,
}

#[derive(Clone, Debug)]
pub struct HttpLlmClient {
    client: Client,
    protocol: Protocol,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base = config.base_url.as_deref().map(|url| url.trim_end_matches('/'));
        let (protocol, endpoint) = match config.provider {
            LlmProvider::OpenAi => {
                let base = base.unwrap_or(OPENAI_DEFAULT_BASE);
                let endpoint = if base.ends_with("/chat/completions") {
                    base.to_string()
                } else {
                    format!("{base}/chat/completions")
                };
                (Protocol::ChatCompletions, endpoint)
            }
            LlmProvider::Ollama => {
                let base = base.ok_or_else(|| anyhow!("ollama provider requires llm.base_url"))?;
                (Protocol::OllamaGenerate, format!("{base}/api/generate"))
            }
            LlmProvider::Gemini => {
                let base = base.unwrap_or(GEMINI_DEFAULT_BASE);
                let endpoint = format!("{base}/models/{}:generateContent", config.model);
                (Protocol::GeminiGenerateContent, endpoint)
            }
            LlmProvider::Offline => bail!("offline provider has no HTTP endpoint"),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client for llm provider")?;

        Ok(Self {
            client,
            protocol,
            endpoint,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        match self.protocol {
            Protocol::ChatCompletions => {
                let payload = ChatCompletionRequest {
                    model: &self.model,
                    messages: vec![ChatMessage { role: "user", content: prompt }],
                };
                let request = self.client.post(&self.endpoint).json(&payload);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key.expose_secret()),
                    None => request,
                }
            }
            Protocol::OllamaGenerate => {
                let payload = OllamaGenerateRequest { model: &self.model, prompt, stream: false };
                self.client.post(&self.endpoint).json(&payload)
            }
            Protocol::GeminiGenerateContent => {
                let payload = GeminiRequest {
                    contents: vec![GeminiContent { parts: vec![GeminiPart { text: prompt }] }],
                };
                let request = self.client.post(&self.endpoint).json(&payload);
                match &self.api_key {
                    Some(key) => request.header("x-goog-api-key", key.expose_secret()),
                    None => request,
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!(
            event_name = "agent.llm.request",
            endpoint = %self.endpoint,
            model = %self.model,
            prompt_len = prompt.len(),
            "sending llm request"
        );

        let response = self
            .request(prompt)
            .send()
            .await
            .with_context(|| format!("llm request to `{}` failed", self.endpoint))?;
        let body = check_status(response).await?.text().await.context("failed to read llm body")?;

        let text = match self.protocol {
            Protocol::ChatCompletions => serde_json::from_str::<ChatCompletionResponse>(&body)
                .context("failed to parse chat completion response")?
                .into_text(),
            Protocol::OllamaGenerate => serde_json::from_str::<OllamaGenerateResponse>(&body)
                .context("failed to parse ollama response")?
                .into_text(),
            Protocol::GeminiGenerateContent => serde_json::from_str::<GeminiResponse>(&body)
                .context("failed to parse gemini response")?
                .into_text(),
        };

        text.ok_or_else(|| anyhow!("llm response carried no text"))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    bail!("llm provider returned HTTP {status}: {message}")
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_text(self) -> Option<String> {
        let choice = self.choices.into_iter().next()?;
        choice.message.content.and_then(non_empty)
    }
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaGenerateResponse {
    fn into_text(self) -> Option<String> {
        non_empty(self.response)
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let joined: String = content.parts.into_iter().filter_map(|part| part.text).collect();
        non_empty(joined)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Provider used when no generative backend is configured. Every call fails,
/// so handlers always answer with their deterministic fallback text.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineLlmClient;

#[async_trait]
impl LlmClient for OfflineLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("generative provider is disabled (offline mode)")
    }
}

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Deterministic client for tests and demos: replies are produced by a
/// closure over the prompt, and every prompt is recorded.
pub struct ScriptedLlmClient {
    responder: Box<Responder>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Client whose every call fails.
    pub fn failing() -> Self {
        Self::new(|_| Err(anyhow!("scripted provider failure")))
    }

    /// Client that answers every prompt with the same text.
    pub fn constant(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        (self.responder)(prompt)
    }
}
