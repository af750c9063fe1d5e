//! Transport-agnostic contract for exchanging chat turns with a completion backend.
//!
//! Only request/reply shapes, the blocking transport trait, and the shared
//! exchange log live here. Wire formats belong to concrete transports.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

mod exchange;

pub use exchange::{ExchangeEntry, ExchangeLog, DEFAULT_EXCHANGE_CAPACITY};

/// Identifier for one in-flight request.
pub type RunId = u64;

/// Shared cancellation flag for a request.
pub type CancelSignal = Arc<AtomicBool>;

/// Failure of one transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The caller raised the cancel signal before a reply arrived.
    Cancelled,
    Failed(String),
    Unsupported(String),
}

impl TransportError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("request was cancelled"),
            Self::Failed(message) => f.write_str(message),
            Self::Unsupported(message) => write!(f, "unsupported: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Speaker of a turn as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One prior turn sent along as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Everything a transport needs to request one assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    /// Sliding context window of earlier turns, oldest first.
    pub history: Vec<ChatTurn>,
    pub system_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub auto_summary: bool,
}

impl ChatRequest {
    #[must_use]
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            history: Vec::new(),
            system_prompt: None,
            model: String::new(),
            temperature: 0.7,
            top_p: 1.0,
            auto_summary: false,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    #[must_use]
    pub fn with_auto_summary(mut self, enabled: bool) -> Self {
        self.auto_summary = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTokensDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionTokensDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_prediction_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_prediction_tokens: Option<u64>,
}

/// Token accounting reported by the backend for one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

impl TokenUsage {
    #[must_use]
    pub fn cached_tokens(&self) -> Option<u64> {
        self.prompt_tokens_details
            .as_ref()
            .and_then(|details| details.cached_tokens)
    }

    #[must_use]
    pub fn reasoning_tokens(&self) -> Option<u64> {
        self.completion_tokens_details
            .as_ref()
            .and_then(|details| details.reasoning_tokens)
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prompt {} / completion {} / total {}",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )?;
        if let Some(cached) = self.cached_tokens() {
            write!(f, " (cached {cached})")?;
        }
        if let Some(reasoning) = self.reasoning_tokens() {
            write!(f, " (reasoning {reasoning})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub usage: Option<TokenUsage>,
}

impl ChatReply {
    #[must_use]
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            usage: None,
        }
    }
}

/// One flat message returned by history sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
}

impl HistoryRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
        }
    }
}

/// Identity of a configured transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportProfile {
    pub transport_id: String,
    pub model_id: String,
    pub endpoint: Option<String>,
}

/// Blocking transport interface; callers run it off the controller thread.
pub trait ChatTransport: Send + Sync + 'static {
    fn profile(&self) -> TransportProfile;

    /// Requests one assistant reply for `request.message`.
    ///
    /// Implementations poll `cancel` and return [`TransportError::Cancelled`]
    /// once it is raised, without producing a reply.
    fn send_message(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
    ) -> Result<ChatReply, TransportError>;

    /// Fetches the stored linear history for `session_id`, oldest first.
    fn fetch_history(
        &self,
        session_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<HistoryRecord>, TransportError>;

    fn list_models(&self) -> Result<Vec<String>, TransportError> {
        Err(TransportError::Unsupported(
            "model listing is not supported by this transport".to_string(),
        ))
    }

    /// Recent request/response exchanges, oldest first.
    fn exchanges(&self) -> Vec<ExchangeEntry> {
        Vec::new()
    }

    fn clear_exchanges(&self) {}
}
