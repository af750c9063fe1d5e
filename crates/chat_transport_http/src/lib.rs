//! HTTP backend implementation of the shared `chat_transport` contract.
//!
//! Each blocking call runs the async `chat_api` client on its own
//! current-thread runtime and records the exchange in a bounded log.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chat_api::{
    ApiResponse, ChatApiClient, ChatApiConfig, ChatApiError, ChatPayload, HistoryItem,
    ReplyPayload, TurnPayload,
};
use chat_transport::{
    CancelSignal, ChatReply, ChatRequest, ChatRole, ChatTransport, ExchangeEntry, ExchangeLog,
    HistoryRecord, TokenUsage, TransportError, TransportProfile,
};
use serde_json::Value;

/// Stable transport identifier used for explicit startup selection.
pub const HTTP_TRANSPORT_ID: &str = "http";

/// Runtime configuration for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub access_token: String,
    pub model_id: String,
    pub timeout: Option<Duration>,
}

impl HttpTransportConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            model_id: String::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.base_url, self.access_token);
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

trait BackendClient: Send + Sync {
    fn chat_url(&self) -> String;

    fn history_url(&self, session_id: &str) -> String;

    fn models_url(&self) -> String;

    fn send_chat(
        &self,
        payload: &ChatPayload,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse<ReplyPayload>, ChatApiError>;

    fn fetch_history(
        &self,
        session_id: &str,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse<Vec<HistoryItem>>, ChatApiError>;

    fn list_models(&self) -> Result<ApiResponse<Vec<String>>, ChatApiError>;
}

#[derive(Debug)]
struct DefaultBackendClient {
    client: ChatApiClient,
}

impl DefaultBackendClient {
    fn url_or_base(&self, url: Result<String, ChatApiError>) -> String {
        url.unwrap_or_else(|_| self.client.config().base_url.clone())
    }
}

impl BackendClient for DefaultBackendClient {
    fn chat_url(&self) -> String {
        self.url_or_base(self.client.chat_url())
    }

    fn history_url(&self, session_id: &str) -> String {
        self.url_or_base(self.client.history_url(session_id))
    }

    fn models_url(&self) -> String {
        self.url_or_base(self.client.models_url())
    }

    fn send_chat(
        &self,
        payload: &ChatPayload,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse<ReplyPayload>, ChatApiError> {
        block_on(self.client.send_chat(payload, Some(cancel)))?
    }

    fn fetch_history(
        &self,
        session_id: &str,
        cancel: &CancelSignal,
    ) -> Result<ApiResponse<Vec<HistoryItem>>, ChatApiError> {
        block_on(self.client.fetch_history(session_id, Some(cancel)))?
    }

    fn list_models(&self) -> Result<ApiResponse<Vec<String>>, ChatApiError> {
        block_on(self.client.list_models(None))?
    }
}

fn block_on<F>(future: F) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| {
            ChatApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
        })?;

    Ok(runtime.block_on(future))
}

/// `ChatTransport` adapter backed by `chat_api` HTTP primitives.
pub struct HttpTransport {
    base_url: String,
    model_id: String,
    client: Arc<dyn BackendClient>,
    exchanges: ExchangeLog,
}

impl HttpTransport {
    /// Creates a transport using the real HTTP client.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let base_url = config.base_url.trim().to_string();
        let model_id = config.model_id.trim().to_string();
        let client = ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?;

        Ok(Self {
            base_url,
            model_id,
            client: Arc::new(DefaultBackendClient { client }),
            exchanges: ExchangeLog::default(),
        })
    }

    fn chat_payload(&self, request: &ChatRequest) -> ChatPayload {
        let mut payload = ChatPayload::new(request.session_id.clone(), request.message.clone());
        let model = if request.model.trim().is_empty() {
            self.model_id.as_str()
        } else {
            request.model.trim()
        };
        payload.model = (!model.is_empty()).then(|| model.to_string());
        payload.system_prompt = request.system_prompt.clone();
        payload.history = request
            .history
            .iter()
            .map(|turn| TurnPayload {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect();
        payload.temperature = Some(request.temperature);
        payload.top_p = Some(request.top_p);
        payload.auto_summary = request.auto_summary;
        payload
    }

    fn record_failure(&self, entry: ExchangeEntry, error: &ChatApiError) {
        let status = error.status().map(|status| status.as_u16());
        self.exchanges
            .record(entry.with_response(status, error.to_string()));
    }

    #[cfg(test)]
    fn with_client_for_tests(model_id: &str, client: Arc<dyn BackendClient>) -> Self {
        Self {
            base_url: "http://backend.test".to_string(),
            model_id: model_id.to_string(),
            client,
            exchanges: ExchangeLog::default(),
        }
    }
}

impl ChatTransport for HttpTransport {
    fn profile(&self) -> TransportProfile {
        TransportProfile {
            transport_id: HTTP_TRANSPORT_ID.to_string(),
            model_id: self.model_id.clone(),
            endpoint: Some(self.base_url.clone()),
        }
    }

    fn send_message(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
    ) -> Result<ChatReply, TransportError> {
        let payload = self.chat_payload(request);
        let mut entry = ExchangeEntry::new("POST", self.client.chat_url());
        if let Ok(body) = serde_json::to_value(&payload) {
            entry = entry.with_request_body(body);
        }

        tracing::debug!(
            session_id = %request.session_id,
            history = request.history.len(),
            "sending chat request"
        );

        match self.client.send_chat(&payload, cancel) {
            Ok(response) => {
                let usage = response.value.usage.and_then(parse_usage);
                self.exchanges.record(
                    entry
                        .with_response(Some(response.status), response.body)
                        .with_tokens(usage.clone()),
                );
                Ok(ChatReply {
                    reply: response.value.reply,
                    usage,
                })
            }
            Err(ChatApiError::Cancelled) => {
                self.exchanges
                    .record(entry.with_response(None, "cancelled"));
                Err(TransportError::Cancelled)
            }
            Err(error) => {
                tracing::warn!(error = %error, "chat request failed");
                self.record_failure(entry, &error);
                Err(TransportError::Failed(error.to_string()))
            }
        }
    }

    fn fetch_history(
        &self,
        session_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<HistoryRecord>, TransportError> {
        let entry = ExchangeEntry::new("GET", self.client.history_url(session_id));

        match self.client.fetch_history(session_id, cancel) {
            Ok(response) => {
                self.exchanges
                    .record(entry.with_response(Some(response.status), response.body));
                Ok(response
                    .value
                    .into_iter()
                    .filter_map(history_record)
                    .collect())
            }
            Err(ChatApiError::Cancelled) => Err(TransportError::Cancelled),
            Err(error) => {
                self.record_failure(entry, &error);
                Err(TransportError::Failed(error.to_string()))
            }
        }
    }

    fn list_models(&self) -> Result<Vec<String>, TransportError> {
        let entry = ExchangeEntry::new("GET", self.client.models_url());

        match self.client.list_models() {
            Ok(response) => {
                self.exchanges
                    .record(entry.with_response(Some(response.status), response.body));
                Ok(response.value)
            }
            Err(error) => {
                self.record_failure(entry, &error);
                Err(TransportError::Failed(error.to_string()))
            }
        }
    }

    fn exchanges(&self) -> Vec<ExchangeEntry> {
        self.exchanges.entries()
    }

    fn clear_exchanges(&self) {
        self.exchanges.clear();
    }
}

fn parse_usage(value: Value) -> Option<TokenUsage> {
    match serde_json::from_value::<TokenUsage>(value) {
        Ok(usage) => Some(usage),
        Err(error) => {
            tracing::warn!(error = %error, "ignoring malformed usage record");
            None
        }
    }
}

fn history_record(item: HistoryItem) -> Option<HistoryRecord> {
    let role = match item.role.trim() {
        "user" => ChatRole::User,
        "assistant" => ChatRole::Assistant,
        "system" => ChatRole::System,
        other => {
            tracing::warn!(id = %item.id, role = other, "skipping history record with unknown role");
            return None;
        }
    };
    Some(HistoryRecord::new(item.id, role, item.content))
}

fn map_init_error(error: ChatApiError) -> TransportError {
    TransportError::Failed(format!("Failed to initialize http transport: {error}"))
}
