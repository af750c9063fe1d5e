use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::headers::{build_headers, AuthStyle};
use crate::payload::{ChatPayload, HistoryItem, ModelsPayload, ReplyPayload};
use crate::url::{endpoint_url, normalize_base_url, CHAT_PATH, HISTORY_PATH, MODELS_PATH};

/// Optional cancellation signal shared with the caller.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A decoded successful response together with what was on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: String,
    pub value: T,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        normalize_base_url(&config.base_url)?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn chat_url(&self) -> Result<String, ChatApiError> {
        endpoint_url(&self.config.base_url, CHAT_PATH, &[])
    }

    pub fn history_url(&self, session_id: &str) -> Result<String, ChatApiError> {
        endpoint_url(
            &self.config.base_url,
            HISTORY_PATH,
            &[("session_id", session_id)],
        )
    }

    pub fn models_url(&self) -> Result<String, ChatApiError> {
        endpoint_url(&self.config.base_url, MODELS_PATH, &[])
    }

    pub fn build_headers(&self, auth: AuthStyle) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, auth)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_chat_request(&self, payload: &ChatPayload) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .http
            .post(self.chat_url()?)
            .headers(self.build_headers(AuthStyle::AccessToken)?)
            .json(payload))
    }

    pub fn build_history_request(&self, session_id: &str) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .http
            .get(self.history_url(session_id)?)
            .headers(self.build_headers(AuthStyle::AccessToken)?))
    }

    pub fn build_models_request(&self) -> Result<RequestBuilder, ChatApiError> {
        Ok(self
            .http
            .get(self.models_url()?)
            .headers(self.build_headers(AuthStyle::Bearer)?))
    }

    /// `POST /chat`: asks the backend for one reply.
    pub async fn send_chat(
        &self,
        payload: &ChatPayload,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ApiResponse<ReplyPayload>, ChatApiError> {
        let request = self.build_chat_request(payload)?;
        self.execute_json(request, cancellation).await
    }

    /// `GET /history?session_id=..`: the stored linear conversation.
    pub async fn fetch_history(
        &self,
        session_id: &str,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ApiResponse<Vec<HistoryItem>>, ChatApiError> {
        let request = self.build_history_request(session_id)?;
        self.execute_json(request, cancellation).await
    }

    /// `GET /models`: available model ids, sorted.
    pub async fn list_models(
        &self,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ApiResponse<Vec<String>>, ChatApiError> {
        let request = self.build_models_request()?;
        let response: ApiResponse<ModelsPayload> = self.execute_json(request, cancellation).await?;

        let mut models: Vec<String> = response
            .value
            .data
            .into_iter()
            .map(|model| model.id)
            .collect();
        models.sort();

        Ok(ApiResponse {
            status: response.status,
            body: response.body,
            value: models,
        })
    }

    async fn execute_json<T>(
        &self,
        request: RequestBuilder,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ApiResponse<T>, ChatApiError>
    where
        T: DeserializeOwned,
    {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        let response = await_or_cancel(request.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;
        let status = response.status();
        let url = response.url().to_string();
        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;

        tracing::debug!(%url, status = status.as_u16(), bytes = body.len(), "backend response");

        if !status.is_success() {
            return Err(ChatApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        let value = serde_json::from_str::<T>(&body)?;
        Ok(ApiResponse {
            status: status.as_u16(),
            body,
            value,
        })
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_or_cancel_passes_output_through_without_signal() {
        let output = await_or_cancel(async { 7 }, None).await.expect("no cancel");
        assert_eq!(output, 7);
    }

    #[tokio::test]
    async fn await_or_cancel_stops_pending_future_once_flag_is_raised() {
        let cancel = Arc::new(AtomicBool::new(false));
        let raiser = {
            let cancel = Arc::clone(&cancel);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                cancel.store(true, Ordering::Release);
            })
        };

        let result = await_or_cancel(std::future::pending::<()>(), Some(&cancel)).await;

        assert!(matches!(result, Err(ChatApiError::Cancelled)));
        raiser.await.expect("raiser task should finish");
    }

    #[test]
    fn new_rejects_invalid_base_url() {
        let error = ChatApiClient::new(ChatApiConfig::new("ftp://example.com", "tok"))
            .expect_err("ftp base must be rejected");
        assert!(matches!(error, ChatApiError::InvalidBaseUrl(_)));
    }
}
