//! Deterministic in-process implementation of the `chat_transport` contract.
//!
//! No network access. Used for local runs without a backend and for
//! controller/runtime tests.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chat_transport::{
    CancelSignal, ChatReply, ChatRequest, ChatTransport, ExchangeEntry, ExchangeLog,
    HistoryRecord, TokenUsage, TransportError, TransportProfile,
};
use serde_json::json;

/// Stable transport identifier used for explicit startup selection.
pub const MOCK_TRANSPORT_ID: &str = "mock";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct ReplyState {
    next_reply: usize,
    failures: Vec<String>,
}

/// Mock transport that answers from a fixed script.
#[derive(Debug)]
pub struct MockTransport {
    replies: Vec<String>,
    history: Vec<HistoryRecord>,
    model_ids: Vec<String>,
    delay: Duration,
    state: Mutex<ReplyState>,
    exchanges: ExchangeLog,
}

impl MockTransport {
    /// Creates a transport that cycles through `replies`.
    ///
    /// An empty script echoes each message back.
    #[must_use]
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            history: Vec::new(),
            model_ids: vec!["mock".to_string(), "mock-alt".to_string()],
            delay: Duration::from_millis(Self::REPLY_DELAY_MS),
            state: Mutex::new(ReplyState {
                next_reply: 0,
                failures: Vec::new(),
            }),
            exchanges: ExchangeLog::default(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryRecord>) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_models(mut self, model_ids: Vec<String>) -> Self {
        self.model_ids = model_ids;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next `send_message` call fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        lock_unpoisoned(&self.state).failures.push(message.into());
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let mut state = lock_unpoisoned(&self.state);
        if !state.failures.is_empty() {
            let message = state.failures.remove(0);
            return Err(TransportError::Failed(message));
        }

        if self.replies.is_empty() {
            return Ok(format!("Echo: {}", request.message));
        }

        let reply = self.replies[state.next_reply % self.replies.len()].clone();
        state.next_reply += 1;
        Ok(reply)
    }

    /// Sleeps for the configured delay, returning early once cancelled.
    fn wait(&self, cancel: &CancelSignal) -> Result<(), TransportError> {
        let deadline = Instant::now() + self.delay;
        loop {
            if cancel.load(Ordering::Acquire) {
                return Err(TransportError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
        }
    }

    const REPLY_DELAY_MS: u64 = 200;
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new(vec![
            "Here is a short answer.\n\n- It is deterministic.\n- It never leaves the process."
                .to_string(),
            "Another take:\n\n```rust\nfn main() {\n    println!(\"hello\");\n}\n```".to_string(),
        ])
    }
}

impl ChatTransport for MockTransport {
    fn profile(&self) -> TransportProfile {
        TransportProfile {
            transport_id: MOCK_TRANSPORT_ID.to_string(),
            model_id: self
                .model_ids
                .first()
                .cloned()
                .unwrap_or_else(|| "mock".to_string()),
            endpoint: None,
        }
    }

    fn send_message(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
    ) -> Result<ChatReply, TransportError> {
        let entry = ExchangeEntry::new("POST", "mock://chat").with_request_body(json!({
            "session_id": request.session_id,
            "message": request.message,
            "history_len": request.history.len(),
        }));

        if let Err(error) = self.wait(cancel) {
            self.exchanges
                .record(entry.with_response(None, error.to_string()));
            return Err(error);
        }

        match self.next_reply(request) {
            Ok(reply) => {
                let usage = mock_usage(request, &reply);
                self.exchanges.record(
                    entry
                        .with_response(Some(200), json!({ "reply": reply }).to_string())
                        .with_tokens(Some(usage.clone())),
                );
                Ok(ChatReply {
                    reply,
                    usage: Some(usage),
                })
            }
            Err(error) => {
                self.exchanges
                    .record(entry.with_response(Some(500), error.to_string()));
                Err(error)
            }
        }
    }

    fn fetch_history(
        &self,
        session_id: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<HistoryRecord>, TransportError> {
        if cancel.load(Ordering::Acquire) {
            return Err(TransportError::Cancelled);
        }
        self.exchanges.record(
            ExchangeEntry::new("GET", format!("mock://history?session_id={session_id}"))
                .with_response(Some(200), format!("{} records", self.history.len())),
        );
        Ok(self.history.clone())
    }

    fn list_models(&self) -> Result<Vec<String>, TransportError> {
        let mut models = self.model_ids.clone();
        models.sort();
        Ok(models)
    }

    fn exchanges(&self) -> Vec<ExchangeEntry> {
        self.exchanges.entries()
    }

    fn clear_exchanges(&self) {
        self.exchanges.clear();
    }
}

/// Whitespace word counts stand in for tokens.
fn mock_usage(request: &ChatRequest, reply: &str) -> TokenUsage {
    let prompt_tokens: u64 = request
        .history
        .iter()
        .map(|turn| turn.content.as_str())
        .chain(std::iter::once(request.message.as_str()))
        .map(|text| text.split_whitespace().count() as u64)
        .sum();
    let completion_tokens = reply.split_whitespace().count() as u64;

    TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        ..TokenUsage::default()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
