use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::TokenUsage;

/// Number of exchanges kept before the oldest is evicted.
pub const DEFAULT_EXCHANGE_CAPACITY: usize = 100;

/// One recorded request/response pair, for the debug log view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeEntry {
    pub id: u64,
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub request_body: Option<Value>,
    /// `None` when no HTTP response was received.
    pub response_status: Option<u16>,
    /// Raw response text, or the error text for failed calls.
    pub response_body: String,
    pub tokens: Option<TokenUsage>,
}

impl ExchangeEntry {
    /// Creates an unnumbered entry stamped with the current UTC time.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp: now_rfc3339(),
            method: method.into(),
            url: url.into(),
            request_body: None,
            response_status: None,
            response_body: String::new(),
            tokens: None,
        }
    }

    #[must_use]
    pub fn with_request_body(mut self, body: Value) -> Self {
        self.request_body = Some(body);
        self
    }

    #[must_use]
    pub fn with_response(mut self, status: Option<u16>, body: impl Into<String>) -> Self {
        self.response_status = status;
        self.response_body = body.into();
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Option<TokenUsage>) -> Self {
        self.tokens = tokens;
        self
    }
}

#[derive(Debug)]
struct LogState {
    entries: VecDeque<ExchangeEntry>,
    next_id: u64,
}

/// Bounded, thread-safe ring of recent exchanges.
#[derive(Debug)]
pub struct ExchangeLog {
    capacity: usize,
    state: Mutex<LogState>,
}

impl Default for ExchangeLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EXCHANGE_CAPACITY)
    }
}

impl ExchangeLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(LogState {
                entries: VecDeque::with_capacity(capacity),
                next_id: 1,
            }),
        }
    }

    /// Appends `entry`, assigning it the next id. Returns that id.
    pub fn record(&self, mut entry: ExchangeEntry) -> u64 {
        let mut state = lock_unpoisoned(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        entry.id = id;

        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(entry);
        id
    }

    #[must_use]
    pub fn entries(&self) -> Vec<ExchangeEntry> {
        lock_unpoisoned(&self.state).entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.state).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.state).entries.clear();
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
