//! HTTP client primitives for the chat completion backend.
//!
//! Owns endpoint construction, headers, payload shapes, and error mapping for
//! `/chat`, `/history`, and `/models`. No tree or session logic lives here.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod url;

pub use client::{ApiResponse, CancellationSignal, ChatApiClient};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use payload::{ChatPayload, HistoryItem, ModelItem, ModelsPayload, ReplyPayload, TurnPayload};
pub use self::url::{endpoint_url, normalize_base_url};
