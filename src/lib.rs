//! Branching chat client: session controller, runtime worker, and CLI support.
//!
//! The conversation is a [`message_tree::MessageTree`]; edits and
//! regenerations fork new branches instead of overwriting, and the visible
//! transcript is the ancestry path of the current leaf.
//!
//! ## Transport bootstrap
//!
//! - `BRANCH_CHAT_PROVIDER=mock` (default) answers from a deterministic script
//! - `BRANCH_CHAT_PROVIDER=http` talks to a backend exposing `/chat`,
//!   `/history`, and `/models`
//!
//! Configuration is read from the optional JSON file named by
//! `BRANCH_CHAT_CONFIG_PATH`:
//!
//! ```json
//! {
//!   "base_url": "http://localhost:8000",
//!   "access_token": "<token>",
//!   "model": "gpt-4o",
//!   "temperature": 0.7,
//!   "top_p": 1.0,
//!   "context_limit": 40,
//!   "enable_auto_summary": false,
//!   "session_id": "default_user",
//!   "timeout_sec": 60
//! }
//! ```
//!
//! Every field is optional and unknown fields are rejected. `BRANCH_CHAT_BASE_URL`,
//! `BRANCH_CHAT_ACCESS_TOKEN`, `BRANCH_CHAT_MODEL`, and `BRANCH_CHAT_SESSION_ID`
//! override the file. `BRANCH_CHAT_SYSTEM_PROMPT` sets the system prompt.
//!
//! Logs go through `tracing`; `RUST_LOG` filters them and
//! `BRANCH_CHAT_LOG_FILE` redirects them from stderr to a file.

pub mod commands;
pub mod config;
pub mod logging;
pub mod providers;
pub mod render;
pub mod runtime;
pub mod session;
#[cfg(unix)]
pub mod signals;
