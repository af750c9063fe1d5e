use std::collections::BTreeMap;
use std::time::Duration;

/// Transport configuration for backend requests.
#[derive(Debug, Clone, Default)]
pub struct ChatApiConfig {
    /// Credential sent in `x-access-token` (and as a bearer token for `/models`).
    pub access_token: String,
    /// Base URL the endpoint paths are joined onto.
    pub base_url: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional whole-request timeout.
    pub timeout: Option<Duration>,
}

impl ChatApiConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }
}
