use std::collections::BTreeMap;

use crate::config::ChatApiConfig;
use crate::error::ChatApiError;

pub const HEADER_ACCESS_TOKEN: &str = "x-access-token";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "user-agent";

const DEFAULT_USER_AGENT: &str = concat!("branch-chat/", env!("CARGO_PKG_VERSION"));

/// How the credential is presented to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `x-access-token: <token>`, used by `/chat` and `/history`.
    AccessToken,
    /// `authorization: Bearer <token>`, used by the OpenAI-style `/models`.
    Bearer,
}

/// Build a deterministic header map for backend requests.
pub fn build_headers(
    config: &ChatApiConfig,
    auth: AuthStyle,
) -> Result<BTreeMap<String, String>, ChatApiError> {
    let token = config.access_token.trim();
    if token.is_empty() {
        return Err(ChatApiError::MissingAccessToken);
    }

    let mut headers = BTreeMap::new();
    match auth {
        AuthStyle::AccessToken => {
            headers.insert(HEADER_ACCESS_TOKEN.to_owned(), token.to_owned());
        }
        AuthStyle::Bearer => {
            headers.insert(HEADER_AUTHORIZATION.to_owned(), format!("Bearer {token}"));
        }
    }
    headers.insert(HEADER_ACCEPT.to_owned(), "application/json".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    let user_agent = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_USER_AGENT);
    headers.insert(HEADER_USER_AGENT.to_owned(), user_agent.to_owned());

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}
