use ::url::Url;

use crate::error::ChatApiError;

pub const CHAT_PATH: &str = "chat";
pub const HISTORY_PATH: &str = "history";
pub const MODELS_PATH: &str = "models";

/// Validates a backend base URL and strips trailing slashes.
///
/// Only absolute `http`/`https` URLs are accepted.
pub fn normalize_base_url(input: &str) -> Result<String, ChatApiError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ChatApiError::InvalidBaseUrl(
            "base URL is empty".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{trimmed}: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ChatApiError::InvalidBaseUrl(format!(
            "{trimmed}: unsupported scheme {}",
            parsed.scheme()
        )));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ChatApiError::InvalidBaseUrl(format!(
            "{trimmed}: query and fragment are not allowed"
        )));
    }

    Ok(trimmed.to_string())
}

/// Joins `path` onto the normalized base URL and appends `query` pairs.
pub fn endpoint_url(base: &str, path: &str, query: &[(&str, &str)]) -> Result<String, ChatApiError> {
    let base = normalize_base_url(base)?;
    let mut url = Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))
        .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{base}: {error}")))?;

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter().copied());
    }

    Ok(url.to_string())
}
