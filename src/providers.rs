use std::sync::Arc;
use std::time::Duration;

use chat_transport::ChatTransport;
use chat_transport_http::{HttpTransport, HttpTransportConfig, HTTP_TRANSPORT_ID};
use chat_transport_mock::{MockTransport, MOCK_TRANSPORT_ID};

use crate::config::{env_string_opt, ChatConfig};

pub const DEFAULT_PROVIDER_ID: &str = MOCK_TRANSPORT_ID;
pub const PROVIDER_ENV_VAR: &str = "BRANCH_CHAT_PROVIDER";

pub fn transport_from_env(config: &ChatConfig) -> Result<Arc<dyn ChatTransport>, String> {
    let provider_id = env_string_opt(PROVIDER_ENV_VAR).map(|value| value.trim().to_string());

    transport_for_id(
        provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID),
        config,
    )
}

pub fn transport_for_id(
    provider_id: &str,
    config: &ChatConfig,
) -> Result<Arc<dyn ChatTransport>, String> {
    match provider_id {
        MOCK_TRANSPORT_ID => Ok(Arc::new(MockTransport::default())),
        HTTP_TRANSPORT_ID => {
            if config.access_token.trim().is_empty() {
                return Err(
                    "The http provider requires an access token (BRANCH_CHAT_ACCESS_TOKEN)"
                        .to_string(),
                );
            }

            let mut http_config =
                HttpTransportConfig::new(config.base_url.clone(), config.access_token.clone())
                    .with_model(config.model.clone());
            if let Some(timeout_sec) = config.timeout_sec {
                http_config = http_config.with_timeout(Duration::from_secs(timeout_sec));
            }

            let transport = HttpTransport::new(http_config).map_err(|error| error.to_string())?;
            Ok(Arc::new(transport))
        }
        unknown => Err(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_TRANSPORT_ID}, {HTTP_TRANSPORT_ID}"
        )),
    }
}
