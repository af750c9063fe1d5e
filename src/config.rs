//! Session configuration: defaults, optional JSON file, then environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_ENV_VAR: &str = "BRANCH_CHAT_CONFIG_PATH";
pub const BASE_URL_ENV_VAR: &str = "BRANCH_CHAT_BASE_URL";
pub const ACCESS_TOKEN_ENV_VAR: &str = "BRANCH_CHAT_ACCESS_TOKEN";
pub const MODEL_ENV_VAR: &str = "BRANCH_CHAT_MODEL";
pub const SESSION_ID_ENV_VAR: &str = "BRANCH_CHAT_SESSION_ID";
pub const SYSTEM_PROMPT_ENV_VAR: &str = "BRANCH_CHAT_SYSTEM_PROMPT";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_SESSION_ID: &str = "default_user";
pub const DEFAULT_CONTEXT_LIMIT: usize = 40;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Options recognized by the session and the HTTP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    pub base_url: String,
    pub access_token: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Maximum number of earlier turns sent along with each message.
    pub context_limit: usize,
    pub enable_auto_summary: bool,
    pub session_id: String,
    pub timeout_sec: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            top_p: 1.0,
            context_limit: DEFAULT_CONTEXT_LIMIT,
            enable_auto_summary: false,
            session_id: DEFAULT_SESSION_ID.to_string(),
            timeout_sec: None,
        }
    }
}

impl ChatConfig {
    /// Loads the file named by `BRANCH_CHAT_CONFIG_PATH` (if any), applies
    /// environment overrides, and validates the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env_string_opt(CONFIG_PATH_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(path.trim()))?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_string_opt(BASE_URL_ENV_VAR) {
            self.base_url = value.trim().to_string();
        }
        if let Some(value) = env_string_opt(ACCESS_TOKEN_ENV_VAR) {
            self.access_token = value.trim().to_string();
        }
        if let Some(value) = env_string_opt(MODEL_ENV_VAR) {
            self.model = value.trim().to_string();
        }
        if let Some(value) = env_string_opt(SESSION_ID_ENV_VAR) {
            self.session_id = value.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "top_p must be within (0, 1], got {}",
                self.top_p
            )));
        }
        if self.context_limit == 0 {
            return Err(ConfigError::Invalid(
                "context_limit must be greater than 0".to_string(),
            ));
        }
        if self.timeout_sec == Some(0) {
            return Err(ConfigError::Invalid(
                "timeout_sec must be greater than 0 when provided".to_string(),
            ));
        }
        if self.session_id.trim().is_empty() {
            return Err(ConfigError::Invalid("session_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// System prompt sent with every request, if configured.
pub fn system_prompt_from_env() -> Option<String> {
    sanitize_system_prompt(env::var(SYSTEM_PROMPT_ENV_VAR).ok())
}

pub(crate) fn sanitize_system_prompt(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, OnceLock};

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        [
            CONFIG_PATH_ENV_VAR,
            BASE_URL_ENV_VAR,
            ACCESS_TOKEN_ENV_VAR,
            MODEL_ENV_VAR,
            SESSION_ID_ENV_VAR,
        ]
        .into_iter()
        .map(|key| set_env_guard(key, None))
        .collect()
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp config file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = ChatConfig::from_env().expect("defaults are valid");

        assert_eq!(config, ChatConfig::default());
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.context_limit, 40);
        assert_eq!(config.session_id, "default_user");
        assert!(!config.enable_auto_summary);
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let _lock = env_lock();
        let _guards = clear_all();
        let file = write_config(
            r#"{"base_url": "https://chat.example", "model": "from-file", "context_limit": 6, "timeout_sec": 30}"#,
        );
        let path = file.path().to_string_lossy().into_owned();
        let _g1 = set_env_guard(CONFIG_PATH_ENV_VAR, Some(&path));
        let _g2 = set_env_guard(MODEL_ENV_VAR, Some("  from-env  "));
        let _g3 = set_env_guard(ACCESS_TOKEN_ENV_VAR, Some("tok"));

        let config = ChatConfig::from_env().expect("config should load");

        assert_eq!(config.base_url, "https://chat.example");
        assert_eq!(config.model, "from-env");
        assert_eq!(config.access_token, "tok");
        assert_eq!(config.context_limit, 6);
        assert_eq!(config.timeout_sec, Some(30));
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config(r#"{"model": "m", "colour": "blue"}"#);

        let error = ChatConfig::from_file(file.path()).expect_err("unknown field must fail");

        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains("colour"));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = ChatConfig::from_file(Path::new("/definitely/not/here.json"))
            .expect_err("missing file must fail");
        assert!(error.to_string().contains("/definitely/not/here.json"));
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let cases = [
            ChatConfig {
                temperature: 2.5,
                ..ChatConfig::default()
            },
            ChatConfig {
                top_p: 0.0,
                ..ChatConfig::default()
            },
            ChatConfig {
                context_limit: 0,
                ..ChatConfig::default()
            },
            ChatConfig {
                timeout_sec: Some(0),
                ..ChatConfig::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "expected invalid: {config:?}"
            );
        }
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(MODEL_ENV_VAR, Some("   "));

        let config = ChatConfig::from_env().expect("config should load");
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn system_prompt_is_trimmed_and_blank_means_none() {
        assert_eq!(sanitize_system_prompt(None), None);
        assert_eq!(sanitize_system_prompt(Some("  \n ".to_string())), None);
        assert_eq!(
            sanitize_system_prompt(Some("  be brief ".to_string())),
            Some("be brief".to_string())
        );
    }
}
