use anyhow::{Context, Result};
use std::time::Duration;

use crate::error::ApiError;
use crate::realtime::poller::DEFAULT_POLL_INTERVAL;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// Time between context broadcasts
    pub mcp_poll_interval: Duration,
    /// Time between Google sync cycles; `None` disables the background sync
    pub sync_poll_interval: Option<Duration>,
    pub sync_max_messages: u32,
    pub google: Option<GoogleConfig>,
    pub oauth_redirect_uri: String,
    pub frontend_redirect_url: String,
    pub openai: Option<OpenAiConfig>,
    pub cors_allowed_origins: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_secs = |key: &str, default: u64| -> Result<u64> {
            match var(key) {
                Some(value) => value
                    .parse()
                    .with_context(|| format!("{} must be a valid number", key)),
                None => Ok(default),
            }
        };

        let sync_secs = parse_secs("SYNC_POLL_INTERVAL_SECS", 300)?;
        let mcp_secs = parse_secs(
            "MCP_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL.as_secs(),
        )?;
        if mcp_secs == 0 {
            anyhow::bail!("MCP_POLL_INTERVAL_SECS must be greater than zero");
        }

        let sync_max_messages: u32 = match var("SYNC_MAX_MESSAGES") {
            Some(value) => value
                .parse()
                .context("SYNC_MAX_MESSAGES must be a valid number")?,
            None => 25,
        };

        let google = match (var("GOOGLE_CLIENT_ID"), var("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleConfig {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let openai = var("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            api_key,
            model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
        });

        Ok(Self {
            database_url: var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: var("PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            mcp_poll_interval: Duration::from_secs(mcp_secs),
            sync_poll_interval: (sync_secs > 0).then(|| Duration::from_secs(sync_secs)),
            sync_max_messages,
            google,
            oauth_redirect_uri: var("OAUTH_REDIRECT_URI")
                .unwrap_or_else(|| "http://localhost:8000/auth/callback".to_string()),
            frontend_redirect_url: var("FRONTEND_REDIRECT_URL")
                .unwrap_or_else(|| "http://127.0.0.1:5500/oauth.html".to_string()),
            openai,
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
        })
    }

    pub fn google(&self) -> Result<&GoogleConfig, ApiError> {
        self.google
            .as_ref()
            .ok_or_else(|| ApiError::missing_env("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET"))
    }

    pub fn openai(&self) -> Result<&OpenAiConfig, ApiError> {
        self.openai
            .as_ref()
            .ok_or_else(|| ApiError::missing_env("OPENAI_API_KEY"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_database_url_is_required() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/inbox")]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.mcp_poll_interval, Duration::from_secs(45));
        assert_eq!(config.sync_poll_interval, Some(Duration::from_secs(300)));
        assert_eq!(config.sync_max_messages, 25);
        assert!(config.google.is_none());
        assert!(config.openai.is_none());
        assert!(config.google().is_err());
    }

    #[test]
    fn test_zero_sync_interval_disables_sync() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/inbox"),
            ("SYNC_POLL_INTERVAL_SECS", "0"),
        ])
        .unwrap();
        assert!(config.sync_poll_interval.is_none());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        assert!(config_from(&[
            ("DATABASE_URL", "postgres://localhost/inbox"),
            ("PORT", "eighty"),
        ])
        .is_err());
        assert!(config_from(&[
            ("DATABASE_URL", "postgres://localhost/inbox"),
            ("MCP_POLL_INTERVAL_SECS", "0"),
        ])
        .is_err());
    }

    #[test]
    fn test_sync_max_messages_out_of_range_rejected() {
        let err = config_from(&[
            ("DATABASE_URL", "postgres://localhost/inbox"),
            ("SYNC_MAX_MESSAGES", "5000000000"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SYNC_MAX_MESSAGES"));

        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/inbox"),
            ("SYNC_MAX_MESSAGES", "100"),
        ])
        .unwrap();
        assert_eq!(config.sync_max_messages, 100);
    }

    #[test]
    fn test_optional_integrations() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/inbox"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.google().unwrap().client_id, "id");
        assert_eq!(config.openai().unwrap().model, "gpt-4o-mini");
    }
}
