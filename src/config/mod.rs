use anyhow::{Result, bail};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Relay configuration, read once at startup
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bot credential used by the simple transport
    pub bot_token: String,

    /// Destination channel identifier (e.g. "-1001234567890")
    pub channel_id: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    pub bot_api_url: String,

    /// Session client app id
    pub api_id: Option<i32>,
    /// Session client app hash
    pub api_hash: Option<String>,
    /// Pre-established session token
    pub session_string: Option<String>,
    /// Endpoint the session client talks to (default: "http://127.0.0.1:8081")
    pub session_api_url: String,

    /// Staging directory for uploads in transit (default: "/tmp/uploads")
    pub upload_dir: PathBuf,

    /// Maximum accepted payload in bytes (default: 6 GiB)
    pub max_file_size: u64,

    /// Largest payload routed through the simple transport (default: 2000 MiB)
    pub simple_transport_limit: u64,

    /// Age after which the janitor reclaims a staged file (default: 1 hour)
    pub staging_max_age: Duration,

    /// Janitor sweep interval (default: 5 minutes)
    pub janitor_interval: Duration,

    /// Janitor backoff after a failed sweep (default: 1 minute)
    pub janitor_retry_interval: Duration,

    /// Allowed CORS origins, "*" means any (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel_id: String::new(),
            bot_api_url: "https://api.telegram.org".to_string(),
            api_id: None,
            api_hash: None,
            session_string: None,
            session_api_url: "http://127.0.0.1:8081".to_string(),
            upload_dir: PathBuf::from("/tmp/uploads"),
            max_file_size: 6 * 1024 * 1024 * 1024,         // 6 GiB
            simple_transport_limit: 2000 * 1024 * 1024,    // 2000 MiB
            staging_max_age: Duration::from_secs(60 * 60), // 1 hour
            janitor_interval: Duration::from_secs(5 * 60),
            janitor_retry_interval: Duration::from_secs(60),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            bot_token: non_empty("BOT_TOKEN").unwrap_or(default.bot_token),
            channel_id: non_empty("CHANNEL_ID").unwrap_or(default.channel_id),
            bot_api_url: non_empty("BOT_API_URL").unwrap_or(default.bot_api_url),

            api_id: parsed("API_ID"),
            api_hash: non_empty("API_HASH"),
            session_string: non_empty("SESSION_STRING"),
            session_api_url: non_empty("SESSION_API_URL").unwrap_or(default.session_api_url),

            upload_dir: non_empty("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            max_file_size: parsed("MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            simple_transport_limit: parsed("SIMPLE_TRANSPORT_LIMIT")
                .unwrap_or(default.simple_transport_limit),

            staging_max_age: parsed("STAGING_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.staging_max_age),

            janitor_interval: parsed("JANITOR_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.janitor_interval),

            janitor_retry_interval: parsed("JANITOR_RETRY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.janitor_retry_interval),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .filter(|v: &Vec<String>| !v.is_empty())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Session token, only when the full credential set is present
    pub fn session_token(&self) -> Option<&str> {
        match (self.api_id, &self.api_hash, &self.session_string) {
            (Some(_), Some(_), Some(session)) => Some(session.as_str()),
            _ => None,
        }
    }

    /// Reject configurations that cannot relay anything
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            bail!("BOT_TOKEN must be set");
        }
        if self.channel_id.is_empty() {
            bail!("CHANNEL_ID must be set");
        }
        if self.simple_transport_limit > self.max_file_size {
            bail!(
                "SIMPLE_TRANSPORT_LIMIT ({}) exceeds MAX_FILE_SIZE ({})",
                self.simple_transport_limit,
                self.max_file_size
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.max_file_size, 6 * 1024 * 1024 * 1024);
        assert_eq!(config.simple_transport_limit, 2000 * 1024 * 1024);
        assert_eq!(config.staging_max_age, Duration::from_secs(3600));
        assert_eq!(config.janitor_interval, Duration::from_secs(300));
        assert_eq!(config.janitor_retry_interval, Duration::from_secs(60));
        assert!(config.session_token().is_none());
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = RelayConfig::default();
        assert!(config.validate().is_err());

        config.bot_token = "123:abc".to_string();
        assert!(config.validate().is_err());

        config.channel_id = "-100123".to_string();
        assert!(config.validate().is_ok());

        config.simple_transport_limit = config.max_file_size + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_requires_all_credentials() {
        let mut config = RelayConfig::default();
        config.api_id = Some(12345);
        config.api_hash = Some("hash".to_string());
        assert!(config.session_token().is_none());

        config.session_string = Some("session".to_string());
        assert_eq!(config.session_token(), Some("session"));
    }
}
