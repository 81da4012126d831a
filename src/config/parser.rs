use super::ConfigError;
use crate::parsers::ArabicMode;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token of the control bot: sends relayed text and serves the command menu.
    pub bot_token: SecretString,
    /// Telegram user ids allowed to drive the command menu.
    #[serde(default)]
    pub owner_ids: Vec<i64>,
    #[serde(default = "default_command_poll_timeout")]
    pub command_poll_timeout_secs: u64,
    /// Skip publishing the command list through `setMyCommands`.
    #[serde(default)]
    pub disable_command_menu: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            default_database_url()
        }
    }

    pub fn sqlite_path(&self) -> String {
        let url = self.connection_string();
        url.strip_prefix("sqlite://").unwrap_or(&url).to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub arabic_mode: ArabicMode,
    /// Removed like the built-in `code` stopword.
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            arabic_mode: ArabicMode::default(),
            extra_stopwords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    #[serde(default = "default_source_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Owner whose listener is started when the process boots.
    #[serde(default)]
    pub autostart_owner: Option<i64>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout(),
            poll_timeout_secs: default_source_poll_timeout(),
            autostart_owner: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub shared_secret: Option<SecretString>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_port(),
            shared_secret: None,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::var("CONFIG_PATH")
                .unwrap_or_else(|_| "config.yaml".to_string())
                .into(),
        };

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.auth.bot_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }

        if self.database.sqlite_path().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database path cannot be empty".to_string(),
            ));
        }

        if self.listener.stop_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "listener.stop_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.provisioning.enabled && self.provisioning.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "provisioning.port must be between 1 and 65535".to_string(),
            ));
        }

        if self
            .filter
            .extra_stopwords
            .iter()
            .any(|word| word.trim().is_empty())
        {
            return Err(ConfigError::InvalidConfig(
                "filter.extra_stopwords cannot contain empty words".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TG_RELAY_BOT_TOKEN") {
            self.auth.bot_token = SecretString::from(value);
        }
        if let Ok(value) = std::env::var("TG_RELAY_DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Ok(value) = std::env::var("TG_RELAY_PROVISIONING_SECRET") {
            self.provisioning.shared_secret = Some(SecretString::from(value));
        }
    }
}

fn default_command_poll_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_database_url() -> String {
    "sqlite://relay.db".to_string()
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_source_poll_timeout() -> u64 {
    25
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9010
}
