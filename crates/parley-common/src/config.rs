//! Configuration for Parley

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "PARLEY_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Inbound webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Graph API client configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Statically configured channel credentials
    #[serde(default)]
    pub channels: Vec<ChannelCredentialConfig>,

    /// Broadcast campaign configuration
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Auto-response configuration
    #[serde(default)]
    pub auto_response: AutoResponseConfig,

    /// Delivery tracking configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// Accepted API key hashes (argon2 PHC strings or SHA-256 hex)
    #[serde(default)]
    pub key_hashes: Vec<String>,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
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

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Inbound webhook configuration
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// App secret used to verify `X-Hub-Signature-256`
    pub app_secret: Option<String>,

    /// Token echoed back during the subscription handshake
    pub verify_token: Option<String>,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("verify_token", &self.verify_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Graph API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// API base URL
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// API version path segment
    #[serde(default = "default_graph_api_version")]
    pub api_version: String,

    /// Request timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            api_version: default_graph_api_version(),
            timeout_secs: default_graph_timeout(),
        }
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_api_version() -> String {
    "v18.0".to_string()
}

fn default_graph_timeout() -> u64 {
    30
}

/// Credential for one channel, keyed by the provider-side id
#[derive(Clone, Serialize, Deserialize)]
pub struct ChannelCredentialConfig {
    /// Provider id of the channel (phone number id, page id, ...)
    pub platform_id: String,

    /// Bearer access token
    pub access_token: String,

    /// WhatsApp Business Account id, used for template listing
    pub business_account_id: Option<String>,
}

impl std::fmt::Debug for ChannelCredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCredentialConfig")
            .field("platform_id", &self.platform_id)
            .field("access_token", &"<redacted>")
            .field("business_account_id", &self.business_account_id)
            .finish()
    }
}

/// Broadcast campaign configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Sustained send rate (tokens per second)
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: f64,

    /// Bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// How often scheduled campaigns are checked, in seconds
    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_rate_per_second(),
            burst: default_burst(),
            scheduler_interval_secs: default_scheduler_interval(),
        }
    }
}

fn default_rate_per_second() -> f64 {
    50.0
}

fn default_burst() -> u32 {
    50
}

fn default_scheduler_interval() -> u64 {
    30
}

/// Auto-response configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResponseConfig {
    /// Send auto-responses at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reply to greetings
    #[serde(default = "default_greeting_message")]
    pub greeting_message: String,

    /// Reply to positive feedback
    #[serde(default = "default_positive_feedback_message")]
    pub positive_feedback_message: String,

    /// Reply to opt-out requests
    #[serde(default = "default_opt_out_message")]
    pub opt_out_message: String,
}

impl Default for AutoResponseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            greeting_message: default_greeting_message(),
            positive_feedback_message: default_positive_feedback_message(),
            opt_out_message: default_opt_out_message(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_greeting_message() -> String {
    "Hi there! Thanks for reaching out. How can we help you today?".to_string()
}

fn default_positive_feedback_message() -> String {
    "Thank you so much for your kind words! We're glad you're happy.".to_string()
}

fn default_opt_out_message() -> String {
    "You have been unsubscribed and will no longer receive messages from us. Reply START to opt back in."
        .to_string()
}

/// Delivery tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeliveryConfig {
    /// Ignore status callbacks that would move a message backwards
    #[serde(default)]
    pub enforce_monotonic: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            webhook: WebhookConfig::default(),
            graph: GraphConfig::default(),
            channels: Vec::new(),
            broadcast: BroadcastConfig::default(),
            auto_response: AutoResponseConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the environment and the first file found
    pub fn load() -> crate::Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let paths = [
                    PathBuf::from("./config.toml"),
                    PathBuf::from("/etc/parley/config.toml"),
                ];

                match paths.iter().find(|p| p.exists()) {
                    Some(path) => Self::from_file(path)?,
                    None => {
                        tracing::warn!("No configuration file found, using defaults");
                        Self::default()
                    }
                }
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets may be supplied through the environment instead of the file
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(secret) = std::env::var("PARLEY_WEBHOOK_APP_SECRET") {
            self.webhook.app_secret = Some(secret);
        }
        if let Ok(token) = std::env::var("PARLEY_WEBHOOK_VERIFY_TOKEN") {
            self.webhook.verify_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.graph.base_url, "https://graph.facebook.com");
        assert_eq!(config.broadcast.burst, 50);
        assert!(config.auto_response.enabled);
        assert!(!config.delivery.enforce_monotonic);
        assert!(config.webhook.app_secret.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9090

[database]
url = "postgres://localhost/parley"

[webhook]
app_secret = "s3cret"
verify_token = "verify-me"

[[channels]]
platform_id = "1098765"
access_token = "EAAB..."

[broadcast]
rate_per_second = 10.0
burst = 5

[delivery]
enforce_monotonic = true
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/parley"));
        assert_eq!(config.webhook.verify_token.as_deref(), Some("verify-me"));
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.broadcast.burst, 5);
        assert!(config.delivery.enforce_monotonic);
        assert_eq!(config.graph.api_version, "v18.0");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_toml(
            r#"
[webhook]
app_secret = "top-secret-value"

[[channels]]
platform_id = "1"
access_token = "token-value"
"#,
        )
        .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("top-secret-value"));
        assert!(!rendered.contains("token-value"));
    }
}
