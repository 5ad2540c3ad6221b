use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub fireflies: FirefliesConfig,
    pub gemini: GeminiConfig,
    pub monday: MondayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskforge.db")
}

/// Transcript source (Fireflies) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirefliesConfig {
    /// One or more API keys, rotated when a key hits its rate limit.
    pub api_keys: Vec<String>,
    #[serde(default = "default_fireflies_url")]
    pub base_url: String,
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u32,
    /// TTL for the comprehensive transcript cache.
    #[serde(default = "default_transcript_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_fireflies_url() -> String {
    "https://api.fireflies.ai/graphql".to_string()
}

fn default_transcript_ttl() -> u64 {
    4 * 3600
}

fn default_page_size() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    10
}

/// LLM (Gemini) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    pub api_keys: Vec<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    #[serde(default = "default_long_timeout")]
    pub timeout_secs: u32,
    /// TTL for cached extraction responses, keyed by prompt hash.
    #[serde(default = "default_prompt_ttl")]
    pub prompt_cache_ttl_secs: u64,
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_prompt_ttl() -> u64 {
    1800
}

/// Work item sink (Monday) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MondayConfig {
    pub api_token: String,
    pub board_id: i64,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default = "default_monday_url")]
    pub base_url: String,
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u32,
    /// Pause between consecutive deliveries in a batch.
    #[serde(default = "default_delivery_delay")]
    pub delivery_delay_ms: u64,
}

fn default_monday_url() -> String {
    "https://api.monday.com/v2".to_string()
}

fn default_delivery_delay() -> u64 {
    2000
}

fn default_short_timeout() -> u32 {
    30
}

fn default_long_timeout() -> u32 {
    60
}

/// Pipeline run limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Hard cap on work items created in a single run.
    #[serde(default = "default_max_items")]
    pub max_items_per_run: u32,
    /// Deliver approved tasks without waiting for an explicit trigger.
    #[serde(default)]
    pub auto_deliver: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_items_per_run: default_max_items(),
            auto_deliver: false,
        }
    }
}

fn default_max_items() -> u32 {
    5
}

/// Shared breaker and key pool tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_timeout")]
    pub breaker_timeout_secs: u64,
    #[serde(default = "default_success_threshold")]
    pub breaker_success_threshold: u32,
    /// Minimum spacing between key acquisitions per pool.
    #[serde(default = "default_min_interval")]
    pub key_min_interval_secs: u64,
    /// Default cooldown for a rate-limited key.
    #[serde(default = "default_cooldown")]
    pub key_cooldown_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: default_failure_threshold(),
            breaker_timeout_secs: default_breaker_timeout(),
            breaker_success_threshold: default_success_threshold(),
            key_min_interval_secs: default_min_interval(),
            key_cooldown_secs: default_cooldown(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_timeout() -> u64 {
    60
}

fn default_success_threshold() -> u32 {
    3
}

fn default_min_interval() -> u64 {
    3
}

fn default_cooldown() -> u64 {
    300
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fireflies: SanitizedApiConfig,
    pub gemini: SanitizedApiConfig,
    pub monday: SanitizedMondayConfig,
    pub pipeline: PipelineConfig,
}

/// Key-bearing API config with the keys reduced to a count
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedApiConfig {
    pub base_url: String,
    pub keys_configured: usize,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMondayConfig {
    pub base_url: String,
    pub token_configured: bool,
    pub board_id: i64,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            fireflies: SanitizedApiConfig {
                base_url: config.fireflies.base_url.clone(),
                keys_configured: config.fireflies.api_keys.len(),
                timeout_secs: config.fireflies.timeout_secs,
            },
            gemini: SanitizedApiConfig {
                base_url: config.gemini.base_url.clone(),
                keys_configured: config.gemini.api_keys.len(),
                timeout_secs: config.gemini.timeout_secs,
            },
            monday: SanitizedMondayConfig {
                base_url: config.monday.base_url.clone(),
                token_configured: !config.monday.api_token.is_empty(),
                board_id: config.monday.board_id,
                timeout_secs: config.monday.timeout_secs,
            },
            pipeline: config.pipeline.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
[fireflies]
api_keys = ["ff-key"]

[gemini]
api_keys = ["gm-key"]

[monday]
api_token = "mn-token"
board_id = 12345
"#
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.fireflies.api_keys, vec!["ff-key"]);
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert_eq!(config.monday.board_id, 12345);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path.to_str().unwrap(), "taskforge.db");
        assert_eq!(config.pipeline.max_items_per_run, 5);
        assert!(!config.pipeline.auto_deliver);
    }

    #[test]
    fn test_deserialize_missing_credentials_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_urls_and_limits() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.fireflies.base_url, "https://api.fireflies.ai/graphql");
        assert_eq!(config.fireflies.page_size, 50);
        assert_eq!(config.fireflies.max_pages, 10);
        assert_eq!(config.fireflies.cache_ttl_secs, 4 * 3600);
        assert_eq!(config.gemini.prompt_cache_ttl_secs, 1800);
        assert_eq!(config.monday.base_url, "https://api.monday.com/v2");
        assert_eq!(config.resilience.breaker_failure_threshold, 5);
        assert_eq!(config.resilience.key_cooldown_secs, 300);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let rendered = serde_json::to_string(&sanitized).unwrap();
        assert!(!rendered.contains("ff-key"));
        assert!(!rendered.contains("gm-key"));
        assert!(!rendered.contains("mn-token"));
        assert_eq!(sanitized.fireflies.keys_configured, 1);
        assert!(sanitized.monday.token_configured);
    }
}
