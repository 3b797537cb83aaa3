//! Configuration management
//!
//! Settings are resolved in the following order:
//! 1. Environment variables
//! 2. `wb-bridge.toml` configuration file
//! 3. Defaults
//!
//! `${VAR_NAME}` placeholders inside the config file are expanded from the
//! environment before parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Port for the webhook server
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

/// Chatwoot (inbox platform) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatwootConfig {
    /// Base URL of the Chatwoot installation
    pub url: String,

    /// API access token
    pub api_key: String,

    /// Account id the inbox belongs to
    #[serde(default = "default_account_id")]
    pub account_id: String,

    /// Target inbox id; every synced conversation is assigned here
    pub inbox_id: String,
}

/// WuzAPI (WhatsApp gateway) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WuzapiConfig {
    /// Base URL of the WuzAPI instance
    pub url: String,

    /// User-scoped API token (profile lookups)
    pub user_token: String,

    /// Instance token: shared secret carried by inbound webhooks and
    /// required on send endpoints. One token = one inbox.
    pub instance_token: String,
}

/// Conversation cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL; the in-memory fallback is used when unreachable
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// TTL in seconds for cached phone -> conversation links
    #[serde(default = "default_conversation_ttl")]
    pub conversation_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            conversation_ttl_secs: default_conversation_ttl(),
        }
    }
}

/// Main configuration for wb-bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Chatwoot settings
    pub chatwoot: ChatwootConfig,

    /// WuzAPI settings
    pub wuzapi: WuzapiConfig,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_account_id() -> String {
    "1".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_conversation_ttl() -> u64 {
    3600
}

impl Config {
    /// Expand `${VAR_NAME}` placeholders from the environment.
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '}' {
                        chars.next();
                        break;
                    }
                    var_name.push(c);
                    chars.next();
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply env overrides.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let toml_content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to read config file: {}", e)))?;

        let expanded = Self::expand_env_vars(&toml_content);

        let mut config: Config = toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("failed to parse TOML: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Tries `./wb-bridge.toml` first, then falls back to pure env vars.
    pub fn load() -> crate::Result<Self> {
        if Path::new("wb-bridge.toml").exists() {
            return Self::from_toml_file("wb-bridge.toml");
        }

        Self::from_env()
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config {
            server: ServerConfig::default(),
            chatwoot: ChatwootConfig {
                url: String::new(),
                api_key: String::new(),
                account_id: default_account_id(),
                inbox_id: String::new(),
            },
            wuzapi: WuzapiConfig {
                url: String::new(),
                user_token: String::new(),
                instance_token: String::new(),
            },
            cache: CacheConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Overwrite settings from environment variables (env wins over file).
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("CHATWOOT_URL") {
            self.chatwoot.url = url;
        }
        if let Ok(key) = std::env::var("CHATWOOT_API_KEY") {
            self.chatwoot.api_key = key;
        }
        if let Ok(account) = std::env::var("CHATWOOT_ACCOUNT_ID") {
            self.chatwoot.account_id = account;
        }
        if let Ok(inbox) = std::env::var("CHATWOOT_INBOX_ID") {
            self.chatwoot.inbox_id = inbox;
        }

        if let Ok(url) = std::env::var("WUZAPI_URL") {
            self.wuzapi.url = url;
        }
        if let Ok(token) = std::env::var("WUZAPI_USER_TOKEN") {
            self.wuzapi.user_token = token;
        }
        if let Ok(token) = std::env::var("WUZAPI_INSTANCE_TOKEN") {
            self.wuzapi.instance_token = token;
        }

        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.redis_url = url;
        }
        if let Ok(ttl) = std::env::var("CONVERSATION_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.cache.conversation_ttl_secs = t;
            }
        }
    }

    /// Reject configurations missing required upstream credentials.
    fn validate(&self) -> crate::Result<()> {
        let mut missing = Vec::new();

        if self.chatwoot.url.is_empty() {
            missing.push("CHATWOOT_URL");
        }
        if self.chatwoot.api_key.is_empty() {
            missing.push("CHATWOOT_API_KEY");
        }
        if self.chatwoot.inbox_id.is_empty() {
            missing.push("CHATWOOT_INBOX_ID");
        }
        if self.wuzapi.url.is_empty() {
            missing.push("WUZAPI_URL");
        }
        if self.wuzapi.user_token.is_empty() {
            missing.push("WUZAPI_USER_TOKEN");
        }
        if self.wuzapi.instance_token.is_empty() {
            missing.push("WUZAPI_INSTANCE_TOKEN");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing settings: {}", missing.join(", "))))
        }
    }
}
