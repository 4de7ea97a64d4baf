// Configuration File Support
//
// This module provides configuration file parsing for the opsdeck gateway.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/opsdeck/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Hosted backend configuration (identity, tables, storage)
    pub backend: BackendConfig,

    /// Gateway HTTP server configuration
    pub server: ServerConfig,

    /// Per-client rate limiting configuration
    pub rate_limit: RateLimitConfig,

    /// Realtime presence channel configuration
    pub realtime: RealtimeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Hosted backend configuration
///
/// The project URL and keys come from the hosting platform's dashboard.
/// The service role key bypasses row-level security and must only ever
/// live on the gateway, never in client-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Project base URL (e.g. "https://abc123.supabase.co")
    pub url: String,

    /// Publishable API key, sent as the `apikey` header
    pub anon_key: String,

    /// Service role key for privileged admin calls
    pub service_role_key: String,

    /// Avatar storage bucket name
    pub avatar_bucket: String,

    /// Request timeout in seconds for every backend call
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            service_role_key: String::new(),
            avatar_bucket: "avatars".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Gateway HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8787 }
    }
}

/// Per-client rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,

    /// Window duration in seconds
    pub window_secs: u64,

    /// Request budget per window
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 10,
        }
    }
}

/// Realtime presence channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Shared presence channel name
    pub channel: String,

    /// Presence key the channel groups clients by
    pub presence_key: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel: "room_1".to_string(),
            presence_key: "user_id".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            backend: BackendConfig::default(),
            server: ServerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default().apply_env_overrides());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/opsdeck/config.toml` on Linux/Mac
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "opsdeck", "Opsdeck") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("opsdeck")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - OPSDECK_LOG_LEVEL / OPSDECK_LOG_FORMAT
    /// - OPSDECK_BACKEND_URL / OPSDECK_ANON_KEY / OPSDECK_SERVICE_ROLE_KEY
    /// - OPSDECK_PORT
    /// - OPSDECK_RATE_LIMIT_ENABLED / OPSDECK_RATE_LIMIT_MAX_REQUESTS
    /// - OPSDECK_REALTIME_CHANNEL
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("OPSDECK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("OPSDECK_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Backend overrides (keys normally arrive this way in deployment)
        if let Ok(url) = std::env::var("OPSDECK_BACKEND_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("OPSDECK_ANON_KEY") {
            self.backend.anon_key = key;
        }
        if let Ok(key) = std::env::var("OPSDECK_SERVICE_ROLE_KEY") {
            self.backend.service_role_key = key;
        }
        if let Ok(timeout) = std::env::var("OPSDECK_BACKEND_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                if timeout > 0 {
                    self.backend.timeout_secs = timeout;
                }
            }
        }

        // Server overrides
        if let Ok(port) = std::env::var("OPSDECK_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.server.port = port;
                }
            }
        }

        // Rate limit overrides
        if let Ok(enabled) = std::env::var("OPSDECK_RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = enabled.parse().unwrap_or(self.rate_limit.enabled);
        }
        if let Ok(max) = std::env::var("OPSDECK_RATE_LIMIT_MAX_REQUESTS") {
            if let Ok(max) = max.parse::<u32>() {
                if max > 0 {
                    self.rate_limit.max_requests = max;
                }
            }
        }

        // Realtime overrides
        if let Ok(channel) = std::env::var("OPSDECK_REALTIME_CHANNEL") {
            self.realtime.channel = channel;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        // Validate backend configuration
        if self.backend.timeout_secs == 0 {
            anyhow::bail!("Backend timeout must be > 0 seconds");
        }
        if !self.backend.url.is_empty() && !self.backend.url.starts_with("http") {
            anyhow::bail!("Backend URL must be an http(s) URL: {}", self.backend.url);
        }

        // Validate rate limit configuration
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("Rate limit window must be > 0 seconds");
        }
        if self.rate_limit.max_requests == 0 {
            anyhow::bail!("Rate limit budget must be > 0 requests");
        }

        // Validate server configuration
        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        // Validate realtime configuration
        if self.realtime.channel.is_empty() {
            anyhow::bail!("Realtime channel name must not be empty");
        }

        Ok(())
    }

    /// Validate the parts only `serve` needs: backend URL and keys must be set.
    pub fn validate_for_serve(&self) -> Result<()> {
        self.validate()?;
        if self.backend.url.is_empty() {
            anyhow::bail!("Backend URL is required to serve (set OPSDECK_BACKEND_URL)");
        }
        if self.backend.service_role_key.is_empty() {
            anyhow::bail!("Service role key is required to serve (set OPSDECK_SERVICE_ROLE_KEY)");
        }
        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
