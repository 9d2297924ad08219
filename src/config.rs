//! Configuration management for the presign gateway
//!
//! Loads configuration from config files and environment variables.
//! Environment variables override file values.

use crate::middleware::{
    AuthOptions, CorsOptions, LoggingOptions, RateLimitOptions, Role, SignatureVerificationOptions,
};
use crate::signing::{SigningAlgorithm, SigningConfig};
use axum::http::Method;
use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Request signing
    pub signing: SigningSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub cors: CorsSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub timeout: TimeoutSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest request body buffered for verification
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    1024 * 1024
}

/// Request signing configuration
#[derive(Debug, Deserialize)]
pub struct SigningSettings {
    /// Shared HMAC secret (set via GATEWAY_SIGNING__SECRET)
    pub secret: SecretString,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_timestamp_tolerance")]
    pub timestamp_tolerance_ms: u64,
    #[serde(default)]
    pub require_nonce: bool,
    #[serde(default = "default_nonce_ttl")]
    pub nonce_ttl_ms: u64,
    #[serde(default = "default_signing_skip_paths")]
    pub skip_paths: Option<Vec<String>>,
    #[serde(default)]
    pub include_paths: Option<Vec<String>>,
    /// Background sweep cadence for the nonce store
    #[serde(default = "default_nonce_cleanup_interval")]
    pub nonce_cleanup_interval_secs: u64,
}

fn default_algorithm() -> String {
    "SHA-256".to_string()
}

fn default_timestamp_tolerance() -> u64 {
    300_000
}

fn default_nonce_ttl() -> u64 {
    600_000
}

fn default_signing_skip_paths() -> Option<Vec<String>> {
    Some(vec!["/health".to_string(), "/metrics".to_string()])
}

fn default_nonce_cleanup_interval() -> u64 {
    60
}

impl SigningSettings {
    /// Signer configuration; fails on an unknown algorithm
    pub fn signing_config(&self) -> Result<SigningConfig, ConfigError> {
        let algorithm: SigningAlgorithm = self
            .algorithm
            .parse()
            .map_err(|e| ConfigError::Message(format!("{}", e)))?;

        Ok(SigningConfig::new(self.secret.expose_secret().clone())
            .with_algorithm(algorithm)
            .with_timestamp_tolerance(Duration::from_millis(self.timestamp_tolerance_ms))
            .with_require_nonce(self.require_nonce)
            .with_nonce_ttl(Duration::from_millis(self.nonce_ttl_ms)))
    }

    /// Middleware options without a nonce store or failure hook
    pub fn verification_options(&self) -> Result<SignatureVerificationOptions, ConfigError> {
        let mut options = SignatureVerificationOptions::new(self.signing_config()?);
        options.skip_paths = self.skip_paths.clone();
        options.include_paths = self.include_paths.clone();
        Ok(options)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub skip_paths: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            skip_paths: None,
        }
    }
}

impl RateLimitSettings {
    pub fn options(&self) -> RateLimitOptions {
        RateLimitOptions {
            max_requests: self.max_requests,
            window: Duration::from_millis(self.window_ms),
            skip_paths: self.skip_paths.clone(),
            include_paths: None,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Option<Vec<String>>,
    #[serde(default)]
    pub allowed_headers: Option<Vec<String>>,
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    #[serde(default)]
    pub allow_credentials: bool,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_age() -> u64 {
    600
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: default_allowed_origins(),
            allowed_methods: None,
            allowed_headers: None,
            max_age_secs: default_max_age(),
            allow_credentials: false,
        }
    }
}

impl CorsSettings {
    pub fn options(&self) -> Result<CorsOptions, ConfigError> {
        let mut options = CorsOptions {
            allowed_origins: self.allowed_origins.clone(),
            max_age_secs: self.max_age_secs,
            allow_credentials: self.allow_credentials,
            ..Default::default()
        };
        if let Some(methods) = &self.allowed_methods {
            options.allowed_methods = methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_uppercase().as_bytes()).map_err(|_| {
                        ConfigError::Message(format!("Invalid CORS method: {}", m))
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(headers) = &self.allowed_headers {
            options.allowed_headers = headers.clone();
        }
        Ok(options)
    }
}

/// One configured API key
#[derive(Debug, Deserialize)]
pub struct ApiKeyEntry {
    pub key: SecretString,
    pub role: Role,
}

/// Bearer authentication configuration
#[derive(Debug, Default, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub required_role: Option<Role>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
    #[serde(default)]
    pub skip_paths: Option<Vec<String>>,
}

impl AuthSettings {
    pub fn key_table(&self) -> HashMap<String, Role> {
        self.api_keys
            .iter()
            .map(|entry| (entry.key.expose_secret().clone(), entry.role))
            .collect()
    }

    pub fn options(&self) -> AuthOptions {
        AuthOptions {
            required_role: self.required_role,
            skip_paths: self.skip_paths.clone(),
            include_paths: None,
        }
    }
}

/// Request deadline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Logging middleware settings are fixed for now
pub fn logging_options() -> LoggingOptions {
    LoggingOptions {
        trust_inbound_id: true,
        skip_paths: Some(vec!["/health".to_string()]),
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (GATEWAY_*)
    /// 2. config/config.{yaml,toml,json} (if exists)
    /// 3. config.{yaml,toml,json} (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Environment::with_prefix("GATEWAY"))
    }

    fn load_from(environment: Environment) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.body_limit_bytes", 1024 * 1024)?
            .set_default("signing.algorithm", "SHA-256")?
            // Load from config files (lower priority)
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // Override with environment variables (highest priority - loaded last)
            // GATEWAY_SIGNING__SECRET=... -> signing.secret
            // GATEWAY_CORS__ALLOWED_ORIGINS=https://a,https://b -> cors.allowed_origins
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("signing.skip_paths")
                    .with_list_parse_key("signing.include_paths")
                    .with_list_parse_key("rate_limit.skip_paths")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("cors.allowed_methods")
                    .with_list_parse_key("cors.allowed_headers")
                    .with_list_parse_key("auth.skip_paths"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Check signing secret is set
        if self.signing.secret.expose_secret().is_empty() {
            return Err(ConfigError::Message(
                "Signing secret must be set via GATEWAY_SIGNING__SECRET".to_string(),
            ));
        }

        self.signing.signing_config()?;

        if self.signing.skip_paths.is_some() && self.signing.include_paths.is_some() {
            return Err(ConfigError::Message(
                "signing.skip_paths and signing.include_paths are mutually exclusive".to_string(),
            ));
        }

        if self.signing.nonce_cleanup_interval_secs == 0 {
            return Err(ConfigError::Message(
                "signing.nonce_cleanup_interval_secs must be positive".to_string(),
            ));
        }

        if self.rate_limit.enabled && (self.rate_limit.max_requests == 0 || self.rate_limit.window_ms == 0) {
            return Err(ConfigError::Message(
                "Rate limit max_requests and window_ms must be positive".to_string(),
            ));
        }

        if self.timeout.enabled && self.timeout.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "timeout.timeout_ms must be positive".to_string(),
            ));
        }

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            tracing::warn!("Auth is enabled but no API keys are configured; every request will be rejected");
        }

        Ok(())
    }
}
