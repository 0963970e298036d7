//! Federation configuration.
//!
//! This module provides the configuration types for the federation core:
//! which configuration paths the ingestor listens on, how the JWKS cache
//! reloads keys, and how external tokens are validated during exchange.
//!
//! # Example (TOML)
//!
//! ```toml
//! [ingest]
//! public_settings_path = "/config/tenants/{tenant}/webapp/settings-public.yml"
//! idp_config_path = "/config/tenants/{tenant}/idp-config.yml"
//!
//! [jwks]
//! reload_timeout = "10s"
//! allow_http = false
//!
//! [exchange]
//! clock_skew_tolerance = "60s"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder that marks the tenant segment in a path template.
pub const TENANT_PLACEHOLDER: &str = "{tenant}";

/// Placeholder that marks the IDP client segment in a JWKS path template.
pub const CLIENT_PLACEHOLDER: &str = "{client}";

/// Root federation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Configuration document paths watched by the ingestor.
    pub ingest: IngestConfig,

    /// JWKS cache and source settings.
    pub jwks: JwksCacheConfig,

    /// Token exchange validation settings.
    pub exchange: ExchangeConfig,
}

impl FederationConfig {
    /// Parses a configuration from TOML text.
    ///
    /// Missing sections and fields fall back to their defaults. The parsed
    /// configuration is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the TOML is malformed, or
    /// `ConfigError::InvalidValue` if validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A path template is empty or lacks the `{tenant}` placeholder
    /// - The JWKS path template lacks the `{client}` placeholder
    /// - A timeout or size limit is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, template) in [
            ("ingest.public_settings_path", &self.ingest.public_settings_path),
            ("ingest.idp_config_path", &self.ingest.idp_config_path),
            ("ingest.jwks_path", &self.ingest.jwks_path),
        ] {
            if !template.contains(TENANT_PLACEHOLDER) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must contain the {} placeholder",
                    name, TENANT_PLACEHOLDER
                )));
            }
        }

        if !self.ingest.jwks_path.contains(CLIENT_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue(format!(
                "ingest.jwks_path must contain the {} placeholder",
                CLIENT_PLACEHOLDER
            )));
        }

        if self.jwks.reload_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "jwks.reload_timeout must be > 0".to_string(),
            ));
        }

        if self.jwks.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "jwks.request_timeout must be > 0".to_string(),
            ));
        }

        if self.jwks.max_response_size == 0 {
            return Err(ConfigError::InvalidValue(
                "jwks.max_response_size must be > 0".to_string(),
            ));
        }

        if self.exchange.default_identity_claim.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "exchange.default_identity_claim cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Paths of the configuration documents the federation core consumes.
///
/// Each template is an absolute path where `{tenant}` (and, for JWKS
/// documents, `{client}`) stand for a single path segment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Public (non-secret) half of the IDP configuration plus tenant settings.
    pub public_settings_path: String,

    /// Private (secret) half of the IDP configuration.
    pub idp_config_path: String,

    /// Raw JWK Set documents published per tenant and IDP client.
    pub jwks_path: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            public_settings_path: "/config/tenants/{tenant}/webapp/settings-public.yml"
                .to_string(),
            idp_config_path: "/config/tenants/{tenant}/idp-config.yml".to_string(),
            jwks_path: "/config/tenants/{tenant}/webapp/public/idp/{client}/jwks.json"
                .to_string(),
        }
    }
}

/// JWKS cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksCacheConfig {
    /// Upper bound on one miss-triggered reload, including source I/O.
    #[serde(with = "humantime_serde")]
    pub reload_timeout: Duration,

    /// HTTP request timeout for remote JWKS endpoints.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Maximum accepted JWKS response size in bytes.
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) JWKS endpoints.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            reload_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            max_response_size: 1024 * 1024, // 1 MB
            allow_http: false,
        }
    }
}

impl JwksCacheConfig {
    /// Sets the reload timeout.
    #[must_use]
    pub fn with_reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = timeout;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    /// Allows HTTP (non-HTTPS) JWKS endpoints.
    ///
    /// # Warning
    ///
    /// This should only be used for testing.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Token exchange configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Clock skew tolerance applied to `exp` and `nbf`.
    #[serde(with = "humantime_serde")]
    pub clock_skew_tolerance: Duration,

    /// Identity claim used when a client has no claim mapping.
    pub default_identity_claim: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            clock_skew_tolerance: Duration::from_secs(60),
            default_identity_claim: "email".to_string(),
        }
    }
}

impl ExchangeConfig {
    /// Sets the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.clock_skew_tolerance = tolerance;
        self
    }
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The configuration text could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
