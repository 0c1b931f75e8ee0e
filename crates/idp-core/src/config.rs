//! SAML configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults,
//! or deserialized from any serde source.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum size of an inbound SAML message (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Identity provider SAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamlConfig {
    /// Entity ID of this identity provider.
    pub idp_entity_id: String,

    /// Single Sign-On service URL (expected `Destination` of AuthnRequests).
    pub sso_url: String,

    /// Single Logout service URL (expected `Destination` of LogoutRequests).
    pub slo_url: String,

    /// Allowed clock skew in seconds.
    pub clock_skew_secs: u64,

    /// Maximum age of an inbound request in seconds.
    pub max_request_age_secs: u64,

    /// Maximum inbound message size in bytes, enforced before and during parsing.
    pub max_message_size: usize,

    /// Emit a Content-Security-Policy meta tag on auto-post pages.
    pub content_security_policy: bool,

    /// Reject requests whose (issuer, ID) pair was already seen.
    pub replay_protection: bool,
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            idp_entity_id: "http://localhost:8080/saml".to_string(),
            sso_url: "http://localhost:8080/saml/sso".to_string(),
            slo_url: "http://localhost:8080/saml/slo".to_string(),
            clock_skew_secs: 300,       // 5 minutes
            max_request_age_secs: 600, // 10 minutes
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            content_security_policy: true,
            replay_protection: true,
        }
    }
}

impl SamlConfig {
    /// Loads configuration from `IDP_SAML_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let config = Self {
            idp_entity_id: std::env::var("IDP_SAML_ENTITY_ID").unwrap_or(defaults.idp_entity_id),
            sso_url: std::env::var("IDP_SAML_SSO_URL").unwrap_or(defaults.sso_url),
            slo_url: std::env::var("IDP_SAML_SLO_URL").unwrap_or(defaults.slo_url),
            clock_skew_secs: parse_env("IDP_SAML_CLOCK_SKEW_SECS", defaults.clock_skew_secs)?,
            max_request_age_secs: parse_env(
                "IDP_SAML_MAX_REQUEST_AGE_SECS",
                defaults.max_request_age_secs,
            )?,
            max_message_size: parse_env("IDP_SAML_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            content_security_policy: parse_env(
                "IDP_SAML_CONTENT_SECURITY_POLICY",
                defaults.content_security_policy,
            )?,
            replay_protection: parse_env(
                "IDP_SAML_REPLAY_PROTECTION",
                defaults.replay_protection,
            )?,
        };

        tracing::debug!(
            entity_id = %config.idp_entity_id,
            clock_skew_secs = config.clock_skew_secs,
            max_request_age_secs = config.max_request_age_secs,
            "loaded SAML configuration"
        );

        Ok(config)
    }

    /// Returns the default clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Returns the default maximum request age.
    #[must_use]
    pub fn max_request_age(&self) -> Duration {
        Duration::from_secs(self.max_request_age_secs)
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
