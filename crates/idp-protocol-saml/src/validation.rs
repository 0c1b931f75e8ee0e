//! Protocol field checks shared by every inbound message kind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use idp_core::{Clock, SamlConfig};

use crate::error::SamlRequestError;
use crate::message::SamlMessage;
use crate::types::{ServiceProvider, SAML_VERSION};

/// Upper bound on any configured time window, ten years.
const MAX_WINDOW_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn window(duration: std::time::Duration) -> Duration {
    let secs = i64::try_from(duration.as_secs()).unwrap_or(MAX_WINDOW_SECS);
    Duration::seconds(secs.min(MAX_WINDOW_SECS))
}

fn clamp(duration: Duration) -> Duration {
    let max = Duration::seconds(MAX_WINDOW_SECS);
    if duration > max {
        max
    } else if duration < Duration::zero() {
        Duration::zero()
    } else {
        duration
    }
}

/// Validates version, issue-instant freshness and destination.
///
/// Destinations compare as ASCII case-insensitive full strings. No
/// trailing-slash, default-port or percent-encoding normalization is done.
#[derive(Clone)]
pub struct RequestFieldValidator {
    clock: Arc<dyn Clock>,
    default_clock_skew: Duration,
    default_max_request_age: Duration,
}

impl std::fmt::Debug for RequestFieldValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFieldValidator")
            .field("default_clock_skew", &self.default_clock_skew)
            .field("default_max_request_age", &self.default_max_request_age)
            .finish_non_exhaustive()
    }
}

impl RequestFieldValidator {
    /// Creates a validator using the configured defaults.
    #[must_use]
    pub fn new(config: &SamlConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            default_clock_skew: window(config.clock_skew()),
            default_max_request_age: window(config.max_request_age()),
        }
    }

    /// The clock this validator reads.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Clock skew for `sp`, its override or the default.
    #[must_use]
    pub fn effective_clock_skew(&self, sp: &ServiceProvider) -> Duration {
        sp.clock_skew.map_or(self.default_clock_skew, clamp)
    }

    /// Maximum request age for `sp`, its override or the default.
    #[must_use]
    pub fn effective_max_request_age(&self, sp: &ServiceProvider) -> Duration {
        sp.max_request_age.map_or(self.default_max_request_age, clamp)
    }

    /// Checks the protocol fields of a request. `None` means valid.
    #[must_use]
    pub fn validate(
        &self,
        version: &str,
        issue_instant: DateTime<Utc>,
        destination: Option<&str>,
        sp: &ServiceProvider,
        expected_destination: &str,
    ) -> Option<SamlRequestError> {
        if version != SAML_VERSION {
            tracing::warn!(sp = %sp.entity_id, version, "Unsupported SAML version");
            return Some(SamlRequestError::version_mismatch(format!(
                "Unsupported SAML version {version}"
            )));
        }

        let now = self.clock.now();
        let skew = self.effective_clock_skew(sp);
        let max_age = self.effective_max_request_age(sp);

        if issue_instant > now + skew {
            tracing::warn!(sp = %sp.entity_id, %issue_instant, %now, "Request issued in the future");
            return Some(SamlRequestError::requester("Request is in the future"));
        }
        if issue_instant < now - max_age {
            tracing::warn!(sp = %sp.entity_id, %issue_instant, %now, "Request expired");
            return Some(SamlRequestError::requester("Request is expired"));
        }

        if let Some(destination) = destination {
            if !destination.eq_ignore_ascii_case(expected_destination) {
                tracing::warn!(
                    sp = %sp.entity_id,
                    destination,
                    expected = expected_destination,
                    "Destination mismatch"
                );
                return Some(SamlRequestError::requester(format!(
                    "Invalid destination, expected {expected_destination}"
                )));
            }
        }

        None
    }

    /// Checks the protocol fields of a parsed message.
    #[must_use]
    pub fn validate_message<M: SamlMessage>(
        &self,
        message: &M,
        sp: &ServiceProvider,
        expected_destination: &str,
    ) -> Option<SamlRequestError> {
        self.validate(
            message.version(),
            message.issue_instant(),
            message.destination(),
            sp,
            expected_destination,
        )
    }
}
