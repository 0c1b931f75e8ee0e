//! Service provider configuration as seen by the protocol engine.

use chrono::{DateTime, Duration, Utc};
use idp_crypto::Certificate;
use serde::{Deserialize, Serialize};

use super::SamlBinding;

/// Which parts of an outbound response get an XML signature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningBehavior {
    /// Nothing is signed.
    DoNotSign,
    /// Only the protocol message root is signed.
    #[default]
    SignResponse,
    /// Only the embedded assertion is signed.
    SignAssertion,
    /// Assertion first, then the response root.
    SignBoth,
}

impl SigningBehavior {
    /// Returns true if the response root gets a signature.
    #[must_use]
    pub const fn signs_response(self) -> bool {
        matches!(self, Self::SignResponse | Self::SignBoth)
    }

    /// Returns true if the assertion gets a signature.
    #[must_use]
    pub const fn signs_assertion(self) -> bool {
        matches!(self, Self::SignAssertion | Self::SignBoth)
    }
}

/// Assertion Consumer Service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcsEndpoint {
    /// The URL.
    pub url: String,
    /// The binding.
    pub binding: SamlBinding,
    /// Index for this endpoint.
    pub index: u32,
    /// Whether this is the default endpoint.
    pub is_default: bool,
}

impl AcsEndpoint {
    /// Creates an HTTP-POST endpoint.
    #[must_use]
    pub fn post(url: impl Into<String>, index: u32) -> Self {
        Self {
            url: url.into(),
            binding: SamlBinding::HttpPost,
            index,
            is_default: false,
        }
    }

    /// Marks the endpoint as the default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Single Logout Service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlsEndpoint {
    /// The URL.
    pub url: String,
    /// The binding.
    pub binding: SamlBinding,
}

/// A registered service provider.
#[derive(Debug, Clone)]
pub struct ServiceProvider {
    /// Entity ID of the service provider.
    pub entity_id: String,

    /// Whether this SP is enabled.
    pub enabled: bool,

    /// Certificates that may verify the SP's request signatures.
    pub signing_certificates: Vec<Certificate>,

    /// Certificates assertions may be encrypted to.
    pub encryption_certificates: Vec<Certificate>,

    /// Clock skew override.
    pub clock_skew: Option<Duration>,

    /// Maximum request age override.
    pub max_request_age: Option<Duration>,

    /// Outbound signing policy.
    pub signing_behavior: SigningBehavior,

    /// Whether authentication requests must be signed.
    pub want_authn_requests_signed: bool,

    /// Whether assertions are encrypted before delivery.
    pub encrypt_assertions: bool,

    /// Assertion Consumer Service endpoints.
    pub acs_endpoints: Vec<AcsEndpoint>,

    /// Single Logout Service endpoints.
    pub slo_endpoints: Vec<SlsEndpoint>,
}

impl ServiceProvider {
    /// Creates an enabled SP with no certificates or endpoints.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            enabled: true,
            signing_certificates: Vec::new(),
            encryption_certificates: Vec::new(),
            clock_skew: None,
            max_request_age: None,
            signing_behavior: SigningBehavior::default(),
            want_authn_requests_signed: true,
            encrypt_assertions: false,
            acs_endpoints: Vec::new(),
            slo_endpoints: Vec::new(),
        }
    }

    /// Adds a signing certificate.
    #[must_use]
    pub fn with_signing_certificate(mut self, certificate: Certificate) -> Self {
        self.signing_certificates.push(certificate);
        self
    }

    /// Adds an encryption certificate and turns on assertion encryption.
    #[must_use]
    pub fn with_encryption_certificate(mut self, certificate: Certificate) -> Self {
        self.encryption_certificates.push(certificate);
        self.encrypt_assertions = true;
        self
    }

    /// Adds an ACS endpoint.
    #[must_use]
    pub fn with_acs(mut self, endpoint: AcsEndpoint) -> Self {
        self.acs_endpoints.push(endpoint);
        self
    }

    /// Adds an SLO endpoint.
    #[must_use]
    pub fn with_slo(mut self, url: impl Into<String>, binding: SamlBinding) -> Self {
        self.slo_endpoints.push(SlsEndpoint {
            url: url.into(),
            binding,
        });
        self
    }

    /// Sets the signing policy.
    #[must_use]
    pub fn with_signing_behavior(mut self, behavior: SigningBehavior) -> Self {
        self.signing_behavior = behavior;
        self
    }

    /// Sets the clock skew override.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = Some(skew);
        self
    }

    /// Sets the maximum request age override.
    #[must_use]
    pub fn with_max_request_age(mut self, age: Duration) -> Self {
        self.max_request_age = Some(age);
        self
    }

    /// Sets whether authentication requests must be signed.
    #[must_use]
    pub fn want_authn_requests_signed(mut self, required: bool) -> Self {
        self.want_authn_requests_signed = required;
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Signing certificates whose validity window contains `now`.
    pub fn valid_signing_certificates(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Certificate> {
        self.signing_certificates
            .iter()
            .filter(move |cert| cert.is_valid_at(now))
    }

    /// Finds an ACS endpoint by exact URL.
    #[must_use]
    pub fn acs_by_url(&self, url: &str) -> Option<&AcsEndpoint> {
        self.acs_endpoints.iter().find(|e| e.url == url)
    }

    /// Finds an ACS endpoint by index.
    #[must_use]
    pub fn acs_by_index(&self, index: u32) -> Option<&AcsEndpoint> {
        self.acs_endpoints.iter().find(|e| e.index == index)
    }

    /// The endpoint flagged default, else the first registered one.
    #[must_use]
    pub fn default_acs(&self) -> Option<&AcsEndpoint> {
        self.acs_endpoints
            .iter()
            .find(|e| e.is_default)
            .or_else(|| self.acs_endpoints.first())
    }

    /// Preferred SLO endpoint, POST first.
    #[must_use]
    pub fn slo_url(&self) -> Option<&str> {
        self.slo_endpoints
            .iter()
            .find(|e| e.binding == SamlBinding::HttpPost)
            .or_else(|| self.slo_endpoints.first())
            .map(|e| e.url.as_str())
    }
}
