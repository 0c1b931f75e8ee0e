//! Outbound success responses.
//!
//! Order matters: the assertion signature is applied before encryption so
//! the SP can verify it after decrypting, and the response signature is
//! applied last so it covers the `EncryptedAssertion`.

use std::sync::Arc;

use idp_core::{Clock, SamlConfig};

use crate::bindings::{AutoPostPage, SamlMessageType};
use crate::encryption::AssertionEncryptor;
use crate::error::SamlResult;
use crate::processor::ValidatedAuthnRequest;
use crate::provider::KeyMaterialProvider;
use crate::signature::ResponseSigner;
use crate::types::{Response, ServiceProvider};

/// Applies signing and encryption policy to outbound responses.
#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    signer: ResponseSigner,
    encryptor: AssertionEncryptor,
    content_security_policy: bool,
}

impl ResponseDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(config: &SamlConfig, keys: Arc<dyn KeyMaterialProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            signer: ResponseSigner::new(keys),
            encryptor: AssertionEncryptor::new(clock),
            content_security_policy: config.content_security_policy,
        }
    }

    /// Signs and encrypts `response_xml` as `sp` requires.
    ///
    /// # Errors
    ///
    /// Fails closed: an SP that requires encryption never receives a
    /// plaintext assertion.
    pub async fn finalize(&self, response_xml: &str, sp: &ServiceProvider) -> SamlResult<String> {
        let behavior = sp.signing_behavior;
        let mut xml = response_xml.to_string();

        if behavior.signs_assertion() {
            xml = self.signer.sign_assertion(&xml).await.inspect_err(|err| {
                tracing::error!(sp = %sp.entity_id, error = %err, "Failed to sign assertion");
            })?;
        }
        if sp.encrypt_assertions {
            xml = self.encryptor.encrypt(&xml, sp)?;
        }
        if behavior.signs_response() {
            xml = self.signer.sign_response(&xml).await.inspect_err(|err| {
                tracing::error!(sp = %sp.entity_id, error = %err, "Failed to sign response");
            })?;
        }

        tracing::debug!(
            sp = %sp.entity_id,
            ?behavior,
            encrypted = sp.encrypt_assertions,
            "Response finalized"
        );
        Ok(xml)
    }

    /// Finalizes `response` and wraps it in an auto-post page to the ACS.
    ///
    /// # Errors
    ///
    /// See [`Self::finalize`].
    pub async fn deliver(&self, response: &Response, request: &ValidatedAuthnRequest) -> SamlResult<AutoPostPage> {
        let xml = self.finalize(&response.to_xml(), &request.service_provider).await?;
        Ok(AutoPostPage::new(&request.acs_url, SamlMessageType::Response, &xml)
            .with_relay_state(request.relay_state.as_deref())
            .with_content_security_policy(self.content_security_policy))
    }
}
