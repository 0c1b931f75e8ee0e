//! Lookup traits the pipeline depends on, with in-memory implementations.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::SamlResult;
use crate::signature::SigningCredential;
use crate::types::ServiceProvider;

/// Source of service provider configuration.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait ServiceProviderStore: Send + Sync {
    /// Finds an SP by entity ID. Disabled SPs are still returned.
    ///
    /// ## Errors
    ///
    /// Returns `SamlError::Store` if the backing store fails.
    async fn find_by_entity_id(&self, entity_id: &str) -> SamlResult<Option<ServiceProvider>>;
}

/// Source of the IdP signing credential.
///
/// Called for every signing operation so key rotation takes effect
/// without restarting the pipeline.
#[async_trait]
pub trait KeyMaterialProvider: Send + Sync {
    /// Returns the active signing credential.
    ///
    /// ## Errors
    ///
    /// Returns `SamlError::KeyMaterial` if no credential is available.
    async fn signing_credential(&self) -> SamlResult<SigningCredential>;
}

/// Service providers held in memory.
#[derive(Debug, Default)]
pub struct InMemoryServiceProviderStore {
    providers: DashMap<String, ServiceProvider>,
}

impl InMemoryServiceProviderStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an SP.
    pub fn insert(&self, sp: ServiceProvider) {
        self.providers.insert(sp.entity_id.clone(), sp);
    }

    /// Removes an SP.
    pub fn remove(&self, entity_id: &str) -> Option<ServiceProvider> {
        self.providers.remove(entity_id).map(|(_, sp)| sp)
    }

    /// Number of registered SPs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if no SP is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl FromIterator<ServiceProvider> for InMemoryServiceProviderStore {
    fn from_iter<T: IntoIterator<Item = ServiceProvider>>(iter: T) -> Self {
        let store = Self::new();
        for sp in iter {
            store.insert(sp);
        }
        store
    }
}

#[async_trait]
impl ServiceProviderStore for InMemoryServiceProviderStore {
    async fn find_by_entity_id(&self, entity_id: &str) -> SamlResult<Option<ServiceProvider>> {
        Ok(self.providers.get(entity_id).map(|sp| sp.value().clone()))
    }
}

/// A fixed signing credential.
#[derive(Debug, Clone)]
pub struct StaticKeyMaterialProvider {
    credential: Arc<SigningCredential>,
}

impl StaticKeyMaterialProvider {
    /// Wraps a credential.
    #[must_use]
    pub fn new(credential: SigningCredential) -> Self {
        Self {
            credential: Arc::new(credential),
        }
    }
}

#[async_trait]
impl KeyMaterialProvider for StaticKeyMaterialProvider {
    async fn signing_credential(&self) -> SamlResult<SigningCredential> {
        Ok(self.credential.as_ref().clone())
    }
}
