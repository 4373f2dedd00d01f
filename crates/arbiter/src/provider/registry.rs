//! Provider registry: the collection of registered data sources.

use std::sync::Arc;

use crate::models::Asset;

use super::traits::DataProvider;

/// Holds every registered provider and answers capability queries.
///
/// The registry is immutable after construction; health and reliability
/// are tracked elsewhere so the provider set itself never changes under
/// a running engine.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn DataProvider>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn DataProvider>>) -> Self {
        Self { providers }
    }

    /// All registered providers.
    pub fn providers(&self) -> &[Arc<dyn DataProvider>] {
        &self.providers
    }

    /// Providers that can serve the given asset.
    pub fn providers_for(&self, asset: &Asset) -> Vec<Arc<dyn DataProvider>> {
        self.providers
            .iter()
            .filter(|p| p.supports_asset(asset))
            .cloned()
            .collect()
    }

    /// Look up a provider by identifier.
    pub fn get(&self, id: &str) -> Option<Arc<dyn DataProvider>> {
        self.providers.iter().find(|p| p.id() == id).cloned()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
