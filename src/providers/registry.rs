//! Provider registry: ordered per-category lists with round-robin rotation.
//!
//! The registry is process-wide state populated once at startup, then
//! read-mostly. The rotation cursor is the only mutable part of the hot
//! path; it advances modulo the list length on every [`get_next`] call so
//! successive executions naturally spread load.
//!
//! [`get_next`]: ProviderRegistry::get_next

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

use super::error::{ProviderError, ProviderResult};
use super::{Category, Provider};

/// Ordered providers for one category plus the rotation cursor.
#[derive(Debug, Default)]
struct CategoryList {
    providers: Vec<Provider>,
    cursor: usize,
}

/// Registry of providers grouped by category.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    categories: RwLock<HashMap<Category, CategoryList>>,
}

/// Read-only registry introspection.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Total number of registered providers.
    pub total: usize,
    /// Provider names per category, in registration order.
    pub by_category: HashMap<String, Vec<String>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its category.
    ///
    /// Registration order is preserved. Registering a name that already
    /// exists in the category replaces that entry in place.
    pub fn register(&self, provider: Provider) -> &Self {
        let category = provider.category();
        let mut categories = self.categories.write();
        let list = categories.entry(category).or_default();

        if let Some(existing) = list.providers.iter_mut().find(|p| p.name == provider.name) {
            tracing::info!(
                service = %provider.name,
                category = %category,
                "Overriding existing provider registration"
            );
            *existing = provider;
        } else {
            tracing::info!(
                service = %provider.name,
                category = %category,
                position = list.providers.len(),
                "Registered provider"
            );
            list.providers.push(provider);
        }
        self
    }

    /// Return the next provider for the category in round-robin order.
    pub fn get_next(&self, category: Category) -> ProviderResult<Provider> {
        let mut categories = self.categories.write();
        let list = categories
            .get_mut(&category)
            .filter(|l| !l.providers.is_empty())
            .ok_or_else(|| {
                ProviderError::service_error(
                    "registry",
                    format!("No providers registered for category '{category}'"),
                )
            })?;

        let provider = list.providers[list.cursor % list.providers.len()].clone();
        list.cursor = (list.cursor + 1) % list.providers.len();
        Ok(provider)
    }

    /// Return the ordered provider list for a category (possibly empty,
    /// never an error).
    #[must_use]
    pub fn get_all(&self, category: Category) -> Vec<Provider> {
        self.categories
            .read()
            .get(&category)
            .map(|l| l.providers.clone())
            .unwrap_or_default()
    }

    /// Whether any provider is registered for the category.
    #[must_use]
    pub fn has_category(&self, category: Category) -> bool {
        self.categories
            .read()
            .get(&category)
            .is_some_and(|l| !l.providers.is_empty())
    }

    /// Categories with at least one registration, in declaration order.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.has_category(*c))
            .collect()
    }

    /// Snapshot of registry contents.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let categories = self.categories.read();
        let mut by_category = HashMap::new();
        let mut total = 0;
        for (category, list) in categories.iter() {
            total += list.providers.len();
            by_category.insert(
                category.to_string(),
                list.providers.iter().map(|p| p.name.clone()).collect(),
            );
        }
        RegistryStats { total, by_category }
    }
}
