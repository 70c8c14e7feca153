//! Provider registry.
//!
//! Holds the registered adapters with their base priority rank. Lookups and
//! registration are safe from any task.

use dashmap::DashMap;
use gateway_core::{GatewayError, GatewayResult, LLMProvider, ProviderDescriptor};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Registered adapter with its ordering keys
#[derive(Clone)]
pub struct ProviderEntry {
    /// The adapter
    pub provider: Arc<dyn LLMProvider>,
    /// Base priority rank (lower is tried first)
    pub priority: u32,
    /// Registration order, breaks priority ties
    sequence: u64,
}

impl ProviderEntry {
    /// Adapter identifier
    #[must_use]
    pub fn id(&self) -> &str {
        self.provider.id()
    }

    /// Static description of the adapter
    #[must_use]
    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            id: self.provider.id().to_string(),
            provider_type: self.provider.provider_type(),
            priority: self.priority,
            capabilities: *self.provider.capabilities(),
            configured: self.provider.is_configured(),
        }
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("id", &self.provider.id())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Registry of provider adapters
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, ProviderEntry>,
    next_sequence: AtomicU64,
}

impl ProviderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter at a priority rank
    ///
    /// # Errors
    /// Returns a configuration error if the id is already registered
    pub fn register(&self, provider: Arc<dyn LLMProvider>, priority: u32) -> GatewayResult<()> {
        let id = provider.id().to_string();
        let configured = provider.is_configured();

        match self.providers.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(GatewayError::configuration(
                format!("provider '{id}' is already registered"),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ProviderEntry {
                    provider,
                    priority,
                    sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
                });
                info!(provider = %id, priority = priority, configured = configured, "Provider registered");
                Ok(())
            }
        }
    }

    /// Remove an adapter
    pub fn deregister(&self, id: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.remove(id).map(|(_, entry)| entry.provider)
    }

    /// Look up an adapter
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(id).map(|entry| Arc::clone(&entry.provider))
    }

    /// Whether an id is registered
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// All entries by ascending rank, ties in registration order
    #[must_use]
    pub fn ordered(&self) -> Vec<ProviderEntry> {
        let mut entries: Vec<ProviderEntry> =
            self.providers.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by_key(|entry| (entry.priority, entry.sequence));
        entries
    }

    /// Descriptors of all entries in rank order
    #[must_use]
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.ordered().iter().map(ProviderEntry::descriptor).collect()
    }

    /// Number of adapters with credentials
    #[must_use]
    pub fn configured_count(&self) -> usize {
        self.providers
            .iter()
            .filter(|entry| entry.provider.is_configured())
            .count()
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{
        CompletionRequest, CompletionResult, ProviderCapabilities, ProviderType,
    };

    struct StubProvider {
        id: String,
        configured: bool,
        capabilities: ProviderCapabilities,
    }

    impl StubProvider {
        fn arc(id: &str, configured: bool) -> Arc<dyn LLMProvider> {
            Arc::new(Self {
                id: id.to_string(),
                configured,
                capabilities: ProviderCapabilities::default(),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn id(&self) -> &str {
            &self.id
        }

        fn provider_type(&self) -> ProviderType {
            ProviderType::Custom
        }

        fn capabilities(&self) -> &ProviderCapabilities {
            &self.capabilities
        }

        fn default_model(&self) -> &str {
            "stub"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn complete(&self, _request: &CompletionRequest) -> GatewayResult<CompletionResult> {
            Ok(CompletionResult::success("ok", &self.id, "stub"))
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::arc("a", true), 1).expect("register");

        assert!(registry.contains("a"));
        assert_eq!(registry.get("a").map(|p| p.id().to_string()), Some("a".to_string()));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::arc("a", true), 1).expect("register");
        assert!(registry.register(StubProvider::arc("a", true), 2).is_err());
    }

    #[test]
    fn test_ordering() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::arc("c", true), 3).expect("register");
        registry.register(StubProvider::arc("b2", true), 2).expect("register");
        registry.register(StubProvider::arc("a", true), 1).expect("register");
        registry.register(StubProvider::arc("b1", true), 2).expect("register");

        let ids: Vec<String> = registry.ordered().iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b2", "b1", "c"]);
    }

    #[test]
    fn test_descriptors_and_configured_count() {
        let registry = ProviderRegistry::new();
        registry.register(StubProvider::arc("a", true), 1).expect("register");
        registry.register(StubProvider::arc("b", false), 2).expect("register");

        assert_eq!(registry.configured_count(), 1);
        let descriptors = registry.descriptors();
        assert!(descriptors[0].configured);
        assert!(!descriptors[1].configured);

        assert!(registry.deregister("b").is_some());
        assert_eq!(registry.len(), 1);
    }
}
