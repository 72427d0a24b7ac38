//! Selector backed by a [`MemoryRegistry`].

use crate::registry::MemoryRegistry;
use std::sync::Arc;
use svcmesh_core::selector::random;
use svcmesh_core::{Next, NodeWatcher, RegistryError, SelectOptions, Selector, Service, Strategy};

/// Load-balances over the live nodes of a [`MemoryRegistry`]
pub struct RegistrySelector {
    registry: Arc<MemoryRegistry>,
    strategy: Strategy,
}

impl RegistrySelector {
    /// Creates a selector using the random strategy
    pub fn new(registry: Arc<MemoryRegistry>) -> Self {
        Self {
            registry,
            strategy: random(),
        }
    }

    /// Replaces the default strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The backing registry
    pub fn registry(&self) -> &Arc<MemoryRegistry> {
        &self.registry
    }
}

impl Selector for RegistrySelector {
    fn select(&self, service: &str, options: &SelectOptions) -> Result<Next, RegistryError> {
        let services = options.apply_filters(self.registry.get_service(service)?);
        if services.iter().all(|s: &Service| s.nodes.is_empty()) {
            return Err(RegistryError::NoneAvailable(service.to_string()));
        }
        let strategy = options.strategy.as_ref().unwrap_or(&self.strategy);
        Ok(strategy(services))
    }

    fn get_service(&self, service: &str) -> Result<Vec<Service>, RegistryError> {
        self.registry.get_service(service)
    }

    fn set_watcher(&self, watcher: NodeWatcher) {
        self.registry.watch(watcher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use svcmesh_core::selector::{filter_exclude_ids, filter_version, round_robin};
    use svcmesh_core::Node;

    fn registry() -> Arc<MemoryRegistry> {
        let registry = MemoryRegistry::new();
        for id in ["chat@1", "chat@2", "chat@3"] {
            registry.register("chat", Node::new(id, "local"), Duration::from_secs(60));
        }
        registry
    }

    #[test]
    fn test_round_robin_cycles_nodes() {
        let selector = RegistrySelector::new(registry()).with_strategy(round_robin());
        let mut next = selector.select("chat", &SelectOptions::default()).unwrap();
        let picks: Vec<String> = (0..4).map(|_| next().unwrap().id).collect();
        assert_eq!(picks, vec!["chat@1", "chat@2", "chat@3", "chat@1"]);
    }

    #[test]
    fn test_filters_can_empty_the_pool() {
        let selector = RegistrySelector::new(registry());
        let options = SelectOptions::new()
            .with_filter(filter_exclude_ids(["chat@1", "chat@2", "chat@3"]));
        assert_eq!(
            selector.select("chat", &options).err(),
            Some(RegistryError::NoneAvailable("chat".to_string()))
        );

        let options = SelectOptions::new().with_filter(filter_version("9.9"));
        assert!(selector.select("chat", &options).is_err());
    }

    #[test]
    fn test_unknown_service() {
        let selector = RegistrySelector::new(MemoryRegistry::new());
        assert_eq!(
            selector.select("ghost", &SelectOptions::default()).err(),
            Some(RegistryError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_watcher_reaches_registry() {
        let registry = registry();
        let selector = RegistrySelector::new(registry.clone());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        selector.set_watcher(Arc::new(move |node: &Node| sink.lock().push(node.id.clone())));

        registry.deregister("chat", "chat@2");
        assert_eq!(*seen.lock(), vec!["chat@2".to_string()]);
    }
}
