//! Selector contract consumed by the session directory.
//!
//! A selector owns the registry cache and the load-balancing policy. The
//! directory only asks it for one picked node ([`Selector::select`]) or for the
//! full current snapshot ([`Selector::get_service`]), and installs a
//! [`NodeWatcher`] that is told whenever a node leaves the registry.

use crate::node::{Node, Service};
use rand::Rng;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Registry and selector errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The service is unknown to the registry
    #[error("service {0} not found")]
    NotFound(String),

    /// The service exists but no node passed the filters
    #[error("none available for service {0}")]
    NoneAvailable(String),

    /// The registry backend could not be queried
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Picker returned by [`Selector::select`]; one load-balanced pick per call
pub type Next = Box<dyn FnMut() -> Result<Node, RegistryError> + Send>;

/// Narrows a service snapshot before a strategy picks from it
pub type Filter = Arc<dyn Fn(Vec<Service>) -> Vec<Service> + Send + Sync>;

/// Builds a picker over a filtered snapshot
pub type Strategy = Arc<dyn Fn(Vec<Service>) -> Next + Send + Sync>;

/// Callback invoked with every node that leaves the registry
pub type NodeWatcher = Arc<dyn Fn(&Node) + Send + Sync>;

/// Registry-backed node selection
pub trait Selector: Send + Sync {
    /// Returns a picker over the live nodes of `service`
    fn select(&self, service: &str, options: &SelectOptions) -> Result<Next, RegistryError>;

    /// Returns the full current snapshot of `service`
    fn get_service(&self, service: &str) -> Result<Vec<Service>, RegistryError>;

    /// Installs the deregistration callback
    fn set_watcher(&self, watcher: NodeWatcher);
}

/// Per-call selection options (affinity, exclusion lists, strategy override)
#[derive(Clone, Default)]
pub struct SelectOptions {
    /// Filters applied in order
    pub filters: Vec<Filter>,
    /// Strategy override; selectors fall back to their own default
    pub strategy: Option<Strategy>,
}

impl SelectOptions {
    /// Creates empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Overrides the strategy
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Runs every filter over `services`
    pub fn apply_filters(&self, services: Vec<Service>) -> Vec<Service> {
        self.filters
            .iter()
            .fold(services, |services, filter| filter(services))
    }
}

impl fmt::Debug for SelectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectOptions")
            .field("filters", &self.filters.len())
            .field("strategy", &self.strategy.is_some())
            .finish()
    }
}

fn flatten_nodes(services: Vec<Service>) -> Vec<Node> {
    services.into_iter().flat_map(|s| s.nodes).collect()
}

/// Picks a uniformly random node on every call
pub fn random() -> Strategy {
    Arc::new(|services: Vec<Service>| {
        let name = services.first().map(|s| s.name.clone()).unwrap_or_default();
        let nodes = flatten_nodes(services);
        Box::new(move || {
            if nodes.is_empty() {
                return Err(RegistryError::NoneAvailable(name.clone()));
            }
            let index = rand::thread_rng().gen_range(0..nodes.len());
            Ok(nodes[index].clone())
        }) as Next
    })
}

/// Cycles through nodes; the position persists across pickers built by the same strategy
pub fn round_robin() -> Strategy {
    let counter = Arc::new(AtomicUsize::new(0));
    Arc::new(move |services: Vec<Service>| {
        let name = services.first().map(|s| s.name.clone()).unwrap_or_default();
        let nodes = flatten_nodes(services);
        let counter = Arc::clone(&counter);
        Box::new(move || {
            if nodes.is_empty() {
                return Err(RegistryError::NoneAvailable(name.clone()));
            }
            let index = counter.fetch_add(1, Ordering::Relaxed) % nodes.len();
            Ok(nodes[index].clone())
        }) as Next
    })
}

/// Drops the listed node ids
pub fn filter_exclude_ids<I, S>(ids: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let excluded: HashSet<String> = ids.into_iter().map(Into::into).collect();
    Arc::new(move |services: Vec<Service>| {
        services
            .into_iter()
            .map(|mut service| {
                service.nodes.retain(|node| !excluded.contains(&node.id));
                service
            })
            .collect()
    })
}

/// Keeps nodes whose metadata `key` equals `value`
pub fn filter_metadata(key: impl Into<String>, value: impl Into<String>) -> Filter {
    let key = key.into();
    let value = value.into();
    Arc::new(move |services: Vec<Service>| {
        services
            .into_iter()
            .map(|mut service| {
                service.nodes.retain(|node| node.meta(&key) == Some(value.as_str()));
                service
            })
            .collect()
    })
}

/// Keeps services of the given version
pub fn filter_version(version: impl Into<String>) -> Filter {
    let version = version.into();
    Arc::new(move |services: Vec<Service>| {
        services
            .into_iter()
            .filter(|service| service.version == version)
            .collect()
    })
}
