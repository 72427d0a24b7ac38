//! Discovered endpoints and their grouping by service name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One live instance of a registered service.
///
/// A node is immutable once issued by the registry; metadata changes produce a
/// fresh value with the same [`Node::id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Globally unique id of the registration, conventionally `type@instance`
    pub id: String,
    /// Transport address
    pub address: String,
    /// Free-form metadata published by the node
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Node {
    /// Creates a node without metadata
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            metadata: HashMap::new(),
        }
    }

    /// Returns a copy with an additional metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Metadata lookup
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.address)
    }
}

/// A logical service: a name plus the nodes currently providing it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name
    pub name: String,
    /// Service version
    #[serde(default)]
    pub version: String,
    /// Service-level metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Live nodes, in registry order
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Service {
    /// Creates a service with the given nodes
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            nodes,
            ..Self::default()
        }
    }
}
