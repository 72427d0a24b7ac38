//! Routing expressions: `type` (load-balanced) or `type@id` (pinned).

use crate::directory::SessionDirectory;
use crate::error::CoreResult;
use crate::selector::SelectOptions;
use crate::session::ServerSession;
use std::sync::Arc;
use svcmesh_config::ROUTE_SEPARATOR;
use tracing::trace;

/// Rewrites a routing expression before it is resolved
pub type MapRoute = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Parsed routing expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget<'a> {
    /// Pinned to the node whose id is the whole expression
    Pinned(&'a str),
    /// Load-balanced over the nodes of a service type
    Typed(&'a str),
}

impl<'a> RouteTarget<'a> {
    /// Parses an expression.
    ///
    /// Exactly one separator with a non-empty right side pins the route; any
    /// other shape routes by the text before the first separator.
    pub fn parse(expression: &'a str) -> Self {
        let mut parts = expression.split(ROUTE_SEPARATOR);
        let service = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (Some(id), None) if !id.is_empty() => RouteTarget::Pinned(expression),
            _ => RouteTarget::Typed(service),
        }
    }
}

/// Resolves routing expressions through a [`SessionDirectory`]
#[derive(Clone)]
pub struct Router {
    directory: Arc<SessionDirectory>,
    map_route: Option<MapRoute>,
}

impl Router {
    /// Creates a router without a rewrite hook
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self {
            directory,
            map_route: None,
        }
    }

    /// Installs a rewrite hook, applied once per route
    pub fn with_map_route(mut self, map_route: MapRoute) -> Self {
        self.map_route = Some(map_route);
        self
    }

    /// The directory behind this router
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Resolves `expression` to a session
    pub fn route(
        &self,
        expression: &str,
        options: &SelectOptions,
    ) -> CoreResult<Arc<dyn ServerSession>> {
        let mapped;
        let expression = match &self.map_route {
            Some(map_route) => {
                mapped = map_route(expression);
                trace!(from = expression, to = %mapped, "route mapped");
                mapped.as_str()
            }
            None => expression,
        };

        match RouteTarget::parse(expression) {
            RouteTarget::Pinned(id) => self.directory.resolve_by_id(id),
            RouteTarget::Typed(service) => self.directory.resolve_one(service, options),
        }
    }
}
