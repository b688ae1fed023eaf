//! Routing keys to handlers.
//!
//! A [`RoutingTable`] is the static description of what the adapter consumes:
//! queue name -> { routing key -> handler }, plus the deprecated bindings to remove at startup
//! and per-queue storage mode overrides.
//!
//! The [`HandlerRegistry`] is the flattened routing key -> handler lookup derived from it.
//! Dispatch never looks at the queue a message came from.
use crate::consumers::handler::{FnHandler, HandlerFn};
use crate::consumers::Handler;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Storage mode of a queue, applied as the `x-queue-mode` argument at declaration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Keep as many messages as possible on disk.
    Lazy,
    /// The broker default.
    Default,
}

impl QueueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lazy => "lazy",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for QueueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Routing key '{routing_key}' is routed by both '{first_queue}' and '{second_queue}'")]
    DuplicateRoutingKey {
        routing_key: String,
        first_queue: String,
        second_queue: String,
    },
    #[error("Queue '{0}' has a queue mode override but is not part of the routing table")]
    UnknownQueue(String),
}

/// Everything the adapter knows about one queue.
pub struct QueueRoutes<Context> {
    pub(crate) handlers: BTreeMap<String, Arc<dyn Handler<Context>>>,
    pub(crate) deprecated_routing_keys: Vec<String>,
    pub(crate) mode: Option<QueueMode>,
}

impl<Context> Default for QueueRoutes<Context> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
            deprecated_routing_keys: Vec::new(),
            mode: None,
        }
    }
}

impl<Context> QueueRoutes<Context> {
    /// The routing keys bound to this queue, in lexicographic order.
    pub fn routing_keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Routing keys that used to be bound to this queue and must be unbound at startup.
    pub fn deprecated_routing_keys(&self) -> &[String] {
        &self.deprecated_routing_keys
    }

    pub fn mode(&self) -> Option<QueueMode> {
        self.mode
    }
}

/// The immutable routing configuration of the adapter.
///
/// Use [`RoutingTable::builder`] to assemble one.
pub struct RoutingTable<Context> {
    queues: BTreeMap<String, QueueRoutes<Context>>,
}

impl<Context> RoutingTable<Context>
where
    Context: Send + Sync + 'static,
{
    pub fn builder() -> RoutingTableBuilder<Context> {
        RoutingTableBuilder {
            queues: BTreeMap::new(),
            registered_routes: Vec::new(),
            pending_modes: Vec::new(),
        }
    }

    /// Queue names, in lexicographic order.
    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    pub fn queues(&self) -> impl Iterator<Item = (&str, &QueueRoutes<Context>)> {
        self.queues.iter().map(|(name, routes)| (name.as_str(), routes))
    }

    pub fn queue(&self, queue_name: &str) -> Option<&QueueRoutes<Context>> {
        self.queues.get(queue_name)
    }

    /// Derive the flattened routing key -> handler lookup used for dispatch.
    pub fn handler_registry(&self) -> HandlerRegistry<Context> {
        let handlers = self
            .queues
            .values()
            .flat_map(|routes| routes.handlers.iter())
            .map(|(key, handler)| (key.clone(), Arc::clone(handler)))
            .collect();
        HandlerRegistry { handlers }
    }
}

/// A fluent builder for [`RoutingTable`].
///
/// Routing keys must be unique across the whole table: [`RoutingTableBuilder::build`]
/// fails otherwise.
pub struct RoutingTableBuilder<Context> {
    queues: BTreeMap<String, QueueRoutes<Context>>,
    // Every (queue, routing key) pair in registration order, to report duplicates at build time.
    registered_routes: Vec<(String, String)>,
    pending_modes: Vec<(String, QueueMode)>,
}

impl<Context> RoutingTableBuilder<Context>
where
    Context: Send + Sync + 'static,
{
    /// Declare a queue, even if no routing key is (any longer) routed to it.
    #[must_use]
    pub fn queue(mut self, queue_name: impl Into<String>) -> Self {
        self.queues.entry(queue_name.into()).or_default();
        self
    }

    /// Route `routing_key`, bound to `queue_name`, to `handler`.
    #[must_use]
    pub fn route<H: Handler<Context>>(
        self,
        queue_name: impl Into<String>,
        routing_key: impl Into<String>,
        handler: H,
    ) -> Self {
        self.dyn_route(queue_name, routing_key, Arc::new(handler))
    }

    /// Route `routing_key` to an async function - see [`HandlerFn`].
    #[must_use]
    pub fn route_fn<F>(
        self,
        queue_name: impl Into<String>,
        routing_key: impl Into<String>,
        handler: F,
    ) -> Self
    where
        F: for<'a> HandlerFn<'a, Context>,
    {
        self.route(queue_name, routing_key, FnHandler(handler))
    }

    /// A version of [`RoutingTableBuilder::route`] for already Arc-ed handlers.
    #[must_use]
    pub fn dyn_route(
        mut self,
        queue_name: impl Into<String>,
        routing_key: impl Into<String>,
        handler: Arc<dyn Handler<Context>>,
    ) -> Self {
        let queue_name = queue_name.into();
        let routing_key = routing_key.into();
        self.registered_routes
            .push((queue_name.clone(), routing_key.clone()));
        self.queues
            .entry(queue_name)
            .or_default()
            .handlers
            .insert(routing_key, handler);
        self
    }

    /// Remove an obsolete binding of `routing_key` to `queue_name` at startup.
    #[must_use]
    pub fn unbind(mut self, queue_name: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.queues
            .entry(queue_name.into())
            .or_default()
            .deprecated_routing_keys
            .push(routing_key.into());
        self
    }

    /// Override the storage mode of `queue_name`.
    #[must_use]
    pub fn queue_mode(mut self, queue_name: impl Into<String>, mode: QueueMode) -> Self {
        self.pending_modes.push((queue_name.into(), mode));
        self
    }

    pub fn build(self) -> Result<RoutingTable<Context>, RegistryError> {
        let Self {
            mut queues,
            registered_routes,
            pending_modes,
        } = self;

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (queue_name, routing_key) in &registered_routes {
            if let Some(first_queue) = owners.insert(routing_key, queue_name) {
                return Err(RegistryError::DuplicateRoutingKey {
                    routing_key: routing_key.clone(),
                    first_queue: first_queue.to_owned(),
                    second_queue: queue_name.clone(),
                });
            }
        }

        for (queue_name, mode) in pending_modes {
            match queues.get_mut(&queue_name) {
                Some(routes) => routes.mode = Some(mode),
                None => return Err(RegistryError::UnknownQueue(queue_name)),
            }
        }

        Ok(RoutingTable { queues })
    }
}

/// Routing key -> handler, resolved in O(1).
///
/// Built once from a [`RoutingTable`] and never mutated: share it behind an `Arc`.
pub struct HandlerRegistry<Context> {
    handlers: HashMap<String, Arc<dyn Handler<Context>>>,
}

impl<Context> HandlerRegistry<Context> {
    /// `None` if no handler is registered for `routing_key`.
    pub fn resolve(&self, routing_key: &str) -> Option<&Arc<dyn Handler<Context>>> {
        self.handlers.get(routing_key)
    }

    pub fn contains(&self, routing_key: &str) -> bool {
        self.handlers.contains_key(routing_key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
