//! Facilities to consume messages from RabbitMq queues and dispatch them to handlers.
//! Check out [`RoutingTable`] and [`Dispatcher`] as starting points.
pub use broker_action::{Acknowledger, BrokerAction};
pub use consumer::Consumer;
pub use dispatcher::Dispatcher;
pub use error::{ErrorType, HandlerError};
pub use handler::{FnHandler, Handler, HandlerFn};
pub use incoming_message::{InboundMessage, Incoming};
pub use liveness::LivenessMarker;
pub use pre_start_hook::ConsumerPreStartHook;
pub use registry::{
    HandlerRegistry, QueueMode, QueueRoutes, RegistryError, RoutingTable, RoutingTableBuilder,
};

mod broker_action;
mod consumer;
pub mod correlation;
mod dispatcher;
mod error;
mod handler;
pub mod hooks;
mod incoming_message;
mod liveness;
mod pre_start_hook;
mod registry;
pub mod topology;
