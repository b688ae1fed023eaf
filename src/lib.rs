//! `dhos-async-adapter` consumes task messages from RabbitMq, built on top of [`lapin`], and
//! turns them into calls to the downstream DHOS HTTP APIs.
//!
//! The moving parts:
//! - [`RoutingTable`](crate::consumers::RoutingTable) maps routing keys to
//!   [`Handler`](crate::consumers::Handler)s, queue by queue;
//! - [`Dispatcher`](crate::consumers::Dispatcher) runs the handler of each delivered message
//!   and acks, requeues or rejects it according to the outcome;
//! - [`Consumer`](crate::consumers::Consumer) owns the broker connection, sets up the topology
//!   and feeds deliveries to the dispatcher, reconnecting when needed;
//! - [`handlers::routing_table`] is the production routing table.
pub mod amqp;
pub mod clients;
pub mod configuration;
pub mod consumers;
pub mod handlers;
pub mod pool;
pub mod publishers;
pub mod telemetry;
pub mod validation;
