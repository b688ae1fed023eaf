//! Facilities to publish messages to a RabbitMq exchange. Check out [`Publisher`] as a starting
//! point, or [`OutboundPublisher`] for what handlers see of it.
mod message_envelope;
mod outbound;
mod publisher;
mod publisher_middleware;

pub use message_envelope::MessageEnvelope;
pub use outbound::{OutboundPublisher, TaskExchangePublisher};
pub use publisher::{Publisher, PublisherBuilder, PublisherError};
pub use publisher_middleware::{CorrelationIdMiddleware, Next, PublisherMiddleware};
