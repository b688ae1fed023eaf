use crate::amqp::convenience::BasicPropertiesExt;
use crate::consumers::Acknowledger;
use std::sync::Arc;

/// A message delivered by the broker, waiting to be dispatched.
///
/// An `InboundMessage` is consumed exactly once by
/// [`Dispatcher::on_message`](crate::consumers::Dispatcher::on_message) and settled exactly once
/// with its [`Acknowledger`].
pub struct InboundMessage {
    /// The payload of the message in binary format.
    pub body: Vec<u8>,
    /// The routing key the message was published with.
    /// `None` if the broker delivered it without one.
    pub routing_key: Option<String>,
    /// The `correlation_id` AMQP property, if the publisher set it.
    pub correlation_id: Option<String>,
    /// The name of the queue the message was consumed from.
    ///
    /// Only used for logging: dispatch is driven by the routing key alone.
    pub queue_name: String,
    /// Whether this message was redelivered
    pub redelivered: bool,
    // Hidden from the public interface to stop a message being settled inside a handler.
    // AMQP forbids acking/rejecting the same delivery multiple times:
    // https://www.rabbitmq.com/amqp-0-9-1-reference.html#basic.ack.delivery-tag
    pub(crate) acker: Box<dyn Acknowledger>,
}

impl InboundMessage {
    /// Build a message from its raw parts.
    pub fn new(body: impl Into<Vec<u8>>, acker: impl Acknowledger) -> Self {
        Self {
            body: body.into(),
            routing_key: None,
            correlation_id: None,
            queue_name: String::new(),
            redelivered: false,
            acker: Box::new(acker),
        }
    }

    #[must_use]
    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_queue_name(mut self, queue_name: impl Into<String>) -> Self {
        self.queue_name = queue_name.into();
        self
    }

    /// Convert a lapin delivery consumed from `queue_name`.
    ///
    /// An empty routing key is treated as missing.
    pub fn from_delivery(delivery: lapin::message::Delivery, queue_name: &str) -> Self {
        let routing_key = Some(delivery.routing_key.as_str())
            .filter(|key| !key.is_empty())
            .map(str::to_owned);
        let correlation_id = delivery
            .properties
            .correlation_id_str()
            .map(str::to_owned);
        Self {
            body: delivery.data,
            routing_key,
            correlation_id,
            queue_name: queue_name.to_owned(),
            redelivered: delivery.redelivered,
            acker: Box::new(delivery.acker),
        }
    }
}

impl std::fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundMessage")
            .field("routing_key", &self.routing_key)
            .field("correlation_id", &self.correlation_id)
            .field("queue_name", &self.queue_name)
            .field("redelivered", &self.redelivered)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A dequeued message enriched with some auxiliary data, ready for processing.
///
/// `Incoming` is the input type of our message handler functions (check out
/// [`Handler`](crate::consumers::Handler)'s docs for more details).
pub struct Incoming<'a, C> {
    /// `context` is a set of resources that are required to process the message and are outside
    /// the lifecycle of the message itself - e.g. the HTTP clients for downstream APIs, the
    /// outbound publisher, etc.
    ///
    /// # Ownership
    ///
    /// The context is behind an `Arc` pointer: it is built once at startup and shared by every
    /// message (and by every consumer loop, if more than one is running).
    pub context: Arc<C>,
    /// The raw message payload.
    pub body: &'a [u8],
    /// The routing key that selected this handler.
    pub routing_key: &'a str,
    /// The correlation id attached to the processing of this message.
    pub correlation_id: &'a str,
}
