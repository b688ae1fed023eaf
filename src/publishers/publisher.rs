use crate::pool::ChannelPool;
use lapin::message::BasicReturnMessage;
use lapin::options::BasicPublishOptions;
use std::sync::Arc;
use task_local_extensions::Extensions;
use uuid::Uuid;

use crate::publishers::publisher_middleware::Next;
use crate::publishers::{MessageEnvelope, PublisherMiddleware};

/// A high-level interface to publish messages.
///
/// It supports middlewares which can be used for a variety of purposes (e.g. stamping the
/// current correlation id on outbound messages).
///
/// # Fault tolerance
///
/// Channels are taken from a [`ChannelPool`]: broken channels (and connections) are replaced
/// on demand.
///
/// # How do I build a `Publisher`?
///
/// The starting point is [`Publisher::builder`].
pub struct Publisher {
    /// Pooled channels are in confirm mode.
    channel_pool: ChannelPool,
    /// Timeout on publishing.
    timeout: std::time::Duration,
    /// The middleware chain that will be executed before publishing the message.
    middleware_chain: Vec<Arc<dyn PublisherMiddleware + 'static>>,
}

impl Publisher {
    pub fn builder(channel_pool: ChannelPool) -> PublisherBuilder {
        PublisherBuilder::new(channel_pool)
    }

    /// Publish a message to RabbitMq.
    ///
    /// Messages are published in mandatory mode: unroutable messages are reported as
    /// [`PublisherError::UnroutableMessage`].
    #[tracing::instrument(
        name = "publish",
        skip_all,
        fields(exchange = %envelope.exchange_name, routing_key = %envelope.routing_key)
    )]
    pub async fn publish(&self, envelope: MessageEnvelope) -> Result<(), PublisherError> {
        let options = BasicPublishOptions {
            mandatory: true,
            // The immediate flag was dropped in RabbitMQ 3.0 - setting `true` causes a
            // not-supported error
            immediate: false,
        };
        let mut extensions = Extensions::new();
        let envelope = inject_amqp_properties(envelope);

        let next = Next {
            channel_pool: self.channel_pool.clone(),
            timeout: self.timeout,
            next_middleware: self.middleware_chain.as_slice(),
            options,
        };
        next.run(envelope, &mut extensions).await
    }
}

/// Error returned when trying to publish a message using `Publisher`.
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] anyhow::Error),
    #[error("A middleware failed to process the message before publishing")]
    MiddlewareError(#[source] anyhow::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    TimeoutError,
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// A builder for [`Publisher`].
///
/// Use [`Publisher::builder`] as entrypoint.
pub struct PublisherBuilder {
    channel_pool: ChannelPool,
    timeout: std::time::Duration,
    middleware_chain: Vec<Arc<dyn PublisherMiddleware>>,
}

impl PublisherBuilder {
    fn new(channel_pool: ChannelPool) -> Self {
        Self {
            channel_pool,
            timeout: std::time::Duration::from_secs(3),
            middleware_chain: vec![],
        }
    }

    /// Timeout applied when attempting to publish a message, channel acquisition included.
    /// Defaults to 3 seconds if left unspecified.
    #[must_use]
    pub fn publish_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Middlewares are executed in the order they are registered: the first registered
    /// middleware executes first on the way in and last on the way out.
    ///
    /// Check out [`PublisherMiddleware`]'s documentation for more details.
    #[must_use]
    pub fn with_middleware<M: PublisherMiddleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware_chain.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> Publisher {
        Publisher {
            channel_pool: self.channel_pool,
            timeout: self.timeout,
            middleware_chain: self.middleware_chain,
        }
    }
}

/// Set a timestamp and a message id on the envelope, unless the caller already did.
fn inject_amqp_properties(mut envelope: MessageEnvelope) -> MessageEnvelope {
    let props = envelope.properties;
    let timestamp = props
        .timestamp()
        .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);
    let message_id = props
        .message_id()
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string().into());
    envelope.properties = props
        .with_timestamp(timestamp)
        .with_message_id(message_id);
    envelope
}
