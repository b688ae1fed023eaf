use crate::{
    amqp::convenience::BasicPropertiesExt,
    consumers::correlation::current_correlation_id,
    pool::ChannelPool,
    publishers::{MessageEnvelope, PublisherError},
};
use lapin::{
    options::BasicPublishOptions, publisher_confirm::Confirmation, BasicProperties, Channel,
};
use std::sync::Arc;
use task_local_extensions::Extensions;

#[async_trait::async_trait]
/// Middlewares to execute logic before and after a message is published by [`Publisher`].
///
/// # Extensions
///
/// `extensions` can be used to store values that are needed in this middleware on the way
/// back, after having called [`Next::run`], or should be shared with other middlewares downstream.
///
/// [`Publisher`]: super::Publisher
pub trait PublisherMiddleware: Send + Sync {
    async fn handle(
        &self,
        envelope: MessageEnvelope,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<(), PublisherError>;
}

/// The remainder of the publishing middleware chain, including the final publishing action.
#[allow(missing_debug_implementations)]
pub struct Next<'a> {
    pub(super) channel_pool: ChannelPool,
    pub(super) timeout: std::time::Duration,
    pub(super) next_middleware: &'a [Arc<dyn PublisherMiddleware>],
    pub(super) options: BasicPublishOptions,
}

impl<'a> Next<'a> {
    /// Asynchronously execute the remaining middleware chain, then publish.
    pub async fn run(
        mut self,
        envelope: MessageEnvelope,
        extensions: &mut Extensions,
    ) -> Result<(), PublisherError> {
        if let Some((current, next)) = self.next_middleware.split_first() {
            self.next_middleware = next;
            return current.handle(envelope, extensions, self).await;
        }

        // Channel acquisition and publishing share the same timeout.
        let publish_future = async move {
            let channel = self
                .channel_pool
                .get()
                .await
                .map_err(|e| {
                    PublisherError::GenericError(anyhow::anyhow!(
                        "Failed to acquire a healthy channel from the pool: {}",
                        e
                    ))
                })?;
            publish(&channel, envelope, self.options).await
        };

        match tokio::time::timeout(self.timeout, publish_future).await {
            Ok(result) => result,
            Err(_) => Err(PublisherError::TimeoutError),
        }
    }
}

/// Publish a persistent message and wait for the publisher confirmation from the broker.
///
/// With the mandatory flag, the broker returns messages it cannot route to any queue
/// (reply code 312 - NO_ROUTE) instead of silently dropping them.
async fn publish(
    channel: &Channel,
    envelope: MessageEnvelope,
    options: BasicPublishOptions,
) -> Result<(), PublisherError> {
    let MessageEnvelope {
        payload,
        exchange_name,
        routing_key,
        properties,
    } = envelope;
    // Delivery mode: Non-persistent (1) or persistent (2).
    let properties: BasicProperties = properties.with_delivery_mode(2);

    let confirm = channel
        .basic_publish(&exchange_name, &routing_key, options, &payload, properties)
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?;

    match confirm {
        Confirmation::Ack(Some(returned)) if returned.reply_code == 312 => {
            Err(PublisherError::UnroutableMessage(returned))
        }
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        Confirmation::Nack(nack) => Err(PublisherError::NegativeAck(nack)),
    }
}

/// Stamps the correlation id of the message being processed on outbound messages that do not
/// carry one, so that derived messages can be traced back to their origin.
///
/// Outside of message processing the envelope goes through untouched.
pub struct CorrelationIdMiddleware;

impl CorrelationIdMiddleware {
    pub(crate) fn stamp(envelope: MessageEnvelope) -> MessageEnvelope {
        if envelope.properties.correlation_id_str().is_some() {
            return envelope;
        }
        match current_correlation_id() {
            Some(correlation_id) => envelope.with_correlation_id(&correlation_id),
            None => envelope,
        }
    }
}

#[async_trait::async_trait]
impl PublisherMiddleware for CorrelationIdMiddleware {
    async fn handle(
        &self,
        envelope: MessageEnvelope,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<(), PublisherError> {
        next.run(Self::stamp(envelope), extensions).await
    }
}
