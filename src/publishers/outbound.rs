use crate::publishers::{MessageEnvelope, Publisher, PublisherError};

/// How handlers publish derived messages.
///
/// Publishing is fire-and-forget from the point of view of the
/// [`Dispatcher`](crate::consumers::Dispatcher): it is not tracked as part of the delivery
/// outcome, the handler decides what a failure means (usually a requeue).
#[async_trait::async_trait]
pub trait OutboundPublisher: Send + Sync + 'static {
    async fn publish_json(
        &self,
        routing_key: &str,
        body: &serde_json::Value,
    ) -> Result<(), PublisherError>;
}

/// Publishes JSON messages to the task exchange, the one the adapter itself consumes from.
pub struct TaskExchangePublisher {
    publisher: Publisher,
    exchange_name: String,
}

impl TaskExchangePublisher {
    pub fn new(publisher: Publisher, exchange_name: impl Into<String>) -> Self {
        Self {
            publisher,
            exchange_name: exchange_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl OutboundPublisher for TaskExchangePublisher {
    async fn publish_json(
        &self,
        routing_key: &str,
        body: &serde_json::Value,
    ) -> Result<(), PublisherError> {
        let envelope = MessageEnvelope::json(&self.exchange_name, routing_key, body)
            .map_err(|e| PublisherError::GenericError(e.into()))?;
        self.publisher.publish(envelope).await?;
        tracing::info!("Published message with routing key '{}'", routing_key);
        Ok(())
    }
}
