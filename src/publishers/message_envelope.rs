use lapin::types::ShortString;
use lapin::BasicProperties;

/// A message to be published via [`Publisher`](super::Publisher).
#[derive(Debug, Clone, Default)]
pub struct MessageEnvelope {
    /// The body of the message - as a sequence of bytes.
    pub payload: Vec<u8>,
    /// The name of the exchange we are publishing the message to.
    pub exchange_name: String,
    /// The routing key used by the exchange to route the message to the bound queues.
    pub routing_key: String,
    /// AMQP properties attached to the message.
    pub properties: BasicProperties,
}

impl MessageEnvelope {
    pub fn new(
        exchange_name: impl Into<String>,
        routing_key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            payload: payload.into(),
            exchange_name: exchange_name.into(),
            routing_key: routing_key.into(),
            properties: BasicProperties::default(),
        }
    }

    /// Serialize `body` as the payload, with the `application/json` content type.
    pub fn json(
        exchange_name: impl Into<String>,
        routing_key: impl Into<String>,
        body: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(body)?;
        Ok(Self::new(exchange_name, routing_key, payload).with_content_type("application/json"))
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.properties = self
            .properties
            .with_content_type(ShortString::from(content_type));
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.properties = self
            .properties
            .with_correlation_id(ShortString::from(correlation_id));
        self
    }
}
