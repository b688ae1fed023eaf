use crate::consumers::correlation::{self, new_correlation_id};
use crate::consumers::{
    BrokerAction, ErrorType, HandlerRegistry, Incoming, InboundMessage, LivenessMarker,
};
use futures_util::FutureExt;
use redact::Secret;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Turns delivered messages into handler invocations and handler outcomes into broker actions.
///
/// For every [`InboundMessage`] exactly one [`BrokerAction`] is decided and executed:
///
/// | Outcome                                   | Action                |
/// |-------------------------------------------|-----------------------|
/// | missing or unregistered routing key       | [`BrokerAction::Reject`]  |
/// | handler returned `Ok(())`                 | [`BrokerAction::Ack`]     |
/// | [`ErrorType::Requeue`]                    | [`BrokerAction::Requeue`] |
/// | [`ErrorType::Reject`]                     | [`BrokerAction::Reject`]  |
/// | [`ErrorType::Unexpected`] or a panic      | [`BrokerAction::Reject`]  |
///
/// Each message is processed inside a correlation scope (see
/// [`correlation`](crate::consumers::correlation)) and a `process_message` span.
///
/// The dispatcher is also where the transport reports connection lifecycle events, which
/// drive the [`LivenessMarker`].
pub struct Dispatcher<Context> {
    registry: Arc<HandlerRegistry<Context>>,
    context: Arc<Context>,
    liveness: LivenessMarker,
    log_message_bodies: bool,
}

impl<Context> Dispatcher<Context>
where
    Context: Send + Sync + 'static,
{
    /// If the registry or the context are already behind an `Arc` pointer, they won't be
    /// double-wrapped.
    pub fn new(
        registry: impl Into<Arc<HandlerRegistry<Context>>>,
        context: impl Into<Arc<Context>>,
        liveness: LivenessMarker,
    ) -> Self {
        Self {
            registry: registry.into(),
            context: context.into(),
            liveness,
            log_message_bodies: false,
        }
    }

    /// Message bodies can carry patient-identifiable data: they are logged redacted unless
    /// explicitly enabled.
    #[must_use]
    pub fn log_message_bodies(mut self, enabled: bool) -> Self {
        self.log_message_bodies = enabled;
        self
    }

    pub fn liveness(&self) -> &LivenessMarker {
        &self.liveness
    }

    /// Process one message and settle it with the broker.
    ///
    /// The correlation id is the `correlation_id` of the message, if set, or a freshly generated
    /// one. The previous correlation scope (if any) is visible again once this returns.
    ///
    /// It returns the action the broker was asked to take. If settling fails (e.g. the channel
    /// has just been closed) the failure is logged: the broker redelivers unsettled messages.
    pub async fn on_message(&self, message: InboundMessage) -> BrokerAction {
        let correlation_id = message
            .correlation_id
            .clone()
            .unwrap_or_else(new_correlation_id);
        let span = tracing::info_span!(
            "process_message",
            correlation_id = %correlation_id,
            routing_key = ?message.routing_key,
            queue_name = %message.queue_name,
            redelivered = message.redelivered,
        );

        let processing = async {
            let action = self.decide(&message, &correlation_id).await;
            if let Err(e) = message.acker.settle(action).await {
                tracing::error!(error.details = ?e, "Failed to {} message", action);
            }
            action
        };
        correlation::scope(correlation_id.clone(), processing.instrument(span)).await
    }

    async fn decide(&self, message: &InboundMessage, correlation_id: &str) -> BrokerAction {
        let resolved = message
            .routing_key
            .as_deref()
            .and_then(|key| self.registry.resolve(key).map(|handler| (key, handler)));
        let Some((routing_key, handler)) = resolved else {
            tracing::error!(
                "Received message with unknown routing key '{}'",
                message.routing_key.as_deref().unwrap_or("<none>")
            );
            return BrokerAction::Reject;
        };

        let body = String::from_utf8_lossy(&message.body);
        if self.log_message_bodies {
            tracing::debug!(message_body = %body, "Message body ({})", routing_key);
        } else {
            let body: Secret<String> = body.into_owned().into();
            tracing::debug!(message_body = ?body, "Message body ({})", routing_key);
        }

        let incoming = Incoming {
            context: Arc::clone(&self.context),
            body: &message.body,
            routing_key,
            correlation_id,
        };
        let outcome = AssertUnwindSafe(handler.handle(incoming))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!("Successfully processed message ({})", routing_key);
                BrokerAction::Ack
            }
            Ok(Err(e)) => match e.error_type {
                ErrorType::Requeue => {
                    tracing::error!(
                        error.message = %e,
                        error.details = ?e.inner_error,
                        "Requeueing message ({})",
                        routing_key
                    );
                    BrokerAction::Requeue
                }
                ErrorType::Reject => {
                    tracing::error!(
                        error.message = %e,
                        error.details = ?e.inner_error,
                        "Rejecting message ({})",
                        routing_key
                    );
                    BrokerAction::Reject
                }
                ErrorType::Unexpected => {
                    tracing::error!(
                        error.message = %e,
                        error.details = ?e.inner_error,
                        "Exception while processing message ({})",
                        routing_key
                    );
                    BrokerAction::Reject
                }
            },
            Err(panic) => {
                tracing::error!(
                    error.message = %panic_message(panic.as_ref()),
                    "Handler panicked while processing message ({})",
                    routing_key
                );
                BrokerAction::Reject
            }
        }
    }

    /// The connection to the broker has been lost: the transport is about to back off and
    /// reconnect.
    pub fn on_connection_error(&self, error: &anyhow::Error) {
        tracing::error!(error.details = ?error, "Connection to RabbitMq failed");
        self.liveness.mark_dead();
    }

    /// A (re)connection succeeded and queue consumption has resumed.
    pub fn on_connection_revived(&self) {
        tracing::info!("Connection to RabbitMq established, consuming");
        self.liveness.mark_alive();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
