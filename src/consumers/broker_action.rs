use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use std::fmt;

/// The action we asked the broker to take when finalising the processing of
/// the current message.
///
/// Exactly one `BrokerAction` is executed for every message the
/// [`Dispatcher`](crate::consumers::Dispatcher) receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAction {
    /// Positive acknowledgement - the message can be removed from the queue.
    Ack,
    /// Negative acknowledgement - the message was not processed successfully and should be requeued
    /// to retry processing.
    Requeue,
    /// Rejection. The message was not processed successfully and should NOT be requeued.
    /// The message will be sent to the dead letter exchange if configured.
    Reject,
}

impl fmt::Display for BrokerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ack"),
            Self::Requeue => write!(f, "requeue"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Settles a delivery with the broker.
///
/// Implemented for [`lapin::acker::Acker`]; tests plug in a recording implementation.
///
/// AMQP forbids settling the same delivery tag twice: the dispatcher guarantees a single call
/// to [`Acknowledger::settle`] per message.
#[async_trait::async_trait]
pub trait Acknowledger: Send + Sync + 'static {
    async fn settle(&self, action: BrokerAction) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl Acknowledger for lapin::acker::Acker {
    async fn settle(&self, action: BrokerAction) -> Result<(), anyhow::Error> {
        match action {
            // Acknowledge the message
            BrokerAction::Ack => self.ack(BasicAckOptions { multiple: false }).await?,

            // Put the message back to the queue
            BrokerAction::Requeue => {
                self.nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await?
            }

            // Remove the message from the queue and send it to the DLX (if configured)
            BrokerAction::Reject => self.reject(BasicRejectOptions { requeue: false }).await?,
        }
        Ok(())
    }
}
