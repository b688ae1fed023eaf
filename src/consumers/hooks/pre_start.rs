//! Building blocks for [`ConsumerPreStartHook`] chains.
//!
//! Wrappers such as [`WithDeadLetterExchange`] add their arguments to the queue arguments and
//! delegate to the hook that declares the queue, usually [`DeclareDurableQueue`]. [`Bind`] ties
//! a queue to an exchange.
//!
//! ```
//! use dhos_async_adapter::consumers::hooks::pre_start::{
//!     Bind, DeclareDurableQueue, ExistingExchange, RoutingKey, WithDeadLetterExchange,
//! };
//!
//! // The audit queue, bound to the task exchange with the audit routing key.
//! let audit_queue = Bind {
//!     exchange: ExistingExchange { name: "dhos".into() },
//!     queue: WithDeadLetterExchange {
//!         exchange: "dhos-dlx".into(),
//!         queue: DeclareDurableQueue,
//!     },
//!     binding: vec![RoutingKey::from("dhos.34837004")],
//! };
//! # drop(audit_queue);
//! ```
use crate::consumers::{ConsumerPreStartHook, QueueMode};
use amq_protocol_types::{AMQPValue, FieldTable, LongString};
use async_trait::async_trait;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::Channel;
pub use lapin::ExchangeKind;

pub const DEAD_LETTER_EXCHANGE_ARGUMENT: &str = "x-dead-letter-exchange";
pub const QUEUE_MODE_ARGUMENT: &str = "x-queue-mode";

/// The exchange side of a [`Bind`].
#[async_trait]
pub trait ExchangeSetup: Send + Sync + 'static {
    fn exchange_name(&self) -> &str;

    /// Make sure the exchange exists.
    async fn setup_exchange(&self, channel: &Channel) -> Result<(), anyhow::Error>;
}

/// A durable, non auto-deleted exchange.
pub struct DeclareDurableExchange {
    pub name: String,
    pub kind: ExchangeKind,
}

#[async_trait]
impl ExchangeSetup for DeclareDurableExchange {
    fn exchange_name(&self) -> &str {
        &self.name
    }

    async fn setup_exchange(&self, channel: &Channel) -> Result<(), anyhow::Error> {
        let options = ExchangeDeclareOptions {
            durable: true,
            ..ExchangeDeclareOptions::default()
        };
        channel
            .exchange_declare(&self.name, self.kind.clone(), options, FieldTable::default())
            .await?;
        tracing::debug!(exchange = %self.name, kind = ?self.kind, "Declared exchange");
        Ok(())
    }
}

/// An exchange declared by an earlier step of the bootstrap.
pub struct ExistingExchange {
    pub name: String,
}

#[async_trait]
impl ExchangeSetup for ExistingExchange {
    fn exchange_name(&self) -> &str {
        &self.name
    }

    async fn setup_exchange(&self, _channel: &Channel) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

fn with_argument(mut queue_args: FieldTable, name: &str, value: &str) -> FieldTable {
    queue_args.insert(name.into(), AMQPValue::LongString(LongString::from(value)));
    queue_args
}

/// Rejected messages of the queue are re-published to `exchange`
/// (see [dead letter exchanges](https://www.rabbitmq.com/dlx.html)).
///
/// Queue arguments are immutable: an existing queue keeps the dead letter exchange it was
/// declared with, and redeclaring it with another one fails.
pub struct WithDeadLetterExchange<H: ConsumerPreStartHook> {
    pub exchange: String,
    pub queue: H,
}

impl<H: ConsumerPreStartHook> WithDeadLetterExchange<H> {
    pub fn queue_arguments(&self, queue_args: FieldTable) -> FieldTable {
        with_argument(queue_args, DEAD_LETTER_EXCHANGE_ARGUMENT, &self.exchange)
    }
}

#[async_trait]
impl<H: ConsumerPreStartHook> ConsumerPreStartHook for WithDeadLetterExchange<H> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        self.queue
            .run(channel, queue_name, self.queue_arguments(queue_args))
            .await
    }
}

/// Overrides the storage mode of the queue. `None` keeps the broker default.
pub struct WithQueueMode<H: ConsumerPreStartHook> {
    pub mode: Option<QueueMode>,
    pub queue: H,
}

impl<H: ConsumerPreStartHook> WithQueueMode<H> {
    pub fn queue_arguments(&self, queue_args: FieldTable) -> FieldTable {
        match self.mode {
            Some(mode) => with_argument(queue_args, QUEUE_MODE_ARGUMENT, mode.as_str()),
            None => queue_args,
        }
    }
}

#[async_trait]
impl<H: ConsumerPreStartHook> ConsumerPreStartHook for WithQueueMode<H> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        self.queue
            .run(channel, queue_name, self.queue_arguments(queue_args))
            .await
    }
}

/// Set up `exchange`, declare the queue with `queue`, then bind them with `binding`.
pub struct Bind<Exchange: ExchangeSetup, Queue: ConsumerPreStartHook, Binds: Binding> {
    pub exchange: Exchange,
    pub queue: Queue,
    pub binding: Binds,
}

#[async_trait]
impl<E, Q, B> ConsumerPreStartHook for Bind<E, Q, B>
where
    E: ExchangeSetup,
    Q: ConsumerPreStartHook,
    B: Binding,
{
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        self.exchange.setup_exchange(channel).await?;
        self.queue.run(channel, queue_name, queue_args).await?;
        self.binding
            .bind(channel, self.exchange.exchange_name(), queue_name)
            .await
    }
}

/// Removes bindings of the queue that are no longer routed.
///
/// RabbitMq treats the removal of a missing binding as a success.
pub struct Unbind {
    pub exchange: String,
    pub routing_keys: Vec<RoutingKey>,
}

#[async_trait]
impl ConsumerPreStartHook for Unbind {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        _queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        for RoutingKey(routing_key) in &self.routing_keys {
            tracing::info!(
                "Unbinding routing key '{}' from queue '{}'",
                routing_key,
                queue_name
            );
            channel
                .queue_unbind(queue_name, &self.exchange, routing_key, FieldTable::default())
                .await?;
        }
        Ok(())
    }
}

/// Declares a durable queue with the arguments accumulated by the wrapping hooks.
#[derive(Clone, Copy, Debug)]
pub struct DeclareDurableQueue;

#[async_trait]
impl ConsumerPreStartHook for DeclareDurableQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        let queue = channel.queue_declare(queue_name, options, queue_args).await?;
        tracing::debug!(
            queue = queue_name,
            messages = queue.message_count(),
            "Declared queue"
        );
        Ok(())
    }
}

/// The binding side of a [`Bind`]: a single [`RoutingKey`] or a `Vec` of them.
#[async_trait]
pub trait Binding: Send + Sync + 'static {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingKey(pub String);

impl From<&str> for RoutingKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[async_trait]
impl Binding for RoutingKey {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_bind(
                queue_name,
                exchange_name,
                &self.0,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<B: Binding> Binding for Vec<B> {
    async fn bind(
        &self,
        channel: &Channel,
        exchange_name: &str,
        queue_name: &str,
    ) -> Result<(), anyhow::Error> {
        for binding in self {
            binding.bind(channel, exchange_name, queue_name).await?;
        }
        Ok(())
    }
}
