use crate::amqp::ConnectionFactory;
use crate::consumers::topology::TopologyBootstrap;
use crate::consumers::{Dispatcher, InboundMessage};
use amq_protocol_types::FieldTable;
use anyhow::Context;
use futures_util::{stream, StreamExt};
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use shutdown_handler::ShutdownHandler;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The long-running RabbitMq consumer of the adapter.
///
/// A `Consumer` owns one connection with a single channel at a time. On that channel it
/// - limits the number of unacknowledged messages to `prefetch_count` (1 by default);
/// - sets up the broker topology, via [`TopologyBootstrap`];
/// - consumes every queue of the routing table, processing deliveries sequentially with
///   [`Dispatcher::on_message`]: there is never more than one message in flight.
///
/// When the connection (or the channel) breaks, the dispatcher is notified with
/// [`Dispatcher::on_connection_error`], the consumer waits `reconnect_interval` and starts
/// over. [`Dispatcher::on_connection_revived`] is invoked once consumption has resumed.
pub struct Consumer<C> {
    connection_factory: ConnectionFactory,
    topology: TopologyBootstrap,
    dispatcher: Arc<Dispatcher<C>>,
    prefetch_count: u16,
    reconnect_interval: Duration,
    /// The consumer will process messages indefinitely if set to `None`.
    exit_after: Option<usize>,
}

impl<C> Consumer<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(
        connection_factory: ConnectionFactory,
        topology: TopologyBootstrap,
        dispatcher: impl Into<Arc<Dispatcher<C>>>,
    ) -> Self {
        Self {
            connection_factory,
            topology,
            dispatcher: dispatcher.into(),
            prefetch_count: 1,
            reconnect_interval: Duration::from_secs(5),
            exit_after: None,
        }
    }

    #[must_use]
    pub fn prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// How long to wait before reconnecting after a connection error.
    #[must_use]
    pub fn reconnect_interval(mut self, reconnect_interval: Duration) -> Self {
        self.reconnect_interval = reconnect_interval;
        self
    }

    /// Stop after having processed `n` messages, across reconnections.
    #[must_use]
    pub fn exit_after(mut self, n: usize) -> Self {
        self.exit_after = Some(n);
        self
    }

    /// Consume until the process receives SIGTERM.
    ///
    /// You usually want to invoke `run_until_stopped` at the end of your `main` function.
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        self.run_until_shutdown(ShutdownHandler::sigterm()?).await
    }

    /// `run_until_shutdown` only returns if a shutdown signal is received, once `exit_after`
    /// messages have been processed or if there is nothing to consume.
    /// Connection errors are retried forever.
    #[tracing::instrument(skip_all, name = "consumer_run")]
    pub async fn run_until_shutdown(
        self,
        shutdown: Arc<ShutdownHandler>,
    ) -> Result<(), anyhow::Error> {
        if self.topology.queues().is_empty() {
            anyhow::bail!("The routing table does not contain any queue to consume from");
        }

        let mut processed = 0;
        loop {
            let error = match self.consume(&shutdown, &mut processed).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            self.dispatcher.on_connection_error(&error);

            tokio::select! {
                biased;

                _ = shutdown.wait_for_signal() => {
                    tracing::info!("Consumer received shutdown event while reconnecting");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.reconnect_interval) => {
                    tracing::info!("Reconnecting to RabbitMq");
                }
            }
        }
    }

    /// One connection lifetime.
    ///
    /// `Ok` means the consumer has been asked to stop, `Err` that the connection must be
    /// re-established.
    async fn consume(
        &self,
        shutdown: &ShutdownHandler,
        processed: &mut usize,
    ) -> Result<(), anyhow::Error> {
        let connection = self
            .connection_factory
            .new_connection()
            .await
            .context("Failed to connect to RabbitMq")?;
        let channel = connection
            .create_channel()
            .await
            .context("Failed to open a channel")?;
        channel
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await
            .context("Failed to set the prefetch count")?;

        self.topology.run(&channel).await?;

        let mut consumers = Vec::with_capacity(self.topology.queues().len());
        for queue in self.topology.queues() {
            let consumer = channel
                .basic_consume(
                    &queue.name,
                    &format!("{}-{}", queue.name, Uuid::new_v4()),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .with_context(|| format!("Failed to start consuming from '{}'", queue.name))?;
            let queue_name = queue.name.clone();
            consumers.push(consumer.map(move |delivery| (queue_name.clone(), delivery)));
        }
        let mut deliveries = stream::select_all(consumers);
        self.dispatcher.on_connection_revived();

        let result = loop {
            // have we consumed all the messages we want?
            if self.exit_after == Some(*processed) {
                break Ok(());
            }

            tokio::select! {
                // prefer the handling of shutdowns before going on with processing more messages
                biased;

                _ = shutdown.wait_for_signal() => {
                    tracing::info!("Consumer received shutdown event");
                    break Ok(());
                }

                delivery = deliveries.next() => match delivery {
                    None => break Err(anyhow::anyhow!("The broker cancelled all our consumers")),
                    Some((queue_name, Err(e))) => {
                        break Err(anyhow::Error::from(e)
                            .context(format!("Failed to consume from '{queue_name}'")))
                    }
                    Some((queue_name, Ok(delivery))) => {
                        let message = InboundMessage::from_delivery(delivery, &queue_name);
                        self.dispatcher.on_message(message).await;
                        *processed += 1;
                    }
                }
            }
        };

        if result.is_ok() {
            if let Err(e) = connection.close(200, "Consumer stopped").await {
                tracing::warn!("Failed to close the connection to RabbitMq: {}", e);
            }
        }
        result
    }
}
