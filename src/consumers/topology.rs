//! Declaration of the broker objects the adapter consumes from.
use crate::configuration::TopologySettings;
use crate::consumers::hooks::pre_start::{
    Bind, DeclareDurableExchange, DeclareDurableQueue, ExchangeKind, ExchangeSetup,
    ExistingExchange, RoutingKey, Unbind, WithDeadLetterExchange, WithQueueMode,
};
use crate::consumers::{ConsumerPreStartHook, QueueMode, RoutingTable};
use amq_protocol_types::FieldTable;
use anyhow::Context;
use lapin::Channel;

/// What the broker must know about one queue of the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub name: String,
    pub routing_keys: Vec<String>,
    pub deprecated_routing_keys: Vec<String>,
    pub mode: Option<QueueMode>,
}

/// The pre-start hook chain that declares and binds this queue.
pub type QueueDeclaration =
    Bind<ExistingExchange, WithDeadLetterExchange<WithQueueMode<DeclareDurableQueue>>, Vec<RoutingKey>>;

impl QueueTopology {
    pub fn declaration(&self, task_exchange: &str, dead_letter_exchange: &str) -> QueueDeclaration {
        Bind {
            exchange: ExistingExchange {
                name: task_exchange.to_owned(),
            },
            queue: WithDeadLetterExchange {
                exchange: dead_letter_exchange.to_owned(),
                queue: WithQueueMode {
                    mode: self.mode,
                    queue: DeclareDurableQueue,
                },
            },
            binding: self
                .routing_keys
                .iter()
                .map(|key| RoutingKey::from(key.as_str()))
                .collect(),
        }
    }

    pub fn unbind(&self, task_exchange: &str) -> Unbind {
        Unbind {
            exchange: task_exchange.to_owned(),
            routing_keys: self
                .deprecated_routing_keys
                .iter()
                .map(|key| RoutingKey::from(key.as_str()))
                .collect(),
        }
    }
}

/// Sets up the exchanges, queues and bindings derived from a [`RoutingTable`]:
///
/// - a durable fanout dead letter exchange, with a durable error queue bound to it;
/// - a durable topic task exchange;
/// - for each queue of the routing table, a durable queue that dead-letters to the dead letter
///   exchange, bound to the task exchange with each of its routing keys;
/// - the removal of deprecated bindings.
///
/// Every step is idempotent: the bootstrap runs again after each reconnection.
#[derive(Debug, Clone)]
pub struct TopologyBootstrap {
    task_exchange: String,
    dead_letter_exchange: String,
    error_queue: String,
    queues: Vec<QueueTopology>,
}

impl TopologyBootstrap {
    pub fn new<C>(settings: &TopologySettings, routing_table: &RoutingTable<C>) -> Self
    where
        C: Send + Sync + 'static,
    {
        let queues = routing_table
            .queues()
            .map(|(name, routes)| QueueTopology {
                name: name.to_owned(),
                routing_keys: routes.routing_keys().map(str::to_owned).collect(),
                deprecated_routing_keys: routes.deprecated_routing_keys().to_vec(),
                mode: routes.mode(),
            })
            .collect();
        Self {
            task_exchange: settings.task_exchange.clone(),
            dead_letter_exchange: settings.dead_letter_exchange.clone(),
            error_queue: settings.error_queue.clone(),
            queues,
        }
    }

    pub fn task_exchange(&self) -> &str {
        &self.task_exchange
    }

    pub fn queues(&self) -> &[QueueTopology] {
        &self.queues
    }

    #[tracing::instrument(name = "topology_bootstrap", skip_all)]
    pub async fn run(&self, channel: &Channel) -> Result<(), anyhow::Error> {
        let dead_letter_path = Bind {
            exchange: DeclareDurableExchange {
                name: self.dead_letter_exchange.clone(),
                kind: ExchangeKind::Fanout,
            },
            queue: DeclareDurableQueue,
            binding: RoutingKey(String::new()),
        };
        dead_letter_path
            .run(channel, &self.error_queue, FieldTable::default())
            .await
            .context("Failed to declare the dead letter exchange and the error queue")?;

        DeclareDurableExchange {
            name: self.task_exchange.clone(),
            kind: ExchangeKind::Topic,
        }
        .setup_exchange(channel)
        .await
        .context("Failed to declare the task exchange")?;

        for queue in &self.queues {
            queue
                .declaration(&self.task_exchange, &self.dead_letter_exchange)
                .run(channel, &queue.name, FieldTable::default())
                .await
                .with_context(|| format!("Failed to declare queue '{}'", queue.name))?;
            if !queue.deprecated_routing_keys.is_empty() {
                queue
                    .unbind(&self.task_exchange)
                    .run(channel, &queue.name, FieldTable::default())
                    .await
                    .with_context(|| {
                        format!("Failed to remove deprecated bindings of '{}'", queue.name)
                    })?;
            }
        }
        tracing::info!(queues = self.queues.len(), "Broker topology is in place");
        Ok(())
    }
}
