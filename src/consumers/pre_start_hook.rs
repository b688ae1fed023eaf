use amq_protocol_types::FieldTable;
use lapin::Channel;

#[async_trait::async_trait]
/// A hook to execute logic against the broker before the adapter starts consuming from a queue.
///
/// # Use case
///
/// The adapter consumes from queues bound to a shared task exchange. Who is in charge of
/// creating the queue? What about the exchange and the bindings?
///
/// The adapter owns the objects it relies on: on every (re)connection the
/// [`TopologyBootstrap`] runs a chain of pre-start hooks for each queue of the routing table.
/// Declarations are idempotent, so running them again after a reconnection is harmless.
///
/// `queue_args` flows down the chain: wrappers (e.g. [`WithDeadLetterExchange`]) add their
/// arguments and delegate to the hook that actually declares the queue.
///
/// [`TopologyBootstrap`]: crate::consumers::topology::TopologyBootstrap
/// [`WithDeadLetterExchange`]: crate::consumers::hooks::pre_start::WithDeadLetterExchange
pub trait ConsumerPreStartHook: Send + Sync + 'static {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error>;
}
