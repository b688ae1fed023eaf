use anyhow::Context;
use dhos_async_adapter::amqp::ConnectionFactory;
use dhos_async_adapter::clients::Clients;
use dhos_async_adapter::configuration::Settings;
use dhos_async_adapter::consumers::topology::TopologyBootstrap;
use dhos_async_adapter::consumers::{Consumer, Dispatcher, LivenessMarker};
use dhos_async_adapter::handlers::{self, AdapterContext, Deployment};
use dhos_async_adapter::pool::channel_pool;
use dhos_async_adapter::publishers::{CorrelationIdMiddleware, Publisher, TaskExchangePublisher};
use dhos_async_adapter::telemetry;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable pointing at the configuration file.
const CONFIG_FILE_ENV: &str = "ADAPTER_CONFIG_FILE";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config_file = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_FILE_ENV))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("configuration.yaml"));
    let settings = Settings::load(Some(config_file.as_path())).context("Failed to load settings")?;
    telemetry::init_subscriber(&settings.log)?;
    tracing::info!(
        config_file = %config_file.display(),
        version = env!("CARGO_PKG_VERSION"),
        "Starting up"
    );

    let consumer_factory =
        ConnectionFactory::new_from_config(&settings.rabbitmq, "dhos-async-adapter-consumer")?;
    let publisher_factory =
        ConnectionFactory::new_from_config(&settings.rabbitmq, "dhos-async-adapter-publisher")?;

    let publisher = Publisher::builder(channel_pool(publisher_factory, 1, 10)?)
        .with_middleware(CorrelationIdMiddleware)
        .build();
    let context = AdapterContext {
        clients: Clients::from_settings(&settings.apis)?,
        publisher: Arc::new(TaskExchangePublisher::new(
            publisher,
            settings.topology.task_exchange.clone(),
        )),
        deployment: Deployment::from(&settings.apis),
    };

    let routing_table = handlers::routing_table()?;
    let topology = TopologyBootstrap::new(&settings.topology, &routing_table);

    let mut liveness = LivenessMarker::new();
    if let Some(path) = &settings.consumer.liveness_file {
        liveness = liveness.with_sentinel_file(path);
    }
    let dispatcher = Dispatcher::new(routing_table.handler_registry(), context, liveness)
        .log_message_bodies(settings.consumer.log_message_bodies);

    Consumer::new(consumer_factory, topology, dispatcher)
        .prefetch_count(settings.consumer.prefetch_count)
        .reconnect_interval(settings.consumer.reconnect_interval())
        .run_until_stopped()
        .await
}
