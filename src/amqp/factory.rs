use crate::amqp::configuration::RabbitMqSettings;
use anyhow::Context;
use lapin::{
    tcp::{AMQPUriTcpExt, NativeTlsConnector},
    types::LongString,
    uri::{AMQPScheme, AMQPUri},
    Connection, ConnectionProperties,
};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens connections to the RabbitMq broker described by [`RabbitMqSettings`].
///
/// The consumer and the publisher each get their own factory, so that their connections can be
/// told apart by name in the management UI.
#[derive(Clone)]
pub struct ConnectionFactory {
    uri: AMQPUri,
    connection_name: String,
    connection_timeout: Duration,
    transport: Transport,
}

#[derive(Clone)]
enum Transport {
    Plain,
    Tls {
        connector: Arc<NativeTlsConnector>,
        /// Expected on the broker certificate.
        domain: String,
    },
}

impl ConnectionFactory {
    /// Fails if the TLS settings are invalid (e.g. an unparseable CA certificate).
    pub fn new_from_config(
        settings: &RabbitMqSettings,
        connection_name: impl Into<String>,
    ) -> Result<Self, anyhow::Error> {
        let transport = match (&settings.tls, settings.tls_domain()) {
            (Some(tls), Some(domain)) => {
                let mut builder = NativeTlsConnector::builder();
                if let Some(certificate) = tls.ca_certificate_chain()? {
                    builder.add_root_certificate(certificate);
                }
                let connector = builder
                    .build()
                    .context("Failed to build the TLS connector for RabbitMq")?;
                Transport::Tls {
                    connector: Arc::new(connector),
                    domain,
                }
            }
            _ => Transport::Plain,
        };
        Ok(Self {
            uri: settings.amqp_uri(),
            connection_name: connection_name.into(),
            connection_timeout: settings
                .connection_timeout()
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            transport,
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.transport, Transport::Tls { .. })
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Open a new connection, giving up after the configured connection timeout.
    #[tracing::instrument(
        name = "rabbitmq_connect",
        skip(self),
        fields(
            host = %self.uri.authority.host,
            connection_name = %self.connection_name,
            tls = self.is_tls()
        )
    )]
    pub async fn new_connection(&self) -> Result<Connection, anyhow::Error> {
        let properties = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_connection_name(LongString::from(self.connection_name.clone()));
        let connection = tokio::time::timeout(self.connection_timeout, self.connect(properties))
            .await
            .with_context(|| {
                format!(
                    "Timed out after {:?} while connecting to RabbitMq",
                    self.connection_timeout
                )
            })?
            .context("Failed to connect to RabbitMq")?;

        let connection_name = self.connection_name.clone();
        connection.on_error(move |e| {
            tracing::warn!(connection_name = %connection_name, "RabbitMq connection lost: {:?}", e);
        });
        Ok(connection)
    }

    async fn connect(&self, properties: ConnectionProperties) -> Result<Connection, lapin::Error> {
        match &self.transport {
            Transport::Plain => Connection::connect_uri(self.uri.clone(), properties).await,
            Transport::Tls { connector, domain } => {
                let connector = Arc::clone(connector);
                let domain = domain.clone();
                Connection::connector(
                    self.uri.clone(),
                    Box::new(move |uri| {
                        // TCP first, with the plain scheme, then the TLS handshake on top.
                        let mut plain = uri.clone();
                        plain.scheme = AMQPScheme::AMQP;
                        plain
                            .connect()
                            .and_then(|tcp| tcp.into_native_tls(&connector, &domain))
                    }),
                    properties,
                )
                .await
            }
        }
    }
}
