use super::error::{unhealthy, Error};
use crate::amqp::ConnectionFactory;
use deadpool::managed::{self, Manager};
use lapin::Connection;

/// The connections publishing channels are opened on.
pub type ConnectionPool = managed::Pool<ConnectionManager>;

/// Opens broker connections for a [`ConnectionPool`].
pub struct ConnectionManager {
    factory: ConnectionFactory,
}

impl ConnectionManager {
    pub fn new(factory: ConnectionFactory) -> Self {
        Self { factory }
    }
}

#[async_trait::async_trait]
impl Manager for ConnectionManager {
    type Type = Connection;
    type Error = Error;

    async fn create(&self) -> Result<Connection, Error> {
        let connection = self.factory.new_connection().await?;
        tracing::info!("Opened a publishing connection to RabbitMq");
        Ok(connection)
    }

    async fn recycle(&self, connection: &mut Connection) -> managed::RecycleResult<Error> {
        let status = connection.status();
        if status.connected() {
            Ok(())
        } else {
            Err(unhealthy("connection", status.state()))
        }
    }
}
