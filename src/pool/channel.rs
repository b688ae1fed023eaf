use super::connection::ConnectionPool;
use super::error::{unhealthy, Error};
use deadpool::managed::{self, Manager};
use lapin::{options::ConfirmSelectOptions, Channel};

/// Channels used by the [`Publisher`](crate::publishers::Publisher).
pub type ChannelPool = managed::Pool<ChannelManager>;

/// Opens channels on connections checked out of a [`ConnectionPool`].
///
/// Channels are in confirm mode: the broker acks (or nacks) every publish.
pub struct ChannelManager {
    connections: ConnectionPool,
}

impl ChannelManager {
    pub fn new(connections: ConnectionPool) -> Self {
        Self { connections }
    }
}

#[async_trait::async_trait]
impl Manager for ChannelManager {
    type Type = Channel;
    type Error = Error;

    async fn create(&self) -> Result<Channel, Error> {
        let connection = self.connections.get().await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        tracing::debug!(channel_id = channel.id(), "Opened a publishing channel");
        Ok(channel)
    }

    async fn recycle(&self, channel: &mut Channel) -> managed::RecycleResult<Error> {
        let status = channel.status();
        if status.connected() {
            Ok(())
        } else {
            tracing::debug!(channel_id = channel.id(), "Discarding a broken publishing channel");
            Err(unhealthy("channel", status.state()))
        }
    }
}
