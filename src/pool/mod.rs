//! [`deadpool`] pools of connections and channels, for outbound publishing only.
//!
//! Channels share a few connections. An object found closed when checked out is dropped and
//! a new one opened in its place. The consumer owns its connection and does not use these pools.
use crate::amqp::ConnectionFactory;

mod channel;
mod connection;
mod error;

pub use channel::{ChannelManager, ChannelPool};
pub use connection::{ConnectionManager, ConnectionPool};
pub use error::Error;

/// Channels in confirm mode, opened on up to `max_connections` connections.
pub fn channel_pool(
    factory: ConnectionFactory,
    max_connections: usize,
    max_channels: usize,
) -> Result<ChannelPool, Error> {
    let connections = ConnectionPool::builder(ConnectionManager::new(factory))
        .max_size(max_connections)
        .build()?;
    let channels = ChannelPool::builder(ChannelManager::new(connections))
        .max_size(max_channels)
        .build()?;
    Ok(channels)
}
