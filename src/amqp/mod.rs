//! Connecting to RabbitMq: settings, the connection factory and helpers over `lapin` types.
pub mod configuration;
pub mod convenience;
mod factory;

pub use factory::ConnectionFactory;
pub use lapin::BasicProperties;
