use deadpool::managed::{BuildError, PoolError, RecycleError};
use std::fmt::Debug;

/// Failure to provide a healthy connection or channel.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] anyhow::Error);

impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        Self(anyhow::Error::new(err).context("RabbitMq refused to open the connection or channel"))
    }
}

impl From<PoolError<Error>> for Error {
    fn from(err: PoolError<Error>) -> Self {
        match err {
            PoolError::Backend(e) => e,
            PoolError::Timeout(kind) => {
                Self(anyhow::anyhow!("Timed out waiting on the pool ({kind:?})"))
            }
            err => Self(anyhow::anyhow!("Pool unavailable: {}", err)),
        }
    }
}

impl From<BuildError<Error>> for Error {
    fn from(err: BuildError<Error>) -> Self {
        Self(anyhow::anyhow!("Invalid pool configuration: {}", err))
    }
}

/// Evict a pooled object the broker no longer considers open.
pub(super) fn unhealthy(kind: &str, state: impl Debug) -> RecycleError<Error> {
    RecycleError::Message(format!("Pooled {kind} is in state {state:?}"))
}
