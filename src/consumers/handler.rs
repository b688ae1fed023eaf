//! What a routing key resolves to.
use crate::consumers::{error::HandlerError, Incoming};
use std::future::Future;
use std::sync::Arc;

/// Business logic associated with a routing key.
///
/// Handlers only see the decoded [`Incoming`] message: settling it with the broker is the job of
/// the [`Dispatcher`](crate::consumers::Dispatcher), driven by the returned [`HandlerError`].
///
/// The same message can be handled more than once (requeues, redeliveries after a lost
/// connection): side effects should be idempotent where possible.
///
/// Most handlers are plain async functions, registered with
/// [`RoutingTableBuilder::route_fn`](crate::consumers::RoutingTableBuilder::route_fn).
#[async_trait::async_trait]
pub trait Handler<Context>: Send + Sync + 'static {
    async fn handle(&self, incoming: Incoming<'_, Context>) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
impl<Context, H> Handler<Context> for Arc<H>
where
    Context: Send + Sync + 'static,
    H: Handler<Context> + ?Sized,
{
    async fn handle(&self, incoming: Incoming<'_, Context>) -> Result<(), HandlerError> {
        H::handle(self, incoming).await
    }
}

/// Implemented for every function shaped like
/// ```ignore
/// async fn(incoming: Incoming<'_, Context>) -> Result<(), impl Into<HandlerError>>;
/// ```
///
/// The lifetime parameter ties the returned future to the borrowed message body.
pub trait HandlerFn<'a, Context>: Send + Sync + 'static {
    type Future: Future<Output = Result<(), Self::Error>> + Send + 'a;
    type Error: Into<HandlerError> + 'static;

    fn call(&'a self, incoming: Incoming<'a, Context>) -> Self::Future;
}

impl<'a, F, Fut, E, Context> HandlerFn<'a, Context> for F
where
    Context: 'static,
    F: Fn(Incoming<'a, Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'a,
    E: Into<HandlerError> + 'static,
{
    type Future = Fut;
    type Error = E;

    fn call(&'a self, incoming: Incoming<'a, Context>) -> Self::Future {
        self(incoming)
    }
}

/// Adapts a [`HandlerFn`] into a [`Handler`].
pub struct FnHandler<F>(pub F);

#[async_trait::async_trait]
impl<Context, F> Handler<Context> for FnHandler<F>
where
    Context: Send + Sync + 'static,
    F: for<'a> HandlerFn<'a, Context>,
{
    async fn handle(&self, incoming: Incoming<'_, Context>) -> Result<(), HandlerError> {
        self.0.call(incoming).await.map_err(Into::into)
    }
}
