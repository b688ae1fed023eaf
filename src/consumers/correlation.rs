//! Message-scoped correlation ids.
//!
//! Our implementation relies on task-local storage, making the current correlation id
//! available to handlers, HTTP clients and publisher middlewares without having to pass it
//! around explicitly. It keeps it "orthogonal" to the functional requirements.
//!
//! The id is only visible inside [`scope`]: when the scoped future completes, panics or is
//! dropped, the previous value (if any) is visible again.
#![allow(clippy::declare_interior_mutable_const)] // silence tokio::task_local warning

use std::future::Future;
use uuid::Uuid;

tokio::task_local! {
    static CORRELATION_ID: String;
}

/// Run `fut` with `correlation_id` as the current correlation id.
pub async fn scope<F: Future>(correlation_id: String, fut: F) -> F::Output {
    CORRELATION_ID.scope(correlation_id, fut).await
}

/// The correlation id of the message currently being processed.
///
/// It returns `None` outside of message processing.
pub fn current_correlation_id() -> Option<String> {
    CORRELATION_ID.try_with(Clone::clone).ok()
}

/// Synthesize a fresh correlation id for a message that arrived without one.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
