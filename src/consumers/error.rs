use std::fmt;

/// The error type returned by message handlers.
///
/// It tells the [`Dispatcher`](crate::consumers::Dispatcher) how the broker should settle the
/// message (check out [`ErrorType`]) and carries the underlying cause for logging.
///
/// # Conversions
///
/// Any `anyhow::Error` converts into a `HandlerError` of type [`ErrorType::Unexpected`]:
/// using `?` on a foreign error inside a handler is how "anything else" escapes.
/// Use [`HandlerError::requeue`] and [`HandlerError::reject`] to signal the two designated
/// failure kinds explicitly.
#[derive(Debug)]
pub struct HandlerError {
    /// The underlying error returned by the message handler.
    pub inner_error: anyhow::Error,
    /// `error_type` distinguishes three classes of errors:
    /// - transient errors; message processing might succeed if the message is delivered again
    /// - terminal errors; no matter how many times you retry, processing will never succeed
    /// - unexpected errors; nobody classified them, they are treated as terminal
    ///
    /// Check out [`ErrorType`]'s documentation for more details.
    pub error_type: ErrorType,
}

impl HandlerError {
    /// A transient failure: the message is put back on its queue for redelivery.
    pub fn requeue(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Requeue,
        }
    }

    /// A terminal failure: the message is rejected and lands in the dead letter exchange.
    pub fn reject(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Reject,
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(inner_error: anyhow::Error) -> Self {
        Self {
            inner_error,
            error_type: ErrorType::Unexpected,
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner_error)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handling of a message failed due to a {} issue - {:#}",
            self.error_type, self.inner_error
        )
    }
}

/// Types of failure when handling a message.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    /// Message processing might succeed if the message is delivered again.
    ///
    /// E.g. a downstream API was unreachable or answered `503 Service Unavailable`.
    ///
    /// The message is nacked with `requeue = true`. No backoff or retry cap is applied here:
    /// rate limiting redeliveries is the job of the broker topology.
    Requeue,
    /// Message processing will never succeed, no matter how many times you retry.
    ///
    /// E.g. the message payload is malformed or fails validation.
    ///
    /// The message is rejected and dead-lettered.
    Reject,
    /// The handler failed with an error nobody classified (or panicked).
    ///
    /// Treated exactly like [`ErrorType::Reject`]: unknown failures must not loop forever.
    Unexpected,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requeue => write!(f, "transient"),
            Self::Reject => write!(f, "terminal"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}
