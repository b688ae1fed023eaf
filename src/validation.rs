//! Decoding and validation of inbound message bodies.
//!
//! Bodies are JSON documents. They are decoded into a typed schema with `serde_json` (unknown
//! fields are ignored) and then go through the business checks of [`Validate`].
//! Any failure is terminal: the message is rejected.
use crate::consumers::HandlerError;
use serde::de::DeserializeOwned;

/// Business checks that `serde` cannot express, e.g. a string field that must not be empty.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        self.iter().try_for_each(Validate::validate)
    }
}

impl Validate for serde_json::Value {}

impl Validate for serde_json::Map<String, serde_json::Value> {}

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Couldn't load message body")]
    Decode(#[source] serde_json::Error),
    #[error("Failed to validate message body: {0}")]
    Invalid(String),
}

impl ValidationError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Decode `body` as a `T` and validate it.
///
/// Both failure kinds are mapped to [`HandlerError::reject`]: redelivering a malformed message
/// will not fix it.
pub fn validate_message_body<T>(body: &[u8]) -> Result<T, HandlerError>
where
    T: DeserializeOwned + Validate,
{
    let message: T = serde_json::from_slice(body)
        .map_err(ValidationError::Decode)
        .map_err(HandlerError::reject)?;
    message.validate().map_err(HandlerError::reject)?;
    tracing::debug!("Successfully validated message body");
    Ok(message)
}
