use crate::clients::api_client::to_json;
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::AdapterContext;
use crate::validation::{validate_message_body, Validate};
use serde::{Deserialize, Serialize};

pub const ROUTING_KEY: &str = "dhos.DM000017";

/// The emails the Notifications API knows how to send.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
enum EmailType {
    #[serde(rename = "WELCOME_EMAIL")]
    Welcome,
}

#[derive(Deserialize, Serialize, Debug)]
struct EmailNotificationRequest {
    email_address: String,
    email_type: EmailType,
}

impl Validate for EmailNotificationRequest {}

/// Ask the Notifications API to send an email.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received 'send email' message ({})", ROUTING_KEY);
    let email: EmailNotificationRequest = validate_message_body(incoming.body)?;
    incoming
        .context
        .clients
        .notifications
        .create_email(to_json(&email)?)
        .await
}
