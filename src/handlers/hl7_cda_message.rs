use crate::consumers::{HandlerError, Incoming};
use crate::handlers::AdapterContext;
use crate::validation::{validate_message_body, Validate};
use serde::Deserialize;
use serde_json::json;

pub const ROUTING_KEY: &str = "dhos.423779001";

#[derive(Deserialize, Debug)]
struct Hl7CdaMessage {
    content: String,
}

impl Validate for Hl7CdaMessage {}

/// Hand an HL7v3 CDA document to the Connector API.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Processing HL7 CDA message ({})", ROUTING_KEY);
    let message: Hl7CdaMessage = validate_message_body(incoming.body)?;
    incoming
        .context
        .clients
        .connector
        .post_cda_message(json!({"type": "HL7v3CDA", "content": message.content}))
        .await
}
