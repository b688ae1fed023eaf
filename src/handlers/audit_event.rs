use crate::clients::api_client::to_json;
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::AdapterContext;
use crate::validation::{validate_message_body, Validate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ROUTING_KEY: &str = "dhos.34837004";

#[derive(Deserialize, Serialize, Debug)]
struct AuditEvent {
    event_type: String,
    event_data: Map<String, Value>,
}

impl Validate for AuditEvent {}

/// Forward an audit event to the Audit API.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received audit message ({})", ROUTING_KEY);
    let event: AuditEvent = validate_message_body(incoming.body)?;
    incoming
        .context
        .clients
        .audit
        .create_audit_event(to_json(&event)?)
        .await
}
