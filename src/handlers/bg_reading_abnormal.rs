use crate::consumers::{HandlerError, Incoming};
use crate::handlers::AdapterContext;
use crate::validation::{validate_message_body, Validate};
use serde::Deserialize;

pub const ROUTING_KEY: &str = "gdm.166922008";

#[derive(Deserialize, Debug)]
struct AbnormalBgReading {
    uuid: String,
}

impl Validate for AbnormalBgReading {}

pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received 'abnormal BG reading' message ({})", ROUTING_KEY);
    let reading: AbnormalBgReading = validate_message_body(incoming.body)?;
    incoming
        .context
        .clients
        .bg_readings
        .process_reading_alerts(&reading.uuid)
        .await
}
