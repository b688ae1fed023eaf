use crate::consumers::{HandlerError, Incoming};
use crate::handlers::AdapterContext;
use crate::validation::{validate_message_body, Validate};
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;

pub const ROUTING_KEY: &str = "gdm.424167000";

/// Message type of a red alert in the Messages API.
const RED_ALERT: u8 = 7;
/// Message type of an amber alert in the Messages API.
const AMBER_ALERT: u8 = 8;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    CountsRed,
    CountsAmber,
    PercentagesRed,
    PercentagesAmber,
    ActivityGrey,
}

impl AlertType {
    /// Messages API type and text of the alert message, `None` for alerts that do not
    /// produce one.
    pub fn message(&self, first_name: &str) -> Option<(u8, String)> {
        let message = match self {
            Self::CountsRed => (
                RED_ALERT,
                format!("{first_name} has posted at least 3 consecutive out of threshold readings for this meal time."),
            ),
            Self::CountsAmber => (
                AMBER_ALERT,
                format!("{first_name} has posted at least 2 out of threshold readings within the past 2 days where readings were taken"),
            ),
            Self::PercentagesRed => (
                RED_ALERT,
                format!("At least 30% of readings posted by {first_name} in the last 7 days have been out of threshold."),
            ),
            Self::PercentagesAmber => (
                AMBER_ALERT,
                format!("Between 10% and 30% of readings posted by {first_name} in the last 7 days have been out of threshold."),
            ),
            Self::ActivityGrey => return None,
        };
        Some(message)
    }
}

#[derive(Deserialize, Debug)]
struct BgReadingAlert {
    patient_uuid: String,
    alert_type: AlertType,
}

impl Validate for BgReadingAlert {}

#[derive(Deserialize, Debug)]
struct GdmPatient {
    first_name: String,
    locations: Vec<String>,
}

/// Turn a BG reading alert into a message for each of the patient's locations.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received 'BG reading alert' message ({})", ROUTING_KEY);
    let alert: BgReadingAlert = validate_message_body(incoming.body)?;
    let clients = &incoming.context.clients;

    if alert.alert_type == AlertType::ActivityGrey {
        tracing::info!(
            "No alert message to generate for patient {}",
            alert.patient_uuid
        );
        return Ok(());
    }

    let Some(patient) = clients
        .services
        .get_patient(&alert.patient_uuid, Some("GDM"))
        .await?
    else {
        tracing::info!(
            "Patient {} is not a GDM patient, aborting BG reading alert",
            alert.patient_uuid
        );
        return Ok(());
    };
    let patient: GdmPatient =
        serde_json::from_value(patient).context("Unexpected patient details from Services API")?;

    let Some((message_type, content)) = alert.alert_type.message(&patient.first_name) else {
        return Ok(());
    };
    for location in &patient.locations {
        tracing::info!("Creating alert message for location {}", location);
        clients
            .messages
            .create_message(json!({
                "sender": alert.patient_uuid,
                "sender_type": "patient",
                "receiver": location,
                "receiver_type": "location",
                "message_type": {"value": message_type},
                "content": content,
            }))
            .await?;
    }
    Ok(())
}
