//! Last step of the ORU message chain: an observation set, already enriched with its
//! encounter, gets the patient, clinician and location details the EPR expects before it is
//! handed to the Connector API.
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::actions::{extract_action, ActionsMessageNoConnectorId};
use crate::handlers::AdapterContext;
use crate::validation::validate_message_body;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const ROUTING_KEY: &str = "dhos.DM000005";

const PROCESS_OBSERVATION_SET: &str = "process_observation_set";

#[derive(Deserialize, Debug)]
struct EnrichedObservationSet {
    observation_set: ObservationSetAuthor,
    encounter: EncounterLocation,
}

#[derive(Deserialize, Debug)]
struct ObservationSetAuthor {
    created_by: String,
}

#[derive(Deserialize, Debug)]
struct EncounterLocation {
    patient_record_uuid: String,
    location_uuid: String,
}

/// Append the patient, the clinician (if known) and the ODS code of the location, then ask the
/// Connector API to send the ORU message.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!(
        "Received services observation set notification message ({})",
        ROUTING_KEY
    );
    let message: ActionsMessageNoConnectorId = validate_message_body(incoming.body)?;
    let (mut data, details) = action_data(&message)?;
    let clients = &incoming.context.clients;

    let record_uuid = &details.encounter.patient_record_uuid;
    tracing::debug!("Getting patient details for record UUID {}", record_uuid);
    let patient = clients
        .services
        .get_patient_by_record(record_uuid, true)
        .await?;
    data.insert("patient".into(), patient);

    let clinician_uuid = &details.observation_set.created_by;
    tracing::debug!("Getting clinician details for UUID {}", clinician_uuid);
    if let Some(clinician) = clients.users.get_clinician(clinician_uuid).await? {
        data.insert("clinician".into(), clinician);
    }

    let location_uuid = &details.encounter.location_uuid;
    tracing::debug!("Getting location details for UUID {}", location_uuid);
    let location = clients.locations.get_location(location_uuid).await?;
    let ods_code = location.get("ods_code").cloned().unwrap_or(Value::Null);
    if let Some(Value::Object(encounter)) = data.get_mut("encounter") {
        encounter.insert("location_ods_code".into(), ods_code);
    }

    clients
        .connector
        .post_oru_message(json!({
            "actions": [{"name": PROCESS_OBSERVATION_SET, "data": data}]
        }))
        .await
}

/// The raw action data, to be extended, and the fields needed to extend it.
fn action_data(
    message: &ActionsMessageNoConnectorId,
) -> Result<(Map<String, Value>, EnrichedObservationSet), HandlerError> {
    let action = extract_action(&message.actions, PROCESS_OBSERVATION_SET)?;
    let invalid = || {
        HandlerError::reject(anyhow::anyhow!(
            "Failed to validate observation set action"
        ))
    };
    let Value::Object(data) = &action.data else {
        return Err(invalid());
    };
    let details = serde_json::from_value(action.data.clone()).map_err(|e| {
        tracing::error!("Failed to validate observation set action: {}", e);
        invalid()
    })?;
    Ok((data.clone(), details))
}
