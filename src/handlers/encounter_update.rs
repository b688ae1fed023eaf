//! Encounter updates received from the EPR through HL7 messages.
//!
//! The update is applied to one "master" encounter:
//! 1. the latest encounter already known under the EPR encounter id, if any;
//! 2. otherwise a new encounter, if the patient has no open local encounter;
//! 3. otherwise the latest open local encounter, which becomes an EPR encounter.
//!
//! Every other EPR or open local encounter of the patient is then merged into the master.
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::actions::{extract_action, ActionsMessage};
use crate::handlers::{orphaned_observations, AdapterContext};
use crate::validation::validate_message_body;
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const ROUTING_KEY: &str = "dhos.305058001";

const PROCESS_ENCOUNTER: &str = "process_encounter";

/// Fields of the action forwarded to the Encounters API as they are.
const ENCOUNTER_FIELDS: &[&str] = &[
    "patient_uuid",
    "location_uuid",
    "dh_product_uuid",
    "patient_record_uuid",
    "epr_encounter_id",
    "encounter_type",
    "admitted_at",
    "score_system",
    "spo2_scale",
    "discharged_at",
];

/// Fields not read here are still decoded: an update missing them is rejected.
#[derive(Deserialize, Debug)]
#[allow(dead_code)]
struct EncounterUpdate {
    patient_uuid: String,
    location_uuid: String,
    dh_product_uuid: String,
    patient_record_uuid: String,
    epr_encounter_id: String,
    encounter_type: String,
    admitted_at: String,
    score_system: Option<String>,
    score_system_default_for_location: String,
    spo2_scale: Option<i64>,
    #[serde(default)]
    admission_cancelled: bool,
    #[serde(default)]
    discharge_cancelled: bool,
    discharged_at: Option<String>,
    #[serde(default)]
    patient_deceased: bool,
    merge_patient_record_uuid: Option<String>,
}

/// An update decoded from the `process_encounter` action.
#[derive(Debug)]
struct EncounterChanges {
    update: EncounterUpdate,
    /// What the Encounters API is sent.
    details: Map<String, Value>,
}

impl EncounterChanges {
    fn from_action_data(data: &Value) -> Result<Self, HandlerError> {
        let update: EncounterUpdate = serde_json::from_value(data.clone())
            .context("Failed to validate process encounter data")
            .map_err(HandlerError::reject)?;

        let mut details: Map<String, Value> = ENCOUNTER_FIELDS
            .iter()
            .filter_map(|field| Some((field.to_string(), data.get(*field)?.clone())))
            .collect();
        if update.discharge_cancelled {
            details.insert("discharged_at".into(), Value::Null);
        }
        let deleted_at = if update.admission_cancelled {
            Value::String(now())
        } else {
            Value::Null
        };
        details.insert("deleted_at".into(), deleted_at);
        Ok(Self { update, details })
    }

    fn is_cancelled(&self) -> bool {
        !self.details["deleted_at"].is_null()
    }

    fn is_discharged(&self) -> bool {
        match self.details.get("discharged_at") {
            None | Some(Value::Null) => false,
            Some(Value::String(at)) => !at.is_empty(),
            Some(_) => true,
        }
    }

    /// The details of a new encounter, scored with the default of its location unless the
    /// update says otherwise.
    fn new_encounter(&self) -> Value {
        let mut details = self.details.clone();
        details
            .entry("score_system")
            .or_insert_with(|| self.update.score_system_default_for_location.clone().into());
        Value::Object(details)
    }
}

/// Bring the Encounters API up to date with an encounter update from the EPR.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received process encounter message ({})", ROUTING_KEY);
    let message: ActionsMessage = validate_message_body(incoming.body)?;
    let action = extract_action(&message.actions, PROCESS_ENCOUNTER)?;
    let changes = EncounterChanges::from_action_data(&action.data)?;
    let context = &incoming.context;
    let encounters = &context.clients.encounters;
    let patient_uuid = &changes.update.patient_uuid;

    let open_local_encounters = encounters.get_open_local_encounters(patient_uuid).await?;
    let epr_encounters = encounters
        .get_epr_encounters(patient_uuid, &changes.update.epr_encounter_id)
        .await?;

    let master = match (epr_encounters.first(), open_local_encounters.first()) {
        (Some(latest_epr), _) => {
            let uuid = encounter_uuid(latest_epr)?;
            tracing::debug!("EPR encounter '{}' found - updating", uuid);
            encounters
                .update_encounter(&uuid, Value::Object(changes.details.clone()))
                .await?
        }
        (None, None) => {
            tracing::debug!("No EPR encounter, no open local encounter - creating");
            encounters.create_encounter(changes.new_encounter()).await?
        }
        (None, Some(latest_local)) => {
            let uuid = encounter_uuid(latest_local)?;
            tracing::debug!("No EPR encounter, open local encounter '{}' found - updating", uuid);
            encounters
                .update_encounter(&uuid, Value::Object(changes.details.clone()))
                .await?
        }
    };
    let master_uuid = encounter_uuid(&master)?;

    let remaining = epr_encounters
        .iter()
        .chain(&open_local_encounters)
        .map(encounter_uuid)
        .filter(|uuid| !matches!(uuid, Ok(id) if *id == master_uuid))
        .collect::<Result<Vec<_>, _>>()?;
    if !remaining.is_empty() {
        tracing::debug!(
            "Merging remaining encounters with encounter '{}'",
            master_uuid
        );
        encounters.merge_into(&remaining, &master_uuid).await?;
    }

    if let Some(child_record_uuid) = changes
        .update
        .merge_patient_record_uuid
        .as_deref()
        .filter(|uuid| !uuid.is_empty())
    {
        encounters
            .merge_patient_encounters(json!({
                "child_record_uuid": child_record_uuid,
                "parent_record_uuid": changes.update.patient_record_uuid,
                "parent_patient_uuid": patient_uuid,
                "message_uuid": message.dhos_connector_message_uuid,
            }))
            .await?;
    }

    if changes.update.patient_deceased && !changes.is_discharged() {
        tracing::debug!("Patient '{}' is deceased, discharging encounter", patient_uuid);
        encounters
            .update_encounter(&master_uuid, json!({"discharged_at": now()}))
            .await?;
    }

    if changes.is_cancelled() {
        tracing::debug!("Publishing message to check deleted encounter for orphaned observations");
        let check = json!({
            "dhos_connector_message_uuid": message.dhos_connector_message_uuid,
            "actions": [{
                "name": "check_for_orphaned_observations",
                "data": {"encounter_uuid": master_uuid, "patient_uuid": patient_uuid},
            }],
        });
        context
            .publish(orphaned_observations::ROUTING_KEY, &check)
            .await
    } else {
        tracing::debug!("Marking HL7 message as fully processed");
        context
            .clients
            .connector
            .patch_hl7_message(
                &message.dhos_connector_message_uuid,
                json!({"is_processed": true}),
            )
            .await
    }
}

fn encounter_uuid(encounter: &Value) -> Result<String, HandlerError> {
    encounter
        .get("uuid")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .context("Encounter without a uuid in Encounters API response")
        .map_err(HandlerError::from)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}
