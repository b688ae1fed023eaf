//! Orphaned observation sets appear when an encounter is cancelled (deleted) after observations
//! were taken against it.
//!
//! To keep them visible, a new discharged local encounter is created and the cancelled
//! encounter becomes its child. The local encounter can then be merged into the next known EPR
//! encounter.
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::actions::{extract_action, ActionsMessage};
use crate::handlers::AdapterContext;
use crate::validation::validate_message_body;
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

pub const ROUTING_KEY: &str = "dhos.DM000002";

const CHECK_FOR_ORPHANED_OBSERVATIONS: &str = "check_for_orphaned_observations";

#[derive(Deserialize, Debug)]
struct OrphanCandidate {
    encounter_uuid: Option<String>,
    patient_uuid: Option<String>,
}

/// The fields of an encounter needed to create its discharged local parent.
#[derive(Deserialize, Debug)]
struct EncounterToMerge {
    uuid: String,
    #[serde(default)]
    child_of: Value,
    location_uuid: Value,
    dh_product: Vec<Product>,
    patient_record_uuid: Value,
    encounter_type: Value,
    admitted_at: Value,
    score_system: Value,
    #[serde(default)]
    spo2_scale: Value,
}

#[derive(Deserialize, Debug)]
struct Product {
    uuid: Value,
}

impl EncounterToMerge {
    /// The encounter this one has already been merged into, if any.
    fn merged_into(&self) -> Option<&Value> {
        match &self.child_of {
            Value::Null => None,
            Value::String(parent) if parent.is_empty() => None,
            parent => Some(parent),
        }
    }

    fn discharged_parent(&self, patient_uuid: &str) -> Result<Value, anyhow::Error> {
        let product = self
            .dh_product
            .first()
            .with_context(|| format!("Encounter '{}' has no product", self.uuid))?;
        Ok(json!({
            "location_uuid": self.location_uuid,
            "dh_product_uuid": product.uuid,
            "patient_record_uuid": self.patient_record_uuid,
            "patient_uuid": patient_uuid,
            "encounter_type": self.encounter_type,
            "admitted_at": self.admitted_at,
            "score_system": self.score_system,
            "spo2_scale": self.spo2_scale,
            "discharged_at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false),
        }))
    }
}

/// Check whether a cancelled encounter has observation sets and, if so, merge it into a new
/// local encounter. The HL7 message is then marked as processed in the Connector API.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received check orphaned observations message ({})", ROUTING_KEY);
    let message: ActionsMessage = validate_message_body(incoming.body)?;
    let (encounter_uuid, patient_uuid) = extract_uuids(&message)?;
    let clients = &incoming.context.clients;

    let observation_sets = clients
        .observations
        .get_observation_sets(&encounter_uuid)
        .await?;
    tracing::debug!(
        "Retrieved {} observation sets for encounter {}",
        observation_sets.len(),
        encounter_uuid
    );

    if !observation_sets.is_empty() {
        let encounter = clients
            .encounters
            .get_encounter(&encounter_uuid, true)
            .await?;
        let encounter: EncounterToMerge = serde_json::from_value(encounter)
            .context("Unexpected encounter details from Encounters API")?;
        match encounter.merged_into() {
            Some(parent) => {
                tracing::warn!(
                    "Aborting merge, encounter '{}' is already a child of '{}'",
                    encounter.uuid,
                    parent
                );
            }
            None => {
                let parent = clients
                    .encounters
                    .create_encounter(encounter.discharged_parent(&patient_uuid)?)
                    .await?;
                let parent_uuid = parent
                    .get("uuid")
                    .cloned()
                    .context("Created encounter has no uuid")?;
                clients
                    .encounters
                    .update_encounter(
                        &encounter.uuid,
                        json!({"child_of_encounter_uuid": parent_uuid}),
                    )
                    .await?;
            }
        }
    }

    tracing::debug!("Marking HL7 message as fully processed");
    clients
        .connector
        .patch_hl7_message(
            &message.dhos_connector_message_uuid,
            json!({"is_processed": true}),
        )
        .await
}

fn extract_uuids(message: &ActionsMessage) -> Result<(String, String), HandlerError> {
    let action = extract_action(&message.actions, CHECK_FOR_ORPHANED_OBSERVATIONS)?;
    let candidate = serde_json::from_value::<OrphanCandidate>(action.data.clone()).ok();
    match candidate {
        Some(OrphanCandidate {
            encounter_uuid: Some(encounter_uuid),
            patient_uuid: Some(patient_uuid),
        }) if !encounter_uuid.is_empty() && !patient_uuid.is_empty() => {
            Ok((encounter_uuid, patient_uuid))
        }
        _ => Err(HandlerError::reject(anyhow::anyhow!(
            "Failed to validate check orphaned observations data"
        ))),
    }
}
