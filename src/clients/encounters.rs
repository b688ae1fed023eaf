use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

/// DHOS Encounters API.
#[derive(Clone, Debug)]
pub struct EncountersApi {
    client: ApiClient,
}

impl EncountersApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_encounter(
        &self,
        encounter_uuid: &str,
        show_deleted: bool,
    ) -> Result<Value, HandlerError> {
        tracing::debug!(encounter_uuid, "GETting encounter");
        self.client
            .send_json(
                ApiRequest::get(format!("/dhos/v1/encounter/{}", encounter_uuid))
                    .query("show_deleted", show_deleted),
            )
            .await
    }

    pub async fn create_encounter(&self, encounter: Value) -> Result<Value, HandlerError> {
        tracing::debug!("POSTing encounter");
        self.client
            .send_json(ApiRequest::post("/dhos/v2/encounter").json(encounter))
            .await
    }

    /// Patch an encounter. `patient_uuid` cannot be changed and is dropped from `patch`.
    pub async fn update_encounter(
        &self,
        encounter_uuid: &str,
        mut patch: Value,
    ) -> Result<Value, HandlerError> {
        tracing::debug!(encounter_uuid, "PATCHing encounter");
        if let Some(fields) = patch.as_object_mut() {
            fields.remove("patient_uuid");
        }
        self.client
            .send_json(
                ApiRequest::patch(format!("/dhos/v1/encounter/{}", encounter_uuid)).json(patch),
            )
            .await
    }

    /// Encounters of the patient still open now that were not created from an HL7 feed.
    pub async fn get_open_local_encounters(
        &self,
        patient_uuid: &str,
    ) -> Result<Vec<Value>, HandlerError> {
        tracing::debug!(patient_uuid, "GETting open encounters");
        let open: Vec<Value> = self
            .client
            .send_json(
                ApiRequest::get("/dhos/v2/encounter")
                    .query("patient_id", patient_uuid)
                    .query(
                        "open_as_of",
                        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, false),
                    ),
            )
            .await?;
        tracing::debug!(
            "Retrieved {} open encounters for patient {}",
            open.len(),
            patient_uuid
        );
        Ok(open
            .into_iter()
            .filter(|encounter| !has_epr_encounter_id(encounter))
            .collect())
    }

    /// Encounters of the patient known to the EPR under `epr_encounter_id`, latest first.
    pub async fn get_epr_encounters(
        &self,
        patient_uuid: &str,
        epr_encounter_id: &str,
    ) -> Result<Vec<Value>, HandlerError> {
        tracing::debug!(patient_uuid, epr_encounter_id, "GETting EPR encounters");
        self.client
            .send_json(
                ApiRequest::get("/dhos/v2/encounter")
                    .query("patient_id", patient_uuid)
                    .query("epr_encounter_id", epr_encounter_id),
            )
            .await
    }

    /// Make every encounter in `encounter_uuids` a child of `parent_uuid`.
    pub async fn merge_into(
        &self,
        encounter_uuids: &[String],
        parent_uuid: &str,
    ) -> Result<(), HandlerError> {
        for encounter_uuid in encounter_uuids {
            self.update_encounter(
                encounter_uuid,
                json!({"child_of_encounter_uuid": parent_uuid}),
            )
            .await?;
            tracing::debug!(
                "Merged encounter '{}' with parent '{}'",
                encounter_uuid,
                parent_uuid
            );
        }
        Ok(())
    }

    /// Move the encounters of a merged (child) patient record to its parent record.
    pub async fn merge_patient_encounters(&self, merge: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing patient encounter merge");
        self.client
            .send(ApiRequest::post("/dhos/v1/encounter/merge").json(merge))
            .await?;
        Ok(())
    }
}

fn has_epr_encounter_id(encounter: &Value) -> bool {
    match encounter.get("epr_encounter_id") {
        None | Some(Value::Null) => false,
        Some(Value::String(id)) => !id.is_empty(),
        Some(_) => true,
    }
}
