//! Patient updates received from the EPR through HL7 messages.
//!
//! The patient (and the patient merged into it, if any) is created or updated in the Services
//! API, and the locations it refers to are created if they are not known yet. If the message
//! carries an encounter too, it is completed with the resulting UUIDs and published again for
//! [`encounter_update`](crate::handlers::encounter_update).
use crate::clients::{Clients, PatientIdentifier};
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::actions::{extract_action, find_action, ActionsMessage};
use crate::handlers::{encounter_update, AdapterContext};
use crate::validation::{validate_message_body, ValidationError};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

pub const ROUTING_KEY: &str = "dhos.24891000000101";

const PROCESS_PATIENT: &str = "process_patient";
const PROCESS_LOCATION: &str = "process_location";
const PROCESS_ENCOUNTER: &str = "process_encounter";

const PRODUCT_NAME: &str = "SEND";
const DEFAULT_SCORE_SYSTEM: &str = "news2";

/// Location types, from the most generic to the most specific.
const WARD_SNOMED: &str = "225746001";
const BAY_SNOMED: &str = "1064311000000104";
const BED_SNOMED: &str = "229772003";
const LOCATION_TYPES: [&str; 3] = [WARD_SNOMED, BAY_SNOMED, BED_SNOMED];

/// HL7 field names and their Services API counterpart.
const RENAMED_FIELDS: &[(&str, &str)] = &[
    ("date_of_birth", "dob"),
    ("date_of_death", "dod"),
    ("mrn", "hospital_number"),
    ("sex_sct", "sex"),
];

/// The patient fields of a `process_patient` action.
#[derive(Debug, Default, PartialEq)]
struct PatientChanges {
    details: Map<String, Value>,
    previous_nhs_number: Option<String>,
    previous_hospital_number: Option<String>,
}

impl PatientChanges {
    fn from_action_data(data: &Value) -> Result<Self, HandlerError> {
        let Value::Object(data) = data else {
            return Err(invalid("'process_patient' data is not an object"));
        };
        let mut changes = Self::default();
        for (key, value) in data {
            let key = RENAMED_FIELDS
                .iter()
                .find(|(from, _)| *from == key.as_str())
                .map_or(key.as_str(), |(_, to)| *to);
            let is_identifier = matches!(
                key,
                "previous_nhs_number" | "previous_mrn" | "nhs_number" | "hospital_number"
            );
            let is_known = is_identifier || RENAMED_FIELDS.iter().any(|(_, to)| *to == key);
            if is_known && !matches!(value, Value::String(_) | Value::Null) {
                return Err(invalid(format!("'{}' must be a string", key)));
            }
            let text = value.as_str().filter(|text| !text.is_empty()).map(str::to_owned);
            match key {
                "previous_nhs_number" => changes.previous_nhs_number = text,
                "previous_mrn" => changes.previous_hospital_number = text,
                _ if value.is_object() || value.is_null() || value == "" => {}
                _ => {
                    changes.details.insert(key.to_owned(), value.clone());
                }
            }
        }
        Ok(changes)
    }

    fn identifier(&self, field: &str) -> Option<&str> {
        self.details.get(field).and_then(Value::as_str)
    }

    fn has_previous_identifiers(&self) -> bool {
        self.previous_nhs_number.is_some() || self.previous_hospital_number.is_some()
    }

    /// A new patient, enrolled in SEND today.
    fn new_patient(&self) -> Value {
        let mut patient = self.details.clone();
        patient.insert("record".into(), json!({}));
        patient.insert(
            "dh_products".into(),
            json!([{"product_name": PRODUCT_NAME, "opened_date": today()}]),
        );
        Value::Object(patient)
    }

    /// A new patient standing for the previous identifiers, merged into `parent_uuid`.
    fn new_child_patient(&self, parent_uuid: &str) -> Value {
        let mut patient = self.details.clone();
        patient.insert("nhs_number".into(), json!(self.previous_nhs_number));
        patient.insert(
            "hospital_number".into(),
            json!(self.previous_hospital_number),
        );
        patient.insert("child_of".into(), json!(parent_uuid));
        patient.insert("record".into(), json!({}));
        Value::Object(patient)
    }
}

#[derive(Deserialize, Debug, Clone)]
struct Patient {
    uuid: String,
    record: Record,
    #[serde(default)]
    dh_products: Vec<Product>,
}

#[derive(Deserialize, Debug, Clone)]
struct Record {
    uuid: String,
}

#[derive(Deserialize, Debug, Clone)]
struct Product {
    uuid: String,
    product_name: String,
}

impl Patient {
    fn send_product_uuid(&self) -> Option<&str> {
        self.dh_products
            .iter()
            .find(|product| product.product_name.eq_ignore_ascii_case(PRODUCT_NAME))
            .map(|product| product.uuid.as_str())
    }
}

#[derive(Deserialize, Debug, Default)]
struct LocationChanges {
    location: Option<EprLocation>,
    previous_location: Option<EprLocation>,
}

/// A location as the EPR describes it.
#[derive(Deserialize, Debug, Clone)]
struct EprLocation {
    epr_ward_code: String,
    epr_bay_code: Option<String>,
    epr_bed_code: Option<String>,
}

impl EprLocation {
    /// `WARD[:BAY[:BED]]`.
    fn ods_code(&self) -> String {
        [
            Some(self.epr_ward_code.as_str()),
            self.epr_bay_code.as_deref(),
            self.epr_bed_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|code| !code.is_empty())
        .collect::<Vec<_>>()
        .join(":")
    }
}

/// Create or update the patient and the locations of an HL7 message, then hand its encounter
/// over to the next step (or mark the message as processed if it has none).
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received process patient message ({})", ROUTING_KEY);
    let mut message: ActionsMessage = validate_message_body(incoming.body)?;
    let context = &incoming.context;
    let clients = &context.clients;

    tracing::debug!("Processing patient");
    let patient_action = extract_action(&message.actions, PROCESS_PATIENT)?;
    let changes = PatientChanges::from_action_data(&patient_action.data)?;
    let primary_patient = update_or_create_patient(clients, &changes).await?;
    let child_patient = merge_previous_patient(clients, &changes, &primary_patient.uuid).await?;

    tracing::debug!("Processing location");
    let locations = match find_action(&message.actions, PROCESS_LOCATION) {
        Some(action) => serde_json::from_value(action.data.clone())
            .context("Failed to validate process location data")
            .map_err(HandlerError::reject)?,
        None => LocationChanges::default(),
    };
    let current_location = match &locations.location {
        Some(location) => Some(find_or_create_location(clients, location).await?),
        None => None,
    };
    let previous_location = match &locations.previous_location {
        Some(location) => Some(find_or_create_location(clients, location).await?),
        None => None,
    };

    tracing::debug!("Processing encounter");
    let Some(encounter) = message
        .actions
        .iter_mut()
        .find(|action| action.name == PROCESS_ENCOUNTER)
    else {
        tracing::debug!("Marking HL7 message as fully processed");
        return clients
            .connector
            .patch_hl7_message(
                &message.dhos_connector_message_uuid,
                json!({"is_processed": true}),
            )
            .await;
    };

    let send_product_uuid = primary_patient.send_product_uuid().ok_or_else(|| {
        HandlerError::reject(anyhow::anyhow!(
            "Patient '{}' is not enrolled in {}",
            primary_patient.uuid,
            PRODUCT_NAME
        ))
    })?;
    let Value::Object(encounter_data) = &mut encounter.data else {
        return Err(invalid("'process_encounter' data is not an object"));
    };
    encounter_data.extend([
        ("patient_uuid".to_owned(), json!(primary_patient.uuid)),
        (
            "patient_record_uuid".to_owned(),
            json!(primary_patient.record.uuid),
        ),
        ("dh_product_uuid".to_owned(), json!(send_product_uuid)),
        (
            "location_uuid".to_owned(),
            uuid_of(current_location.as_ref()),
        ),
        (
            "previous_location_uuid".to_owned(),
            uuid_of(previous_location.as_ref()),
        ),
        (
            "merge_patient_record_uuid".to_owned(),
            child_patient
                .as_ref()
                .and_then(|child| child.pointer("/record/uuid"))
                .cloned()
                .unwrap_or(Value::Null),
        ),
        (
            "score_system_default_for_location".to_owned(),
            json!(default_score_system(current_location.as_ref())),
        ),
    ]);

    let message = serde_json::to_value(&message).context("Failed to serialize message")?;
    context.publish(encounter_update::ROUTING_KEY, &message).await
}

fn invalid(reason: impl Into<String>) -> HandlerError {
    HandlerError::reject(ValidationError::invalid(reason))
}

fn today() -> String {
    Utc::now().date_naive().to_string()
}

fn uuid_of(location: Option<&Value>) -> Value {
    location
        .and_then(|location| location.get("uuid"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// The default score system of the location or of its closest ancestor that has one.
fn default_score_system(location: Option<&Value>) -> String {
    let mut location = location;
    while let Some(current) = location {
        if let Some(score_system) = current.get("score_system_default").and_then(Value::as_str) {
            return score_system.to_owned();
        }
        location = current.get("parent").filter(|parent| !parent.is_null());
    }
    tracing::debug!(
        "No default score system for location hierarchy, defaulting to {}",
        DEFAULT_SCORE_SYSTEM
    );
    DEFAULT_SCORE_SYSTEM.to_owned()
}

/// Look a SEND patient up by NHS number first, then by hospital number.
async fn find_patient(
    clients: &Clients,
    nhs_number: Option<&str>,
    hospital_number: Option<&str>,
) -> Result<Option<Value>, HandlerError> {
    if nhs_number.is_none() && hospital_number.is_none() {
        return Err(invalid(
            "Can not search for patient as MRN or NHS number is required",
        ));
    }
    let identifiers = [
        (PatientIdentifier::NhsNumber, nhs_number),
        (PatientIdentifier::HospitalNumber, hospital_number),
    ];
    for (identifier, value) in identifiers {
        let Some(value) = value else { continue };
        let patients = clients
            .services
            .search_patients(identifier, value, PRODUCT_NAME)
            .await?;
        if let Some(patient) = patients.into_iter().next() {
            tracing::debug!("Matched patient by {}", identifier.as_str());
            return Ok(Some(patient));
        }
    }
    tracing::debug!("No match for patient identifiers");
    Ok(None)
}

async fn update_or_create_patient(
    clients: &Clients,
    changes: &PatientChanges,
) -> Result<Patient, HandlerError> {
    let existing = find_patient(
        clients,
        changes.identifier("nhs_number"),
        changes.identifier("hospital_number"),
    )
    .await?;
    let existing_uuid = existing
        .as_ref()
        .and_then(|patient| patient.get("uuid"))
        .and_then(Value::as_str);
    let patient = match existing_uuid {
        Some(patient_uuid) => {
            tracing::debug!("Updating existing patient {}", patient_uuid);
            clients
                .services
                .update_patient(patient_uuid, Value::Object(changes.details.clone()))
                .await?
        }
        None => {
            tracing::debug!("Creating new patient");
            clients.services.create_patient(changes.new_patient()).await?
        }
    };
    serde_json::from_value(patient)
        .context("Unexpected patient details from Services API")
        .map_err(HandlerError::from)
}

/// Merge the patient known under the previous identifiers (creating it if needed) into the
/// primary patient.
async fn merge_previous_patient(
    clients: &Clients,
    changes: &PatientChanges,
    primary_uuid: &str,
) -> Result<Option<Value>, HandlerError> {
    if !changes.has_previous_identifiers() {
        tracing::debug!("No patient to merge");
        return Ok(None);
    }
    let to_merge = find_patient(
        clients,
        changes.previous_nhs_number.as_deref(),
        changes.previous_hospital_number.as_deref(),
    )
    .await?;
    let Some(to_merge) = to_merge else {
        let child = clients
            .services
            .create_patient(changes.new_child_patient(primary_uuid))
            .await?;
        return Ok(Some(child));
    };
    let to_merge_uuid = to_merge
        .get("uuid")
        .and_then(Value::as_str)
        .context("Patient without a uuid in Services API response")?;
    if to_merge_uuid == primary_uuid {
        tracing::warn!(
            "Patient {} appears to have already been merged",
            to_merge_uuid
        );
        return Ok(None);
    }
    let child = clients
        .services
        .update_patient(to_merge_uuid, json!({"child_of": primary_uuid}))
        .await?;
    Ok(Some(child))
}

/// The location with the ODS code of `location`, created along with its missing ancestors if
/// it does not exist.
async fn find_or_create_location(
    clients: &Clients,
    location: &EprLocation,
) -> Result<Value, HandlerError> {
    let ods_code = location.ods_code();
    if let Some(existing) = find_location(clients, &ods_code).await? {
        return Ok(existing);
    }

    tracing::debug!("Creating location hierarchy for ODS code {}", ods_code);
    let hierarchy: Vec<&str> = ods_code.split(':').collect();
    let mut node = Value::Null;
    let mut parent_ods_code: Option<String> = None;
    for depth in 0..hierarchy.len() {
        let current_ods_code = hierarchy[..=depth].join(":");
        node = match find_location(clients, &current_ods_code).await? {
            Some(existing) => {
                tracing::debug!("Location with ODS code '{}' already exists", current_ods_code);
                existing
            }
            None => {
                tracing::debug!("Creating location with ODS code: {}", current_ods_code);
                let mut details = json!({
                    "ods_code": current_ods_code,
                    "display_name": hierarchy[depth],
                    "location_type": LOCATION_TYPES.get(depth).copied().unwrap_or_default(),
                    "active": false,
                    "dh_products": [{"product_name": PRODUCT_NAME, "opened_date": today()}],
                });
                if let Some(parent_ods_code) = &parent_ods_code {
                    details["parent_ods_code"] = json!(parent_ods_code);
                }
                clients.locations.create_location(details).await?
            }
        };
        parent_ods_code = Some(current_ods_code);
    }
    Ok(node)
}

/// The only location with `ods_code`. Ambiguous codes are rejected.
async fn find_location(clients: &Clients, ods_code: &str) -> Result<Option<Value>, HandlerError> {
    let locations = clients.locations.search_by_ods_code(ods_code).await?;
    if locations.len() > 1 {
        tracing::error!(
            "Found multiple locations ({}) with the provided identifiers",
            locations.len()
        );
        return Err(HandlerError::reject(anyhow::anyhow!(
            "Ambiguous ODS code '{}'",
            ods_code
        )));
    }
    Ok(locations.into_iter().next().map(|(_, location)| location))
}
