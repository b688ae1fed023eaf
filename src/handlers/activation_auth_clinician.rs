//! Clinicians who log in through the activation flow are mirrored in the Activation Auth API.
use crate::clients::api_client::to_json;
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::AdapterContext;
use crate::validation::{validate_message_body, Validate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CREATE_ROUTING_KEY: &str = "dhos.D9000001";
pub const UPDATE_ROUTING_KEY: &str = "dhos.D9000002";

#[derive(Deserialize, Debug)]
struct ActivationAuthClinician {
    uuid: String,
    #[serde(default)]
    send_entry_identifier: Option<String>,
    login_active: bool,
    products: Vec<Map<String, Value>>,
    groups: Vec<String>,
    // Required, but can be null.
    #[serde(deserialize_with = "Option::deserialize")]
    contract_expiry_eod_date: Option<String>,
}

impl Validate for ActivationAuthClinician {}

#[derive(Serialize, Debug)]
struct ClinicianDetails<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    clinician_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_entry_identifier: Option<&'a str>,
    login_active: bool,
    products: Vec<&'a Value>,
    groups: &'a [String],
    contract_expiry_eod_date: Option<&'a str>,
}

impl ActivationAuthClinician {
    /// The Activation Auth API only knows products by name.
    fn details(&self, with_clinician_id: bool) -> Result<ClinicianDetails<'_>, HandlerError> {
        let products = self
            .products
            .iter()
            .map(|product| {
                product
                    .get("product_name")
                    .ok_or_else(|| anyhow::anyhow!("Clinician product without a product_name"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClinicianDetails {
            clinician_id: with_clinician_id.then_some(self.uuid.as_str()),
            send_entry_identifier: self.send_entry_identifier.as_deref(),
            login_active: self.login_active,
            products,
            groups: &self.groups,
            contract_expiry_eod_date: self.contract_expiry_eod_date.as_deref(),
        })
    }
}

pub async fn create(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received 'create clinician' message ({})", CREATE_ROUTING_KEY);
    let clinician: ActivationAuthClinician = validate_message_body(incoming.body)?;
    let details = clinician.details(true)?;
    incoming
        .context
        .clients
        .activation_auth
        .create_clinician(to_json(&details)?)
        .await
}

pub async fn update(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!("Received 'update clinician' message ({})", UPDATE_ROUTING_KEY);
    let clinician: ActivationAuthClinician = validate_message_body(incoming.body)?;
    let details = clinician.details(false)?;
    incoming
        .context
        .clients
        .activation_auth
        .update_clinician(&clinician.uuid, to_json(&details)?)
        .await
}
