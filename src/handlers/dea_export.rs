//! Exports to the central DEA (data engineering and analytics) platform.
use crate::clients::api_client::to_json;
use crate::consumers::{HandlerError, Incoming};
use crate::handlers::{AdapterContext, Deployment};
use crate::validation::validate_message_body;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const ROUTING_KEY: &str = "dhos.DM000015";

const SYNE_BG_READINGS: &str = "syne_bg_readings";

#[derive(Serialize, Debug)]
pub struct DeaIngestPayload<'a> {
    pub metadata: DeaIngestMetadata<'a>,
    pub data: &'a [Map<String, Value>],
}

#[derive(Serialize, Debug)]
pub struct DeaIngestMetadata<'a> {
    pub data_source: &'static str,
    pub data_type: &'a str,
    pub customer: &'a str,
    pub environment: &'a str,
    pub circle_tag: &'a str,
    pub git_tag: &'a str,
    pub created: String,
    pub num_records: usize,
}

impl<'a> DeaIngestPayload<'a> {
    /// Wrap exported records with the metadata the DEA Ingest API expects.
    pub fn new(
        deployment: &'a Deployment,
        data_type: &'a str,
        data: &'a [Map<String, Value>],
    ) -> Self {
        Self {
            metadata: DeaIngestMetadata {
                data_source: module_path!(),
                data_type,
                customer: &deployment.customer_code,
                environment: &deployment.environment,
                circle_tag: &deployment.build_circle_tag,
                git_tag: &deployment.build_git_tag,
                created: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
                num_records: data.len(),
            },
            data,
        }
    }
}

/// Send GDM SYNE blood glucose readings reports to the DEA Ingest API.
///
/// Records are forwarded untouched.
pub async fn export_gdm_syne_bg_readings(
    incoming: Incoming<'_, AdapterContext>,
) -> Result<(), HandlerError> {
    tracing::info!(
        "Received 'export GDM SYNE blood glucose readings' message ({})",
        ROUTING_KEY
    );
    let records: Vec<Map<String, Value>> = validate_message_body(incoming.body)?;
    let context = &incoming.context;
    let payload = DeaIngestPayload::new(&context.deployment, SYNE_BG_READINGS, &records);
    context
        .clients
        .dea_ingest
        .post_dhos_data(to_json(&payload)?)
        .await
}
