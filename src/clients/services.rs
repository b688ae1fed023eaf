use crate::clients::api_client::json_body;
use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use reqwest::StatusCode;
use serde_json::Value;

/// DHOS Services API.
#[derive(Clone, Debug)]
pub struct ServicesApi {
    client: ApiClient,
}

impl ServicesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `None` if the patient does not exist (or is not enrolled in `product_name`).
    ///
    /// Any other non-2xx response is terminal, `503` included.
    pub async fn get_patient(
        &self,
        patient_uuid: &str,
        product_name: Option<&str>,
    ) -> Result<Option<Value>, HandlerError> {
        tracing::debug!(patient_uuid, "GETting patient");
        let mut request =
            ApiRequest::get(format!("/dhos/v1/patient/{}", patient_uuid)).allow_http_error();
        if let Some(product_name) = product_name {
            request = request.query("product_name", product_name);
        }
        let response = self.client.send(request).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(HandlerError::reject(anyhow::anyhow!(
                "Unexpected response from Services API (HTTP {})",
                status.as_u16()
            )));
        }
        json_body(response).await.map(Some)
    }

    /// The patient owning `record_uuid`.
    pub async fn get_patient_by_record(
        &self,
        record_uuid: &str,
        compact: bool,
    ) -> Result<Value, HandlerError> {
        tracing::debug!(record_uuid, "GETting patient by record");
        self.client
            .send_json(
                ApiRequest::get(format!("/dhos/v1/patient/record/{}", record_uuid))
                    .query("compact", compact),
            )
            .await
    }

    /// Patients enrolled in `product_name` with the given identifier, e.g. an NHS number.
    pub async fn search_patients(
        &self,
        identifier: PatientIdentifier,
        identifier_value: &str,
        product_name: &str,
    ) -> Result<Vec<Value>, HandlerError> {
        let patients: Vec<Value> = self
            .client
            .send_json(
                ApiRequest::get("/dhos/v1/patient")
                    .query("identifier_type", identifier.as_str())
                    .query("identifier_value", identifier_value)
                    .query("product_name", product_name),
            )
            .await?;
        tracing::debug!(
            "Retrieved {} patients matching identifier {}",
            patients.len(),
            identifier.as_str()
        );
        Ok(patients)
    }

    pub async fn create_patient(&self, patient: Value) -> Result<Value, HandlerError> {
        tracing::debug!("POSTing patient to Services API");
        self.client
            .send_json(
                ApiRequest::post("/dhos/v1/patient")
                    .query("type", "SEND")
                    .json(patient),
            )
            .await
    }

    pub async fn update_patient(
        &self,
        patient_uuid: &str,
        patch: Value,
    ) -> Result<Value, HandlerError> {
        tracing::debug!(patient_uuid, "PATCHing patient");
        self.client
            .send_json(ApiRequest::patch(format!("/dhos/v1/patient/{}", patient_uuid)).json(patch))
            .await
    }
}

/// How a patient is identified in an HL7 feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientIdentifier {
    NhsNumber,
    HospitalNumber,
}

impl PatientIdentifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NhsNumber => "nhs_number",
            Self::HospitalNumber => "hospital_number",
        }
    }
}
