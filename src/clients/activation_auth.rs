use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// DHOS Activation Auth API.
#[derive(Clone, Debug)]
pub struct ActivationAuthApi {
    client: ApiClient,
}

impl ActivationAuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_clinician(&self, clinician: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing activation auth clinician");
        self.client
            .send(ApiRequest::post("/dhos/v1/clinician").json(clinician))
            .await?;
        Ok(())
    }

    pub async fn update_clinician(
        &self,
        clinician_uuid: &str,
        clinician: Value,
    ) -> Result<(), HandlerError> {
        tracing::debug!(clinician_uuid, "PATCHing activation auth clinician");
        self.client
            .send(
                ApiRequest::patch(format!("/dhos/v1/clinician/{}", clinician_uuid))
                    .json(clinician),
            )
            .await?;
        Ok(())
    }
}
