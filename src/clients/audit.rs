use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// DHOS Audit API.
#[derive(Clone, Debug)]
pub struct AuditApi {
    client: ApiClient,
}

impl AuditApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_audit_event(&self, event: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing audit message");
        self.client
            .send(ApiRequest::post("/dhos/v2/event").json(event))
            .await?;
        Ok(())
    }
}
