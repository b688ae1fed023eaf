use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// DHOS Notifications API.
#[derive(Clone, Debug)]
pub struct NotificationsApi {
    client: ApiClient,
}

impl NotificationsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_email(&self, email: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing email to Notifications API");
        self.client
            .send(ApiRequest::post("/dhos/v1/email").json(email))
            .await?;
        Ok(())
    }
}
