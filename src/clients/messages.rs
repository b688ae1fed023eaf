use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// DHOS Messages API.
#[derive(Clone, Debug)]
pub struct MessagesApi {
    client: ApiClient,
}

impl MessagesApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn create_message(&self, message: Value) -> Result<(), HandlerError> {
        let response = self
            .client
            .send(ApiRequest::post("/dhos/v2/message").json(message))
            .await?;
        tracing::debug!(
            "Message POSTed successfully, HTTP status {}",
            response.status().as_u16()
        );
        Ok(())
    }
}
