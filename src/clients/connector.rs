use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// DHOS Connector API.
#[derive(Clone, Debug)]
pub struct ConnectorApi {
    client: ApiClient,
}

impl ConnectorApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Hand an HL7v3 CDA document over for processing.
    pub async fn post_cda_message(&self, message: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing HL7 CDA message for processing to Connector API");
        self.client
            .send(ApiRequest::post("/dhos/v1/cda_message").json(message))
            .await?;
        Ok(())
    }

    /// Ask for an ORU message to be sent back to the EPR for an observation set.
    pub async fn post_oru_message(&self, message: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing ORU message data to Connector API");
        self.client
            .send(ApiRequest::post("/dhos/v1/oru_message").json(message))
            .await?;
        Ok(())
    }

    pub async fn patch_hl7_message(
        &self,
        message_uuid: &str,
        patch: Value,
    ) -> Result<(), HandlerError> {
        tracing::debug!(message_uuid, "PATCHing HL7 message in Connector API");
        self.client
            .send(
                ApiRequest::patch(format!("/dhos/v1/message/{}", message_uuid)).json(patch),
            )
            .await?;
        Ok(())
    }
}
