use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// The central DEA Ingest API.
///
/// It lives outside of the DHOS platform: its client carries its own token and the
/// `x-dhos-customer-code`/`x-dhos-environment` headers.
#[derive(Clone, Debug)]
pub struct DeaIngestApi {
    client: ApiClient,
}

impl DeaIngestApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn post_dhos_data(&self, export: Value) -> Result<(), HandlerError> {
        tracing::debug!("POSTing data to DEA Ingest API");
        self.client
            .send(ApiRequest::post("/dea/ingest/v2/dhos_data").json(export))
            .await?;
        Ok(())
    }
}
