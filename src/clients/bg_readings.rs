use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;

/// GDM BG Readings API.
#[derive(Clone, Debug)]
pub struct BgReadingsApi {
    client: ApiClient,
}

impl BgReadingsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Ask the BG Readings API to (re)evaluate the alerts triggered by a reading.
    pub async fn process_reading_alerts(&self, reading_uuid: &str) -> Result<(), HandlerError> {
        tracing::debug!(reading_uuid, "POSTing BG reading for alerts processing");
        self.client
            .send(ApiRequest::post(format!(
                "/gdm/v1/process_alerts/reading/{}",
                reading_uuid
            )))
            .await?;
        Ok(())
    }
}
