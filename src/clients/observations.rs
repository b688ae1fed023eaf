use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::Value;

/// DHOS Observations API.
#[derive(Clone, Debug)]
pub struct ObservationsApi {
    client: ApiClient,
}

impl ObservationsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_observation_sets(
        &self,
        encounter_uuid: &str,
    ) -> Result<Vec<Value>, HandlerError> {
        tracing::debug!(encounter_uuid, "GETting observation sets for encounter");
        self.client
            .send_json(
                ApiRequest::get("/dhos/v2/observation_set").query("encounter_id", encounter_uuid),
            )
            .await
    }
}
