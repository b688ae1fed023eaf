use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use serde_json::{Map, Value};

/// DHOS Locations API.
#[derive(Clone, Debug)]
pub struct LocationsApi {
    client: ApiClient,
}

impl LocationsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get_location(&self, location_uuid: &str) -> Result<Value, HandlerError> {
        tracing::debug!(location_uuid, "GETting location");
        self.client
            .send_json(ApiRequest::get(format!("/dhos/v1/location/{}", location_uuid)))
            .await
    }

    /// Locations with exactly this ODS code, keyed by UUID.
    pub async fn search_by_ods_code(
        &self,
        ods_code: &str,
    ) -> Result<Map<String, Value>, HandlerError> {
        let locations: Map<String, Value> = self
            .client
            .send_json(ApiRequest::get("/dhos/v1/location/search").query("ods_code", ods_code))
            .await?;
        tracing::debug!(
            "Retrieved {} locations matching ODS code {}",
            locations.len(),
            ods_code
        );
        Ok(locations)
    }

    pub async fn create_location(&self, location: Value) -> Result<Value, HandlerError> {
        tracing::debug!("POSTing new location");
        self.client
            .send_json(ApiRequest::post("/dhos/v1/location").json(location))
            .await
    }
}
