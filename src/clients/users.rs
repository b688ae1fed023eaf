use crate::clients::api_client::json_body;
use crate::clients::{ApiClient, ApiRequest};
use crate::consumers::HandlerError;
use reqwest::StatusCode;
use serde_json::Value;

/// DHOS Users API.
#[derive(Clone, Debug)]
pub struct UsersApi {
    client: ApiClient,
}

impl UsersApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// `None` if there is no such clinician, e.g. observations taken by a device.
    ///
    /// Any other non-2xx response is terminal, `503` included.
    pub async fn get_clinician(&self, clinician_uuid: &str) -> Result<Option<Value>, HandlerError> {
        tracing::debug!(clinician_uuid, "GETting clinician");
        let response = self
            .client
            .send(
                ApiRequest::get(format!("/dhos/v1/clinician/{}", clinician_uuid))
                    .allow_http_error(),
            )
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(HandlerError::reject(anyhow::anyhow!(
                "Unexpected response from Users API (HTTP {})",
                status.as_u16()
            )));
        }
        json_body(response).await.map(Some)
    }
}
