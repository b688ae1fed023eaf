use crate::helpers::{adapter_context, RecordingPublisher};
use dhos_async_adapter::clients::{ApiClient, ApiRequest};
use dhos_async_adapter::consumers::correlation;
use dhos_async_adapter::consumers::ErrorType;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(base_url: &str, timeout: Duration) -> ApiClient {
    ApiClient::new(
        reqwest::Client::new(),
        base_url,
        "a-token".to_owned().into(),
        timeout,
    )
}

#[tokio::test]
async fn requests_carry_the_token_and_the_current_correlation_id() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/ping"))
        .and(header("Authorization", "Bearer a-token"))
        .and(header("X-Request-ID", "the-correlation-id"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let client = client(&server.uri(), Duration::from_secs(2));

    // Act
    let outcome = correlation::scope("the-correlation-id".into(), async {
        client.send(ApiRequest::get("/dhos/v1/ping")).await
    })
    .await;

    // Assert
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn a_request_id_is_generated_outside_of_message_processing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_exists("X-Request-ID"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server.uri(), Duration::from_secs(2))
        .send(ApiRequest::get("/dhos/v1/ping"))
        .await;

    assert!(outcome.is_ok());
}

#[tokio::test]
async fn service_unavailable_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let error = client(&server.uri(), Duration::from_secs(2))
        .send(ApiRequest::post("/dhos/v2/event").json(json!({})))
        .await
        .unwrap_err();

    assert_eq!(error.error_type, ErrorType::Requeue);
}

#[tokio::test]
async fn other_error_responses_are_terminal() {
    let server = MockServer::start().await;
    for status in [400, 404, 409, 500] {
        server.reset().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let error = client(&server.uri(), Duration::from_secs(2))
            .send(ApiRequest::post("/dhos/v2/event").json(json!({})))
            .await
            .unwrap_err();

        assert_eq!(error.error_type, ErrorType::Reject, "HTTP {status}");
    }
}

#[tokio::test]
async fn error_responses_can_be_handed_to_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = client(&server.uri(), Duration::from_secs(2))
        .send(ApiRequest::get("/dhos/v1/patient/p").allow_http_error())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
}

#[tokio::test]
async fn an_unreachable_api_is_retryable() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    drop(server);

    let error = client(&base_url, Duration::from_secs(2))
        .send(ApiRequest::get("/dhos/v1/ping"))
        .await
        .unwrap_err();

    assert_eq!(error.error_type, ErrorType::Requeue);
}

#[tokio::test]
async fn a_slow_api_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let error = client(&server.uri(), Duration::from_millis(100))
        .send(ApiRequest::get("/dhos/v1/ping"))
        .await
        .unwrap_err();

    assert_eq!(error.error_type, ErrorType::Requeue);
}

#[tokio::test]
async fn dea_requests_identify_the_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dea/ingest/v2/dhos_data"))
        .and(header("Authorization", "Bearer dea-token"))
        .and(header("x-dhos-customer-code", "DEV"))
        .and(header("x-dhos-environment", "dev"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let outcome = context.clients.dea_ingest.post_dhos_data(json!({})).await;

    assert!(outcome.is_ok());
}

#[tokio::test]
async fn a_missing_patient_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/patient/patient-uuid"))
        .and(query_param("product_name", "GDM"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let patient = context
        .clients
        .services
        .get_patient("patient-uuid", Some("GDM"))
        .await
        .unwrap();

    assert!(patient.is_none());
}

#[tokio::test]
async fn the_patient_uuid_of_an_encounter_cannot_be_patched() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/encounter/encounter-uuid"))
        .and(body_json(json!({"score_system": "news2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "encounter-uuid"})))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let encounter = context
        .clients
        .encounters
        .update_encounter(
            "encounter-uuid",
            json!({"score_system": "news2", "patient_uuid": "patient-uuid"}),
        )
        .await
        .unwrap();

    assert_eq!(encounter["uuid"], "encounter-uuid");
}
