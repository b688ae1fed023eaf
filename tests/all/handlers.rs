use crate::helpers::{
    adapter_context, FailingPublisher, RecordingAcker, RecordingPublisher, UnroutablePublisher,
};
use dhos_async_adapter::consumers::{BrokerAction, Dispatcher, LivenessMarker};
use dhos_async_adapter::handlers::{routing_table, AdapterContext};
use serde_json::{json, Value};
use wiremock::matchers::{
    body_json, body_partial_json, method, path, path_regex, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Dispatch `body` with `routing_key` through the production routing table.
async fn dispatch(context: AdapterContext, routing_key: &str, body: Value) -> BrokerAction {
    let registry = routing_table().unwrap().handler_registry();
    let dispatcher = Dispatcher::new(registry, context, LivenessMarker::new());
    let acker = RecordingAcker::default();
    let action = dispatcher
        .on_message(
            acker
                .message(body.to_string())
                .with_routing_key(routing_key),
        )
        .await;
    assert_eq!(acker.actions(), vec![action]);
    action
}

#[tokio::test]
async fn audit_events_are_forwarded() {
    // Arrange
    let server = MockServer::start().await;
    let event = json!({"event_type": "login", "event_data": {"clinician_id": "c"}});
    Mock::given(method("POST"))
        .and(path("/dhos/v2/event"))
        .and(body_json(&event))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    // Act
    let action = dispatch(context, "dhos.34837004", event).await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn an_audit_event_rejected_by_the_api_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.34837004",
        json!({"event_type": "login", "event_data": {}}),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
}

#[tokio::test]
async fn an_unavailable_audit_api_requeues_the_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.34837004",
        json!({"event_type": "login", "event_data": {}}),
    )
    .await;

    assert_eq!(action, BrokerAction::Requeue);
}

#[tokio::test]
async fn emails_of_unknown_type_are_rejected_without_calling_the_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.DM000017",
        json!({"email_address": "jane@example.com", "email_type": "SPAM"}),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
}

#[tokio::test]
async fn welcome_emails_are_sent() {
    let server = MockServer::start().await;
    let email = json!({"email_address": "jane@example.com", "email_type": "WELCOME_EMAIL"});
    Mock::given(method("POST"))
        .and(path("/dhos/v1/email"))
        .and(body_json(&email))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(context, "dhos.DM000017", email).await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let server = MockServer::start().await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());
    let registry = routing_table().unwrap().handler_registry();
    let dispatcher = Dispatcher::new(registry, context, LivenessMarker::new());
    let acker = RecordingAcker::default();

    let action = dispatcher
        .on_message(acker.message("{not json").with_routing_key("dhos.34837004"))
        .await;

    assert_eq!(action, BrokerAction::Reject);
}

#[tokio::test]
async fn abnormal_readings_trigger_alerts_processing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gdm/v1/process_alerts/reading/reading-uuid"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(context, "gdm.166922008", json!({"uuid": "reading-uuid"})).await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn a_bg_reading_alert_creates_a_message_per_location() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/patient/patient-uuid"))
        .and(query_param("product_name", "GDM"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "patient-uuid",
            "first_name": "Jane",
            "locations": ["location-1", "location-2"],
        })))
        .expect(1)
        .mount(&server)
        .await;
    for location in ["location-1", "location-2"] {
        Mock::given(method("POST"))
            .and(path("/dhos/v2/message"))
            .and(body_partial_json(json!({
                "sender": "patient-uuid",
                "sender_type": "patient",
                "receiver": location,
                "receiver_type": "location",
                "message_type": {"value": 7},
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
    }
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    // Act
    let action = dispatch(
        context,
        "gdm.424167000",
        json!({"patient_uuid": "patient-uuid", "alert_type": "COUNTS_RED"}),
    )
    .await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn activity_alerts_and_unknown_patients_produce_no_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let grey = dispatch(
        adapter_context(&server.uri(), RecordingPublisher::default()),
        "gdm.424167000",
        json!({"patient_uuid": "patient-uuid", "alert_type": "ACTIVITY_GREY"}),
    )
    .await;
    let unknown_patient = dispatch(
        adapter_context(&server.uri(), RecordingPublisher::default()),
        "gdm.424167000",
        json!({"patient_uuid": "patient-uuid", "alert_type": "PERCENTAGES_AMBER"}),
    )
    .await;

    assert_eq!(grey, BrokerAction::Ack);
    assert_eq!(unknown_patient, BrokerAction::Ack);
}

#[tokio::test]
async fn a_patient_without_locations_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"uuid": "patient-uuid", "first_name": "Jane"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "gdm.424167000",
        json!({"patient_uuid": "patient-uuid", "alert_type": "COUNTS_RED"}),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
}

#[tokio::test]
async fn clinicians_are_created_with_their_product_names() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/clinician"))
        .and(body_json(json!({
            "clinician_id": "clinician-uuid",
            "send_entry_identifier": "321",
            "login_active": true,
            "products": ["GDM"],
            "groups": ["GDM Clinician"],
            "contract_expiry_eod_date": "2030-01-01",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.D9000001",
        json!({
            "uuid": "clinician-uuid",
            "send_entry_identifier": "321",
            "login_active": true,
            "products": [{"product_name": "GDM", "uuid": "product-uuid"}],
            "groups": ["GDM Clinician"],
            "contract_expiry_eod_date": "2030-01-01",
        }),
    )
    .await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn clinicians_are_updated_by_uuid() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/clinician/clinician-uuid"))
        .and(body_json(json!({
            "login_active": false,
            "products": ["SEND"],
            "groups": [],
            "contract_expiry_eod_date": null,
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.D9000002",
        json!({
            "uuid": "clinician-uuid",
            "login_active": false,
            "products": [{"product_name": "SEND"}],
            "groups": [],
            "contract_expiry_eod_date": null,
        }),
    )
    .await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn cda_messages_are_handed_to_the_connector_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/cda_message"))
        .and(body_json(json!({"type": "HL7v3CDA", "content": "<ClinicalDocument/>"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.423779001",
        json!({"content": "<ClinicalDocument/>"}),
    )
    .await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn syne_bg_readings_are_exported_with_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dea/ingest/v2/dhos_data"))
        .and(body_partial_json(json!({
            "metadata": {
                "data_type": "syne_bg_readings",
                "customer": "DEV",
                "environment": "dev",
                "circle_tag": "circle-1",
                "git_tag": "v1.0.0",
                "num_records": 2,
            },
            "data": [{"reading": 1}, {"reading": 2}],
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.DM000015",
        json!([{"reading": 1}, {"reading": 2}]),
    )
    .await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn observation_sets_are_enriched_with_their_encounter() {
    // Arrange
    let server = MockServer::start().await;
    let encounter = json!({"uuid": "encounter-uuid", "location_uuid": "ward"});
    Mock::given(method("GET"))
        .and(path("/dhos/v1/encounter/encounter-uuid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&encounter))
        .expect(1)
        .mount(&server)
        .await;
    let publisher = RecordingPublisher::default();
    let context = adapter_context(&server.uri(), publisher.clone());
    let data = json!({
        "observation_set": {"encounter_id": "encounter-uuid", "score_value": 3},
        "patient": {"uuid": "patient-uuid"},
    });

    // Act
    let action = dispatch(
        context,
        "dhos.DM000004",
        json!({"actions": [{"name": "process_observation_set", "data": data}]}),
    )
    .await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let (routing_key, body) = &published[0];
    assert_eq!(routing_key, "dhos.DM000005");
    let enriched = &body["actions"][0];
    assert_eq!(enriched["name"], "process_observation_set");
    assert_eq!(enriched["data"]["encounter"], encounter);
    assert_eq!(enriched["data"]["observation_set"]["score_value"], 3);
    assert_eq!(enriched["data"]["patient"]["uuid"], "patient-uuid");
}

#[tokio::test]
async fn a_failed_publish_requeues_the_observation_set() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "e"})))
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), FailingPublisher);

    let action = dispatch(
        context,
        "dhos.DM000004",
        json!({"actions": [{
            "name": "process_observation_set",
            "data": {"observation_set": {"encounter_id": "e"}},
        }]}),
    )
    .await;

    assert_eq!(action, BrokerAction::Requeue);
}

#[tokio::test]
async fn an_observation_set_nobody_is_bound_for_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "e"})))
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), UnroutablePublisher);

    let action = dispatch(
        context,
        "dhos.DM000004",
        json!({"actions": [{
            "name": "process_observation_set",
            "data": {"observation_set": {"encounter_id": "e"}},
        }]}),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
}

#[tokio::test]
async fn a_message_without_the_expected_action_is_rejected() {
    let server = MockServer::start().await;
    let publisher = RecordingPublisher::default();
    let context = adapter_context(&server.uri(), publisher.clone());

    let action = dispatch(
        context,
        "dhos.DM000004",
        json!({"actions": [{"name": "process_patient", "data": {}}]}),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
    assert!(publisher.published().is_empty());
}

fn orphaned_observations_message() -> Value {
    json!({
        "dhos_connector_message_uuid": "message-uuid",
        "actions": [{
            "name": "check_for_orphaned_observations",
            "data": {"encounter_uuid": "encounter-uuid", "patient_uuid": "patient-uuid"},
        }],
    })
}

async fn mark_as_processed(server: &MockServer) {
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/message/message-uuid"))
        .and(body_json(json!({"is_processed": true})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn orphaned_observations_are_merged_into_a_discharged_local_encounter() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v2/observation_set"))
        .and(query_param("encounter_id", "encounter-uuid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"uuid": "obs-set"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/encounter/encounter-uuid"))
        .and(query_param("show_deleted", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "encounter-uuid",
            "location_uuid": "ward",
            "dh_product": [{"uuid": "product-uuid"}],
            "patient_record_uuid": "record-uuid",
            "encounter_type": "INPATIENT",
            "admitted_at": "2020-01-01T00:00:00.000Z",
            "score_system": "news2",
            "spo2_scale": 1,
            "child_of": null,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dhos/v2/encounter"))
        .and(body_partial_json(json!({
            "location_uuid": "ward",
            "dh_product_uuid": "product-uuid",
            "patient_record_uuid": "record-uuid",
            "patient_uuid": "patient-uuid",
            "encounter_type": "INPATIENT",
            "admitted_at": "2020-01-01T00:00:00.000Z",
            "score_system": "news2",
            "spo2_scale": 1,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "parent-uuid"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/encounter/encounter-uuid"))
        .and(body_json(json!({"child_of_encounter_uuid": "parent-uuid"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "encounter-uuid"})))
        .expect(1)
        .mount(&server)
        .await;
    mark_as_processed(&server).await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    // Act
    let action = dispatch(context, "dhos.DM000002", orphaned_observations_message()).await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn encounters_without_observations_are_left_alone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v2/observation_set"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mark_as_processed(&server).await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(context, "dhos.DM000002", orphaned_observations_message()).await;

    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn already_merged_encounters_are_not_merged_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v2/observation_set"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"uuid": "obs-set"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/encounter/encounter-uuid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "encounter-uuid",
            "location_uuid": "ward",
            "dh_product": [{"uuid": "product-uuid"}],
            "patient_record_uuid": "record-uuid",
            "encounter_type": "INPATIENT",
            "admitted_at": "2020-01-01T00:00:00.000Z",
            "score_system": "news2",
            "child_of": "parent-uuid",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mark_as_processed(&server).await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(context, "dhos.DM000002", orphaned_observations_message()).await;

    assert_eq!(action, BrokerAction::Ack);
}

fn enriched_observation_set() -> Value {
    json!({
        "observation_set": {"created_by": "clinician-uuid", "score_value": 3},
        "encounter": {
            "uuid": "encounter-uuid",
            "patient_record_uuid": "record-uuid",
            "location_uuid": "ward-uuid",
        },
    })
}

async fn oru_message_lookups(server: &MockServer, clinician: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/dhos/v1/patient/record/record-uuid"))
        .and(query_param("compact", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "patient-uuid"})))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/clinician/clinician-uuid"))
        .respond_with(clinician)
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/location/ward-uuid"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"uuid": "ward-uuid", "ods_code": "WRD"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn oru_messages_carry_the_patient_clinician_and_ods_code() {
    // Arrange
    let server = MockServer::start().await;
    oru_message_lookups(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"uuid": "clinician-uuid"})),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/oru_message"))
        .and(body_json(json!({"actions": [{
            "name": "process_observation_set",
            "data": {
                "observation_set": {"created_by": "clinician-uuid", "score_value": 3},
                "encounter": {
                    "uuid": "encounter-uuid",
                    "patient_record_uuid": "record-uuid",
                    "location_uuid": "ward-uuid",
                    "location_ods_code": "WRD",
                },
                "patient": {"uuid": "patient-uuid"},
                "clinician": {"uuid": "clinician-uuid"},
            },
        }]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    // Act
    let action = dispatch(
        context,
        "dhos.DM000005",
        json!({"actions": [{"name": "process_observation_set", "data": enriched_observation_set()}]}),
    )
    .await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn oru_messages_are_sent_without_an_unknown_clinician() {
    let server = MockServer::start().await;
    oru_message_lookups(&server, ResponseTemplate::new(404)).await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/oru_message"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.DM000005",
        json!({"actions": [{"name": "process_observation_set", "data": enriched_observation_set()}]}),
    )
    .await;

    assert_eq!(action, BrokerAction::Ack);
    let requests = server.received_requests().await.unwrap();
    let oru_message = requests
        .iter()
        .find(|request| request.url.path() == "/dhos/v1/oru_message")
        .unwrap();
    let body: Value = oru_message.body_json().unwrap();
    let data = &body["actions"][0]["data"];
    assert_eq!(data["patient"]["uuid"], "patient-uuid");
    assert!(data.get("clinician").is_none());
}

#[tokio::test]
async fn a_failing_users_api_rejects_the_oru_message() {
    let server = MockServer::start().await;
    oru_message_lookups(&server, ResponseTemplate::new(500)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.DM000005",
        json!({"actions": [{"name": "process_observation_set", "data": enriched_observation_set()}]}),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
}

fn encounter_update_message(extra: Value) -> Value {
    let mut data = json!({
        "patient_uuid": "patient-uuid",
        "location_uuid": "ward-uuid",
        "dh_product_uuid": "product-uuid",
        "patient_record_uuid": "record-uuid",
        "epr_encounter_id": "EPR-1",
        "encounter_type": "INPATIENT",
        "admitted_at": "2020-01-01T00:00:00.000Z",
        "score_system_default_for_location": "news2",
    });
    data.as_object_mut()
        .unwrap()
        .extend(extra.as_object().unwrap().clone());
    json!({
        "dhos_connector_message_uuid": "message-uuid",
        "actions": [{"name": "process_encounter", "data": data}],
    })
}

/// Serves the EPR encounters and the open local encounters of `patient-uuid`.
async fn existing_encounters(server: &MockServer, epr: Value, open: Value) {
    Mock::given(method("GET"))
        .and(path("/dhos/v2/encounter"))
        .and(query_param("patient_id", "patient-uuid"))
        .and(query_param("epr_encounter_id", "EPR-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(epr))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v2/encounter"))
        .and(query_param("patient_id", "patient-uuid"))
        .and(query_param_is_missing("epr_encounter_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(open))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn a_new_epr_encounter_is_created_with_the_location_score_system() {
    // Arrange
    let server = MockServer::start().await;
    existing_encounters(&server, json!([]), json!([])).await;
    Mock::given(method("POST"))
        .and(path("/dhos/v2/encounter"))
        .and(body_partial_json(json!({
            "patient_uuid": "patient-uuid",
            "epr_encounter_id": "EPR-1",
            "score_system": "news2",
            "deleted_at": null,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "new-encounter"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path_regex("^/dhos/v1/encounter/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mark_as_processed(&server).await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    // Act
    let action = dispatch(context, "dhos.305058001", encounter_update_message(json!({}))).await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn other_encounters_are_merged_into_the_updated_epr_encounter() {
    // Arrange
    let server = MockServer::start().await;
    existing_encounters(
        &server,
        json!([{"uuid": "epr-encounter", "epr_encounter_id": "EPR-1"}]),
        json!([
            {"uuid": "local-encounter", "epr_encounter_id": null},
            {"uuid": "other-epr-encounter", "epr_encounter_id": "EPR-0"},
        ]),
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/encounter/epr-encounter"))
        .and(body_partial_json(json!({"location_uuid": "ward-uuid", "deleted_at": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "epr-encounter"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/encounter/local-encounter"))
        .and(body_json(json!({"child_of_encounter_uuid": "epr-encounter"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "local-encounter"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/encounter/merge"))
        .and(body_json(json!({
            "child_record_uuid": "child-record-uuid",
            "parent_record_uuid": "record-uuid",
            "parent_patient_uuid": "patient-uuid",
            "message_uuid": "message-uuid",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    mark_as_processed(&server).await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    // Act
    let action = dispatch(
        context,
        "dhos.305058001",
        encounter_update_message(json!({"merge_patient_record_uuid": "child-record-uuid"})),
    )
    .await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
}

#[tokio::test]
async fn a_cancelled_admission_is_checked_for_orphaned_observations() {
    let server = MockServer::start().await;
    existing_encounters(&server, json!([{"uuid": "epr-encounter"}]), json!([])).await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/encounter/epr-encounter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uuid": "epr-encounter"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/message/message-uuid"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let publisher = RecordingPublisher::default();
    let context = adapter_context(&server.uri(), publisher.clone());

    let action = dispatch(
        context,
        "dhos.305058001",
        encounter_update_message(json!({"admission_cancelled": true})),
    )
    .await;

    assert_eq!(action, BrokerAction::Ack);
    assert_eq!(
        publisher.published(),
        vec![(
            "dhos.DM000002".to_owned(),
            json!({
                "dhos_connector_message_uuid": "message-uuid",
                "actions": [{
                    "name": "check_for_orphaned_observations",
                    "data": {"encounter_uuid": "epr-encounter", "patient_uuid": "patient-uuid"},
                }],
            })
        )]
    );
}

fn send_patient() -> Value {
    json!({
        "uuid": "patient-uuid",
        "record": {"uuid": "record-uuid"},
        "dh_products": [
            {"uuid": "gdm-product", "product_name": "GDM"},
            {"uuid": "send-product", "product_name": "SEND"},
        ],
    })
}

#[tokio::test]
async fn known_patients_are_updated_and_the_message_marked_as_processed() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/patient"))
        .and(query_param("identifier_type", "nhs_number"))
        .and(query_param("identifier_value", "1234567890"))
        .and(query_param("product_name", "SEND"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"uuid": "patient-uuid"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/dhos/v1/patient/patient-uuid"))
        .and(body_json(json!({
            "first_name": "Jane",
            "nhs_number": "1234567890",
            "hospital_number": "MRN-1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(send_patient()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    mark_as_processed(&server).await;
    let publisher = RecordingPublisher::default();
    let context = adapter_context(&server.uri(), publisher.clone());

    // Act
    let action = dispatch(
        context,
        "dhos.24891000000101",
        json!({
            "dhos_connector_message_uuid": "message-uuid",
            "actions": [{
                "name": "process_patient",
                "data": {"first_name": "Jane", "nhs_number": "1234567890", "mrn": "MRN-1"},
            }],
        }),
    )
    .await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn new_patients_and_locations_are_created_and_the_encounter_forwarded() {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/patient"))
        .and(query_param("identifier_type", "hospital_number"))
        .and(query_param("identifier_value", "MRN-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/patient"))
        .and(query_param("type", "SEND"))
        .and(body_partial_json(json!({"hospital_number": "MRN-1", "record": {}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(send_patient()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/location/search"))
        .and(query_param("ods_code", "WRD:BayA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dhos/v1/location/search"))
        .and(query_param("ods_code", "WRD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ward-uuid": {"uuid": "ward-uuid", "score_system_default": "meows"},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dhos/v1/location"))
        .and(body_partial_json(json!({
            "ods_code": "WRD:BayA",
            "display_name": "BayA",
            "location_type": "1064311000000104",
            "parent_ods_code": "WRD",
            "active": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": "bay-uuid",
            "score_system_default": null,
            "parent": {"uuid": "ward-uuid", "score_system_default": "meows"},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let publisher = RecordingPublisher::default();
    let context = adapter_context(&server.uri(), publisher.clone());

    // Act
    let action = dispatch(
        context,
        "dhos.24891000000101",
        json!({
            "dhos_connector_message_uuid": "message-uuid",
            "actions": [
                {"name": "process_patient", "data": {"first_name": "Jane", "mrn": "MRN-1"}},
                {
                    "name": "process_location",
                    "data": {"location": {"epr_ward_code": "WRD", "epr_bay_code": "BayA"}},
                },
                {"name": "process_encounter", "data": {"epr_encounter_id": "EPR-1"}},
            ],
        }),
    )
    .await;

    // Assert
    assert_eq!(action, BrokerAction::Ack);
    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let (routing_key, body) = &published[0];
    assert_eq!(routing_key, "dhos.305058001");
    assert_eq!(body["dhos_connector_message_uuid"], "message-uuid");
    assert_eq!(
        body["actions"][2]["data"],
        json!({
            "epr_encounter_id": "EPR-1",
            "patient_uuid": "patient-uuid",
            "patient_record_uuid": "record-uuid",
            "dh_product_uuid": "send-product",
            "location_uuid": "bay-uuid",
            "previous_location_uuid": null,
            "merge_patient_record_uuid": null,
            "score_system_default_for_location": "meows",
        })
    );
}

#[tokio::test]
async fn a_patient_without_identifiers_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    let context = adapter_context(&server.uri(), RecordingPublisher::default());

    let action = dispatch(
        context,
        "dhos.24891000000101",
        json!({
            "dhos_connector_message_uuid": "message-uuid",
            "actions": [{"name": "process_patient", "data": {"first_name": "Jane"}}],
        }),
    )
    .await;

    assert_eq!(action, BrokerAction::Reject);
}
