use async_trait::async_trait;
use dhos_async_adapter::clients::Clients;
use dhos_async_adapter::configuration::ApiSettings;
use dhos_async_adapter::consumers::{Acknowledger, BrokerAction, InboundMessage};
use dhos_async_adapter::handlers::{AdapterContext, Deployment};
use dhos_async_adapter::publishers::{OutboundPublisher, PublisherError};
use lapin::acker::Acker;
use lapin::message::{BasicReturnMessage, Delivery};
use lapin::BasicProperties;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Records the actions the dispatcher asks the broker to take.
#[derive(Clone, Default)]
pub struct RecordingAcker {
    actions: Arc<Mutex<Vec<BrokerAction>>>,
}

impl RecordingAcker {
    pub fn actions(&self) -> Vec<BrokerAction> {
        self.actions.lock().unwrap().clone()
    }

    /// A message carrying `body`, settled through this acker.
    pub fn message(&self, body: impl Into<Vec<u8>>) -> InboundMessage {
        InboundMessage::new(body, self.clone()).with_queue_name("test-queue")
    }
}

#[async_trait]
impl Acknowledger for RecordingAcker {
    async fn settle(&self, action: BrokerAction) -> Result<(), anyhow::Error> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }
}

/// Records outbound messages instead of sending them to a broker.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboundPublisher for RecordingPublisher {
    async fn publish_json(&self, routing_key: &str, body: &Value) -> Result<(), PublisherError> {
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_owned(), body.clone()));
        Ok(())
    }
}

/// A publisher whose broker is always unreachable.
pub struct FailingPublisher;

#[async_trait]
impl OutboundPublisher for FailingPublisher {
    async fn publish_json(&self, _routing_key: &str, _body: &Value) -> Result<(), PublisherError> {
        Err(PublisherError::TimeoutError)
    }
}

/// A publisher whose broker has no queue bound to any routing key.
pub struct UnroutablePublisher;

#[async_trait]
impl OutboundPublisher for UnroutablePublisher {
    async fn publish_json(&self, routing_key: &str, body: &Value) -> Result<(), PublisherError> {
        let returned = BasicReturnMessage {
            delivery: Delivery {
                delivery_tag: 1,
                exchange: "dhos".into(),
                routing_key: routing_key.into(),
                redelivered: false,
                properties: BasicProperties::default(),
                data: body.to_string().into_bytes(),
                acker: Acker::default(),
            },
            reply_code: 312,
            reply_text: "NO_ROUTE".into(),
        };
        Err(PublisherError::UnroutableMessage(Box::new(returned)))
    }
}

/// Every downstream API is served by `base_url`.
pub fn api_settings(base_url: &str) -> ApiSettings {
    ApiSettings {
        dea_ingest_api_url: base_url.into(),
        dhos_activation_auth_api_url: base_url.into(),
        dhos_audit_api_url: base_url.into(),
        dhos_connector_api_url: base_url.into(),
        dhos_encounters_api_url: base_url.into(),
        dhos_locations_api_url: base_url.into(),
        dhos_messages_api_url: base_url.into(),
        dhos_notifications_api_url: base_url.into(),
        dhos_observations_api_url: base_url.into(),
        dhos_services_api_url: base_url.into(),
        dhos_users_api_url: base_url.into(),
        gdm_bg_readings_api_url: base_url.into(),
        request_timeout_seconds: 2,
        bearer_token: "dhos-token".to_owned().into(),
        dea_bearer_token: Some("dea-token".to_owned().into()),
        customer_code: "DEV".into(),
        environment: "dev".into(),
        build_circle_tag: "circle-1".into(),
        build_git_tag: "v1.0.0".into(),
    }
}

pub fn adapter_context(
    base_url: &str,
    publisher: impl OutboundPublisher,
) -> AdapterContext {
    let settings = api_settings(base_url);
    AdapterContext {
        clients: Clients::from_settings(&settings).unwrap(),
        publisher: Arc::new(publisher),
        deployment: Deployment::from(&settings),
    }
}

/// Log lines emitted while the guard returned by [`capture_logs`] is alive, on this thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    /// Lines logged at error level.
    pub fn errors(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains("ERROR"))
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub fn capture_logs() -> (LogCapture, tracing::subscriber::DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
