//! The message handlers of the adapter and the routing table wiring them to queues.
//!
//! Every handler decodes the message body, calls one or more downstream APIs and, in a few
//! cases, publishes a derived message back to the task exchange.
pub mod actions;
pub mod activation_auth_clinician;
pub mod audit_event;
pub mod bg_reading_abnormal;
pub mod bg_reading_alert;
pub mod create_oru_message;
pub mod dea_export;
pub mod email;
pub mod encounter_obs_set;
pub mod encounter_update;
pub mod hl7_cda_message;
pub mod orphaned_observations;
pub mod patient_update;

use crate::clients::Clients;
use crate::configuration::ApiSettings;
use crate::consumers::{HandlerError, QueueMode, RegistryError, RoutingTable};
use crate::publishers::{OutboundPublisher, PublisherError};
use serde_json::Value;
use std::sync::Arc;

pub const ACTIVATION_AUTH_QUEUE: &str = "dhos-activation-auth-adapter-task-queue";
pub const AGGREGATOR_QUEUE: &str = "dhos-aggregator-adapter-task-queue";
pub const AUDIT_QUEUE: &str = "dhos-audit-adapter-task-queue";
pub const CONNECTOR_QUEUE: &str = "dhos-connector-adapter-task-queue";
pub const DEA_EXPORT_QUEUE: &str = "dhos-dea-export-adapter-task-queue";
pub const ENCOUNTERS_QUEUE: &str = "dhos-encounters-adapter-task-queue";
pub const MESSAGES_QUEUE: &str = "dhos-messages-adapter-task-queue";
pub const NOTIFICATIONS_QUEUE: &str = "dhos-notifications-adapter-task-queue";
pub const OBSERVATIONS_QUEUE: &str = "dhos-observations-adapter-task-queue";
pub const PDF_QUEUE: &str = "dhos-pdf-adapter-task-queue";
pub const QUESTIONS_QUEUE: &str = "dhos-questions-adapter-task-queue";
pub const SERVICES_QUEUE: &str = "dhos-services-adapter-task-queue";
pub const SMS_QUEUE: &str = "dhos-sms-adapter-task-queue";
pub const BG_READINGS_QUEUE: &str = "gdm-bg-readings-adapter-task-queue";

/// Bindings that used to exist and are removed at startup.
const DEPRECATED_BINDINGS: &[(&str, &[&str])] = &[
    (
        DEA_EXPORT_QUEUE,
        &[
            "dhos.DM000012",
            "dhos.DM000013",
            "dhos.DM000014",
            "dhos.DM000016",
        ],
    ),
    (
        CONNECTOR_QUEUE,
        &["dhos.DM000001", "dhos.DM000006", "dhos.DM000009"],
    ),
    (ENCOUNTERS_QUEUE, &["dhos.DM000003"]),
    (
        MESSAGES_QUEUE,
        &["gdm.961331000000105", "gdm.2021801000001109"],
    ),
    (
        PDF_QUEUE,
        &["dhos.DM000008", "dhos.DM000012", "gdm.717391000000106"],
    ),
    (QUESTIONS_QUEUE, &["gdm.25241000000106"]),
    (SERVICES_QUEUE, &["dhos.24431000000100"]),
    (SMS_QUEUE, &["dhos.936701000000103"]),
];

/// Everything handlers need to do their job, shared by all of them.
pub struct AdapterContext {
    pub clients: Clients,
    pub publisher: Arc<dyn OutboundPublisher>,
    pub deployment: Deployment,
}

impl AdapterContext {
    /// Publish a derived message to the task exchange.
    ///
    /// A message no queue is bound for is rejected: redelivery will not make it routable. Any
    /// other failure requeues.
    pub async fn publish(&self, routing_key: &str, body: &Value) -> Result<(), HandlerError> {
        self.publisher
            .publish_json(routing_key, body)
            .await
            .map_err(|e| {
                let unroutable = matches!(e, PublisherError::UnroutableMessage(_));
                let error =
                    anyhow::anyhow!("Failed to publish '{}' message: {:?}", routing_key, e);
                if unroutable {
                    HandlerError::reject(error)
                } else {
                    HandlerError::requeue(error)
                }
            })
    }
}

/// Identifies this deployment in data sent outside of the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub customer_code: String,
    pub environment: String,
    pub build_circle_tag: String,
    pub build_git_tag: String,
}

impl From<&ApiSettings> for Deployment {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            customer_code: settings.customer_code.clone(),
            environment: settings.environment.clone(),
            build_circle_tag: settings.build_circle_tag.clone(),
            build_git_tag: settings.build_git_tag.clone(),
        }
    }
}

/// The production routing table.
///
/// Queues that no longer have messages routed to them are still declared: they may hold
/// messages published before their routes were retired.
pub fn routing_table() -> Result<RoutingTable<AdapterContext>, RegistryError> {
    let mut builder = RoutingTable::builder()
        .route_fn(
            DEA_EXPORT_QUEUE,
            dea_export::ROUTING_KEY,
            dea_export::export_gdm_syne_bg_readings,
        )
        .route_fn(
            ACTIVATION_AUTH_QUEUE,
            activation_auth_clinician::CREATE_ROUTING_KEY,
            activation_auth_clinician::create,
        )
        .route_fn(
            ACTIVATION_AUTH_QUEUE,
            activation_auth_clinician::UPDATE_ROUTING_KEY,
            activation_auth_clinician::update,
        )
        .route_fn(AUDIT_QUEUE, audit_event::ROUTING_KEY, audit_event::process)
        .route_fn(
            CONNECTOR_QUEUE,
            hl7_cda_message::ROUTING_KEY,
            hl7_cda_message::process,
        )
        .route_fn(
            ENCOUNTERS_QUEUE,
            encounter_obs_set::ROUTING_KEY,
            encounter_obs_set::process,
        )
        .route_fn(
            ENCOUNTERS_QUEUE,
            encounter_update::ROUTING_KEY,
            encounter_update::process,
        )
        .route_fn(NOTIFICATIONS_QUEUE, email::ROUTING_KEY, email::process)
        .route_fn(
            OBSERVATIONS_QUEUE,
            orphaned_observations::ROUTING_KEY,
            orphaned_observations::process,
        )
        .route_fn(
            SERVICES_QUEUE,
            bg_reading_alert::ROUTING_KEY,
            bg_reading_alert::process,
        )
        .route_fn(
            SERVICES_QUEUE,
            create_oru_message::ROUTING_KEY,
            create_oru_message::process,
        )
        .route_fn(
            SERVICES_QUEUE,
            patient_update::ROUTING_KEY,
            patient_update::process,
        )
        .route_fn(
            BG_READINGS_QUEUE,
            bg_reading_abnormal::ROUTING_KEY,
            bg_reading_abnormal::process,
        )
        .queue(AGGREGATOR_QUEUE)
        .queue(MESSAGES_QUEUE)
        .queue(PDF_QUEUE)
        .queue(QUESTIONS_QUEUE)
        .queue(SMS_QUEUE)
        .queue_mode(CONNECTOR_QUEUE, QueueMode::Lazy);

    for (queue_name, routing_keys) in DEPRECATED_BINDINGS {
        for routing_key in *routing_keys {
            builder = builder.unbind(*queue_name, *routing_key);
        }
    }
    builder.build()
}
