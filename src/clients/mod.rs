//! HTTP clients for the downstream APIs driven by the adapter.
//!
//! All of them go through [`ApiClient`], which maps transport failures and error responses to
//! a [`HandlerError`](crate::consumers::HandlerError) of the appropriate kind: handlers can use
//! `?` on client calls and let the dispatcher settle the message.
mod activation_auth;
pub mod api_client;
mod audit;
mod bg_readings;
mod connector;
mod dea_ingest;
mod encounters;
mod locations;
mod messages;
mod notifications;
mod observations;
mod services;
mod users;

pub use activation_auth::ActivationAuthApi;
pub use api_client::{ApiClient, ApiRequest};
pub use audit::AuditApi;
pub use bg_readings::BgReadingsApi;
pub use connector::ConnectorApi;
pub use dea_ingest::DeaIngestApi;
pub use encounters::EncountersApi;
pub use locations::LocationsApi;
pub use messages::MessagesApi;
pub use notifications::NotificationsApi;
pub use observations::ObservationsApi;
pub use services::{PatientIdentifier, ServicesApi};
pub use users::UsersApi;

use crate::configuration::ApiSettings;
use anyhow::Context;

pub const CUSTOMER_CODE_HEADER: &str = "x-dhos-customer-code";
pub const ENVIRONMENT_HEADER: &str = "x-dhos-environment";

/// One client per downstream API, sharing the same connection pool.
#[derive(Clone, Debug)]
pub struct Clients {
    pub activation_auth: ActivationAuthApi,
    pub audit: AuditApi,
    pub bg_readings: BgReadingsApi,
    pub connector: ConnectorApi,
    pub dea_ingest: DeaIngestApi,
    pub encounters: EncountersApi,
    pub locations: LocationsApi,
    pub messages: MessagesApi,
    pub notifications: NotificationsApi,
    pub observations: ObservationsApi,
    pub services: ServicesApi,
    pub users: UsersApi,
}

impl Clients {
    pub fn from_settings(settings: &ApiSettings) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build the HTTP client")?;
        let timeout = settings.request_timeout();
        let dhos = |base_url: &str| {
            ApiClient::new(
                http.clone(),
                base_url,
                settings.bearer_token.clone(),
                timeout,
            )
        };

        let environment = if settings.environment.is_empty() {
            "not-set"
        } else {
            settings.environment.as_str()
        };
        let dea_ingest = ApiClient::new(
            http.clone(),
            &settings.dea_ingest_api_url,
            settings.dea_bearer_token().clone(),
            timeout,
        )
        .with_default_header(CUSTOMER_CODE_HEADER, &settings.customer_code)?
        .with_default_header(ENVIRONMENT_HEADER, environment)?;

        Ok(Self {
            activation_auth: ActivationAuthApi::new(dhos(&settings.dhos_activation_auth_api_url)),
            audit: AuditApi::new(dhos(&settings.dhos_audit_api_url)),
            bg_readings: BgReadingsApi::new(dhos(&settings.gdm_bg_readings_api_url)),
            connector: ConnectorApi::new(dhos(&settings.dhos_connector_api_url)),
            dea_ingest: DeaIngestApi::new(dea_ingest),
            encounters: EncountersApi::new(dhos(&settings.dhos_encounters_api_url)),
            locations: LocationsApi::new(dhos(&settings.dhos_locations_api_url)),
            messages: MessagesApi::new(dhos(&settings.dhos_messages_api_url)),
            notifications: NotificationsApi::new(dhos(&settings.dhos_notifications_api_url)),
            observations: ObservationsApi::new(dhos(&settings.dhos_observations_api_url)),
            services: ServicesApi::new(dhos(&settings.dhos_services_api_url)),
            users: UsersApi::new(dhos(&settings.dhos_users_api_url)),
        })
    }
}
