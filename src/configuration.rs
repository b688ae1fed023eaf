//! Runtime settings of the adapter.
//!
//! Settings are read from an optional configuration file, then overridden by environment
//! variables prefixed with `ADAPTER` using `__` as separator,
//! e.g. `ADAPTER__RABBITMQ__HOST=rabbitmq` sets `Settings.rabbitmq.host`.
use crate::amqp::configuration::RabbitMqSettings;
use config::{Config, ConfigError, Environment, File};
use redact::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::{deserialize_bool_from_anything, deserialize_number_from_string};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rabbitmq: RabbitMqSettings,
    #[serde(default)]
    pub topology: TopologySettings,
    #[serde(default)]
    pub consumer: ConsumerSettings,
    pub apis: ApiSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from `config_file` (if provided and present) and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("ADAPTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// Names of the broker objects shared with the rest of the platform.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TopologySettings {
    /// Durable topic exchange every task message is published to.
    pub task_exchange: String,
    /// Durable fanout exchange receiving rejected messages.
    pub dead_letter_exchange: String,
    /// Queue bound to the dead letter exchange, for manual inspection.
    pub error_queue: String,
}

impl Default for TopologySettings {
    fn default() -> Self {
        Self {
            task_exchange: "dhos".into(),
            dead_letter_exchange: "dhos-dlx".into(),
            error_queue: "errors".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConsumerSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub reconnect_interval_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub prefetch_count: u16,
    /// Sentinel file present while the broker connection is alive.
    pub liveness_file: Option<PathBuf>,
    /// Log message bodies in clear at debug level.
    /// They can contain patient-identifiable data: keep it off outside of development.
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub log_message_bodies: bool,
}

impl ConsumerSettings {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_seconds)
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            reconnect_interval_seconds: 5,
            prefetch_count: 1,
            liveness_file: None,
            log_message_bodies: false,
        }
    }
}

/// Where and how to reach the downstream HTTP APIs.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub dea_ingest_api_url: String,
    pub dhos_activation_auth_api_url: String,
    pub dhos_audit_api_url: String,
    pub dhos_connector_api_url: String,
    pub dhos_encounters_api_url: String,
    pub dhos_locations_api_url: String,
    pub dhos_messages_api_url: String,
    pub dhos_notifications_api_url: String,
    pub dhos_observations_api_url: String,
    pub dhos_services_api_url: String,
    pub dhos_users_api_url: String,
    pub gdm_bg_readings_api_url: String,
    #[serde(
        default = "default_request_timeout_seconds",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub request_timeout_seconds: u64,
    /// Sent as `Authorization: Bearer <token>` to the DHOS APIs.
    pub bearer_token: Secret<String>,
    /// Token for the DEA ingest API. `bearer_token` is used if missing.
    #[serde(default)]
    pub dea_bearer_token: Option<Secret<String>>,
    pub customer_code: String,
    pub environment: String,
    #[serde(default = "unknown")]
    pub build_circle_tag: String,
    #[serde(default = "unknown")]
    pub build_git_tag: String,
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn unknown() -> String {
    "unknown".into()
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn dea_bearer_token(&self) -> &Secret<String> {
        self.dea_bearer_token.as_ref().unwrap_or(&self.bearer_token)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSettings {
    /// An `EnvFilter` directive, e.g. `info,lapin=warn`. `RUST_LOG` takes precedence.
    pub filter: String,
    /// JSON lines if `true`, human-readable output otherwise.
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: true,
        }
    }
}
