//! Messages published by the Connector API: a list of named actions, each with its own data.
use crate::consumers::HandlerError;
use crate::validation::Validate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub data: Value,
}

/// An actions message tied to an HL7 message stored in the Connector API.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ActionsMessage {
    pub dhos_connector_message_uuid: String,
    pub actions: Vec<Action>,
}

impl Validate for ActionsMessage {}

#[derive(Deserialize, Debug, Clone)]
pub struct ActionsMessageNoConnectorId {
    pub actions: Vec<Action>,
}

impl Validate for ActionsMessageNoConnectorId {}

/// Find the action called `action_name`.
///
/// A message without it is rejected: it will never carry it, no matter how many times it is
/// delivered.
pub fn extract_action<'a>(
    actions: &'a [Action],
    action_name: &str,
) -> Result<&'a Action, HandlerError> {
    if actions.is_empty() {
        tracing::info!("No actions present in message");
        return Err(HandlerError::reject(anyhow::anyhow!(
            "No actions present in message"
        )));
    }
    match actions.iter().find(|action| action.name == action_name) {
        Some(action) => {
            tracing::debug!("Found action '{}'", action_name);
            Ok(action)
        }
        None => {
            tracing::info!("No action '{}' present in message", action_name);
            Err(HandlerError::reject(anyhow::anyhow!(
                "No action '{}' present in message",
                action_name
            )))
        }
    }
}

/// The action called `action_name`, for actions a message may or may not carry.
pub fn find_action<'a>(actions: &'a [Action], action_name: &str) -> Option<&'a Action> {
    actions.iter().find(|action| action.name == action_name)
}
