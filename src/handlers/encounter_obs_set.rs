use crate::consumers::{HandlerError, Incoming};
use crate::handlers::actions::{extract_action, ActionsMessageNoConnectorId};
use crate::handlers::AdapterContext;
use crate::validation::validate_message_body;
use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};

pub const ROUTING_KEY: &str = "dhos.DM000004";
/// Published once the observation set has been enriched with its encounter.
pub const ENRICHED_ROUTING_KEY: &str = crate::handlers::create_oru_message::ROUTING_KEY;

const PROCESS_OBSERVATION_SET: &str = "process_observation_set";

#[derive(Deserialize, Debug)]
struct ProcessObservationSet {
    observation_set: ObservationSet,
}

#[derive(Deserialize, Debug)]
struct ObservationSet {
    encounter_id: String,
}

/// Append the encounter of a published observation set, then publish it again for the next
/// step of the ORU message chain.
pub async fn process(incoming: Incoming<'_, AdapterContext>) -> Result<(), HandlerError> {
    tracing::info!(
        "Received observation set notification message ({})",
        ROUTING_KEY
    );
    let message: ActionsMessageNoConnectorId = validate_message_body(incoming.body)?;
    let action = extract_action(&message.actions, PROCESS_OBSERVATION_SET)?;

    let Value::Object(mut data) = action.data.clone() else {
        return Err(HandlerError::reject(anyhow::anyhow!(
            "Action '{}' data is not an object",
            PROCESS_OBSERVATION_SET
        )));
    };
    let validated: ProcessObservationSet =
        serde_json::from_value(Value::Object(data.clone()))
            .context("Failed to validate observation set action data")
            .map_err(HandlerError::reject)?;

    let context = &incoming.context;
    let encounter = context
        .clients
        .encounters
        .get_encounter(&validated.observation_set.encounter_id, false)
        .await?;
    data.insert("encounter".into(), encounter);

    let enriched = json!({
        "actions": [{"name": PROCESS_OBSERVATION_SET, "data": data}]
    });
    context.publish(ENRICHED_ROUTING_KEY, &enriched).await
}
