//! Table and queue identifiers.

use serde::Deserialize;

use super::{
    ConfigError, AGGREGATES_TABLE_ENV_VAR, EVENTS_TABLE_ENV_VAR, READ_MODEL_TABLE_ENV_VAR,
    RELAY_QUEUE_ENV_VAR,
};

/// Config keys and the legacy variables that override them.
pub(super) const LEGACY_OVERRIDES: [(&str, &str); 4] = [
    ("resources.aggregates_table", AGGREGATES_TABLE_ENV_VAR),
    ("resources.events_table", EVENTS_TABLE_ENV_VAR),
    ("resources.read_model_table", READ_MODEL_TABLE_ENV_VAR),
    ("resources.relay_queue", RELAY_QUEUE_ENV_VAR),
];

/// Resource identifiers as configured; any may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResourcesConfig {
    /// Aggregate Version Record table.
    pub aggregates_table: Option<String>,
    /// Event Record table.
    pub events_table: Option<String>,
    /// Read model table.
    pub read_model_table: Option<String>,
    /// Relay queue name (SQS queue URL for the `sqs` backend).
    pub relay_queue: Option<String>,
}

/// Resolved resource identifiers, all present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub aggregates_table: String,
    pub events_table: String,
    pub read_model_table: String,
    pub relay_queue: String,
}

/// Local names used by the standalone runtime when none are configured.
impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            aggregates_table: "aggregates".to_string(),
            events_table: "events".to_string(),
            read_model_table: "classconnect".to_string(),
            relay_queue: "new-events".to_string(),
        }
    }
}

impl ResourcesConfig {
    pub fn resolve(&self) -> Result<ResourceNames, ConfigError> {
        Ok(ResourceNames {
            aggregates_table: required(
                &self.aggregates_table,
                "resources.aggregates_table",
                AGGREGATES_TABLE_ENV_VAR,
            )?,
            events_table: required(
                &self.events_table,
                "resources.events_table",
                EVENTS_TABLE_ENV_VAR,
            )?,
            read_model_table: required(
                &self.read_model_table,
                "resources.read_model_table",
                READ_MODEL_TABLE_ENV_VAR,
            )?,
            relay_queue: required(&self.relay_queue, "resources.relay_queue", RELAY_QUEUE_ENV_VAR)?,
        })
    }

    pub fn for_test() -> Self {
        let names = ResourceNames::default();
        Self {
            aggregates_table: Some(names.aggregates_table),
            events_table: Some(names.events_table),
            read_model_table: Some(names.read_model_table),
            relay_queue: Some(names.relay_queue),
        }
    }
}

fn required(
    value: &Option<String>,
    key: &'static str,
    env_var: &'static str,
) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing { key, env_var }),
    }
}
