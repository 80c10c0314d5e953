//! Command events as published on the incoming log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// A structured command event consumed from the log.
///
/// The wire format is a UTF-8 JSON object; unknown fields are ignored and
/// every field except `command` may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEvent {
    pub command: String,

    #[serde(default)]
    pub options: BTreeMap<String, String>,

    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub correlation_id: String,

    #[serde(default)]
    pub trace_id: String,
}

impl CommandEvent {
    /// Decode an event from raw message bytes.
    pub fn decode(value: &[u8]) -> Result<Self, BridgeError> {
        let event: CommandEvent = serde_json::from_slice(value).map_err(BridgeError::Decode)?;
        event.validate()?;
        Ok(event)
    }

    /// Ensure required fields are present.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.command.is_empty() {
            return Err(BridgeError::Validation(
                "missing command field".to_string(),
            ));
        }
        Ok(())
    }
}
